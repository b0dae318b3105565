//! Building a small tree through the `DomTree` primitives.

use anyhow::Result;
use trellis_dom::{Document, DomTree as _, Mutation, NodeKind};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn builds_and_edits_a_list() -> Result<()> {
    init();
    let mut document = Document::new();
    let root = document.root();
    let list = document.create_element("UL", None);
    document.insert_before(root, list, None)?;

    let items: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|label| {
            let item = document.create_element("li", None);
            let text = document.create_text(label);
            (item, text)
        })
        .collect();
    for (item, text) in &items {
        document.insert_before(*item, *text, None)?;
        document.insert_before(list, *item, None)?;
    }
    assert_eq!(document.to_html(), "<ul><li>a</li><li>b</li><li>c</li></ul>");
    document.take_mutations();

    let (last, _) = items[2];
    let (first, first_text) = items[0];
    document.insert_before(list, last, Some(first))?;
    document.set_text(first_text, "A")?;
    document.remove_child(items[1].0)?;
    assert_eq!(document.to_html(), "<ul><li>c</li><li>A</li></ul>");

    let mutations = document.take_mutations();
    assert_eq!(mutations.iter().filter(|mutation| mutation.is_insert()).count(), 1);
    assert_eq!(mutations.iter().filter(|mutation| mutation.is_remove()).count(), 1);
    assert!(matches!(&mutations[1], Mutation::SetText { text, .. } if text == "A"));

    assert_eq!(document.parent(items[1].0), None);
    assert_eq!(document.first_child(list), Some(last));
    assert_eq!(document.next_sibling(last), Some(first));
    assert_eq!(document.tag_name(list), Some("ul"));
    Ok(())
}

#[test]
fn empty_html_inserts_a_comment() -> Result<()> {
    init();
    let mut document = Document::new();
    let root = document.root();
    let (first, last) = document.insert_html_before(root, None, "")?;
    assert_eq!(first, last);
    assert_eq!(
        document.node(first).map(|node| node.kind.clone()),
        Some(NodeKind::Comment(String::new()))
    );
    let detached = document.create_text("x");
    assert!(document.insert_before(root, first, Some(detached)).is_err());
    Ok(())
}
