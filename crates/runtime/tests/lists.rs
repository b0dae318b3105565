//! Reconciling `{{#each}}` against a changed list.

mod common;

use anyhow::{Result, anyhow};
use serde_json::{Value as Json, json};
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_opcode_compiler::Template;
use trellis_reference::{Object as _, TrackedObject, Value};
use trellis_runtime::RenderResult;

use common::{ChildChanges, Harness, template};

/// `<ul>{{#each this.items key=... as |item|}}<li>{{item}}</li>{{/each}}</ul>`
fn list_template(key: Option<&str>) -> Result<Template> {
    let hash = key.map_or(Json::Null, |key| json!([["key"], [key]]));
    template(
        "list",
        &json!(["item"]),
        &json!([
            [9, "ul", true],
            [10],
            [5, [27, [26, 0, "BlockHead"], []], [[27, [24, 0], ["items"]]], hash,
                [["default"], [{
                    "statements": [[9, "li", true], [10], [1, 0, 0, 0, [27, [24, 1], []]], [11]],
                    "parameters": [1]
                }]]],
            [11]
        ]),
        &json!(["each"]),
    )
}

fn items(values: &[&str]) -> Value {
    Value::from(values.iter().map(|value| Value::from(*value)).collect::<Vec<_>>())
}

fn list_html(values: &[&str]) -> String {
    let items: String = values.iter().map(|value| format!("<li>{value}</li>")).collect();
    format!("<ul>{items}</ul>")
}

struct ListFixture {
    harness: Harness,
    state: Rc<TrackedObject>,
    result: RenderResult,
    list: NodeId,
}

impl ListFixture {
    fn render(key: Option<&str>, initial: &[&str]) -> Result<Self> {
        let harness = Harness::default();
        let state = TrackedObject::with_fields([("items", items(initial))]);
        let result = harness.render(&list_template(key)?, &state)?;
        let list = harness
            .first_element()
            .ok_or_else(|| anyhow!("the list was not rendered"))?;
        assert_eq!(harness.html(), list_html(initial));
        Ok(Self {
            harness,
            state,
            result,
            list,
        })
    }

    /// Replace the list and re-render, classifying what happened to the
    /// `<li>` elements.
    fn update(&self, next: &[&str]) -> Result<ChildChanges> {
        let before = self.harness.children(self.list);
        assert!(self.state.set("items", items(next)));
        self.result.rerender()?;
        let mutations = self.harness.take_mutations();
        assert_eq!(self.harness.html(), list_html(next));
        Ok(ChildChanges::of(&self.harness, self.list, &before, &mutations))
    }
}

/// Test that rotating a keyed list moves nodes instead of rebuilding them.
///
/// # Panics
/// Panics if an item is created, deleted or moved more than twice.
#[test]
fn rotation_only_moves() -> Result<()> {
    let fixture = ListFixture::render(None, &["a", "b", "c"])?;
    let changes = fixture.update(&["c", "a", "b"])?;
    assert_eq!(changes.inserted, 0);
    assert_eq!(changes.removed, 0);
    assert!((1..=2).contains(&changes.moved), "{changes:?}");
    Ok(())
}

/// Test that appending a duplicate key keeps both existing items.
///
/// # Panics
/// Panics if the existing items are touched or more than one is added.
#[test]
fn duplicate_keys_are_retained() -> Result<()> {
    let fixture = ListFixture::render(None, &["x", "x"])?;
    let before = fixture.harness.children(fixture.list);
    let changes = fixture.update(&["x", "x", "x"])?;
    assert_eq!(
        changes,
        ChildChanges {
            inserted: 1,
            ..ChildChanges::default()
        }
    );
    let after = fixture.harness.children(fixture.list);
    assert_eq!(after.get(..2), Some(before.as_slice()));
    Ok(())
}

/// Test that `@index` keys update items in place on a reversal.
///
/// # Panics
/// Panics if an `<li>` is created, moved or removed.
#[test]
fn index_keys_update_in_place() -> Result<()> {
    let fixture = ListFixture::render(Some("@index"), &["1", "2", "3"])?;
    let before = fixture.harness.children(fixture.list);
    let changes = fixture.update(&["3", "2", "1"])?;
    assert_eq!(changes.inserted + changes.moved + changes.removed, 0);
    assert!(changes.text_updates >= 2, "{changes:?}");
    assert_eq!(fixture.harness.children(fixture.list), before);
    Ok(())
}

/// Test that `@identity` keys turn a reversal into moves alone.
///
/// # Panics
/// Panics if an item is created or removed.
#[test]
fn identity_keys_move_on_reversal() -> Result<()> {
    let fixture = ListFixture::render(Some("@identity"), &["1", "2", "3"])?;
    let changes = fixture.update(&["3", "2", "1"])?;
    assert_eq!(changes.inserted, 0);
    assert_eq!(changes.removed, 0);
    assert_eq!(changes.text_updates, 0);
    assert!(changes.moved >= 1, "{changes:?}");
    Ok(())
}

/// Test that removed items leave and new ones are created.
///
/// # Panics
/// Panics if the counts are off.
#[test]
fn removals_and_insertions() -> Result<()> {
    let fixture = ListFixture::render(None, &["a", "b", "c"])?;
    let changes = fixture.update(&["a", "d"])?;
    assert_eq!(changes.inserted, 1);
    assert_eq!(changes.removed, 2);
    Ok(())
}

/// Test the else block of an empty list and the way back.
///
/// # Panics
/// Panics if the inverse is not rendered or not replaced.
#[test]
fn empty_list_renders_the_inverse() -> Result<()> {
    let harness = Harness::default();
    let state = TrackedObject::with_fields([("items", items(&[]))]);
    let template = template(
        "empty",
        &json!(["item"]),
        &json!([
            [5, [27, [26, 0, "BlockHead"], []], [[27, [24, 0], ["items"]]], null,
                [["default", "else"], [
                    {"statements": [[9, "p", true], [10], [1, 0, 0, 0, [27, [24, 1], []]], [11]], "parameters": [1]},
                    {"statements": [[1, 1, 0, 0, "nothing"]], "parameters": []}
                ]]]
        ]),
        &json!(["each"]),
    )?;
    let result = harness.render(&template, &state)?;
    assert_eq!(harness.html(), "nothing");

    assert!(state.set("items", items(&["one"])));
    result.rerender()?;
    assert_eq!(harness.html(), "<p>one</p>");

    assert!(state.set("items", items(&[])));
    result.rerender()?;
    assert_eq!(harness.html(), "nothing");
    Ok(())
}

/// Test that a re-render with nothing changed touches nothing.
///
/// # Panics
/// Panics if the list re-render mutates the DOM.
#[test]
fn unchanged_list_is_left_alone() -> Result<()> {
    let fixture = ListFixture::render(Some("@index"), &["a", "b"])?;
    fixture.result.rerender()?;
    assert_eq!(fixture.harness.take_mutations(), []);
    Ok(())
}

/// Test that assigning an equal list reconciles without touching the DOM.
///
/// # Panics
/// Panics if the pass mutates the DOM.
#[test]
fn equal_list_is_left_alone() -> Result<()> {
    let fixture = ListFixture::render(None, &["a", "b"])?;
    assert!(fixture.state.set("items", items(&["a", "b"])));
    fixture.result.rerender()?;
    assert_eq!(fixture.harness.take_mutations(), []);
    assert_eq!(fixture.harness.html(), list_html(&["a", "b"]));
    Ok(())
}
