use core::fmt;

use super::{Attribute, Document, DomNode, NodeKind};
use indextree::NodeId;

use serde_json::{Map, Value, json};

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

// -----------------------
// Module-scope helpers
// -----------------------

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn escape_debug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

fn sorted(attrs: &[Attribute]) -> Vec<&Attribute> {
    let mut pairs: Vec<&Attribute> = attrs.iter().collect();
    pairs.sort_by(|left, right| left.name.cmp(&right.name));
    pairs
}

fn write_html(document: &Document, id: NodeId, out: &mut String) {
    let Some(DomNode { kind, attrs }) = document.node(id) else {
        return;
    };
    match kind {
        NodeKind::Document => write_children(document, id, out),
        NodeKind::Element { tag, .. } => {
            out.push('<');
            out.push_str(tag);
            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                escape_attr(&attr.value, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            write_children(document, id, out);
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeKind::Text(text) => escape_text(text, out),
        NodeKind::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeKind::Html(html) => out.push_str(html),
    }
}

fn write_children(document: &Document, id: NodeId, out: &mut String) {
    for child in id.children(&document.arena) {
        write_html(document, child, out);
    }
}

fn node_to_json(document: &Document, id: NodeId) -> Value {
    let Some(DomNode { kind, attrs }) = document.node(id) else {
        return Value::Null;
    };
    let children = || -> Vec<Value> {
        id.children(&document.arena)
            .map(|child| node_to_json(document, child))
            .filter(|child| !child.is_null())
            .collect()
    };
    match kind {
        NodeKind::Document => json!({ "type": "document", "children": children() }),
        NodeKind::Element { tag, .. } => {
            let mut attrs_obj = Map::new();
            for attr in sorted(attrs) {
                attrs_obj.insert(attr.name.clone(), Value::String(attr.value.clone()));
            }
            json!({
                "type": "element",
                "tag": tag,
                "attrs": Value::Object(attrs_obj),
                "children": children(),
            })
        }
        NodeKind::Text(text) => json!({ "type": "text", "text": text }),
        NodeKind::Comment(text) => json!({ "type": "comment", "text": text }),
        NodeKind::Html(html) => json!({ "type": "html", "html": html }),
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_indent(formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
            for _ in 0..depth {
                formatter.write_str("  ")?;
            }
            Ok(())
        }

        fn fmt_node(
            document: &Document,
            id: NodeId,
            formatter: &mut fmt::Formatter<'_>,
            depth: usize,
        ) -> fmt::Result {
            let Some(DomNode { kind, attrs }) = document.node(id) else {
                return Ok(());
            };
            write_indent(formatter, depth)?;
            match kind {
                NodeKind::Document => writeln!(formatter, "#document")?,
                NodeKind::Element { tag, .. } => {
                    write!(formatter, "<{tag}")?;
                    for attr in sorted(attrs) {
                        write!(formatter, " {}=\"{}\"", attr.name, escape_debug(&attr.value))?;
                    }
                    writeln!(formatter, ">")?;
                }
                NodeKind::Text(text) => writeln!(formatter, "\"{}\"", escape_debug(text))?,
                NodeKind::Comment(text) => writeln!(formatter, "<!--{}-->", escape_debug(text))?,
                NodeKind::Html(html) => writeln!(formatter, "html \"{}\"", escape_debug(html))?,
            }
            for child in id.children(&document.arena) {
                fmt_node(document, child, formatter, depth + 1)?;
            }
            Ok(())
        }

        writeln!(formatter, "Document")?;
        fmt_node(self, self.root, formatter, 0)
    }
}

impl Document {
    /// Serialize `id` and its subtree as HTML.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        write_html(self, id, &mut out);
        out
    }

    /// Serialize the children of `id` as HTML.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        write_children(self, id, &mut out);
        out
    }

    /// The whole document as HTML.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root)
    }

    /// Build a deterministic JSON representation of the document.
    /// Schema:
    /// - Document: { "type":"document", "children":[ ... ] }
    /// - Element: { "type":"element", "tag": "div", "attrs": {..}, "children":[ ... ] }
    /// - Text and comments: { "type":"text", "text":"..." }
    pub fn to_json_value(&self) -> Value {
        node_to_json(self, self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DomTree as _;
    use anyhow::Result;

    /// Test HTML serialization.
    ///
    /// # Panics
    /// Panics if escaping or void elements are serialized wrongly.
    #[test]
    fn serializes_html() -> Result<()> {
        let mut document = Document::new();
        let root = document.root();
        let paragraph = document.create_element("p", None);
        document.set_attribute(paragraph, "title", "\"a\" & b", None)?;
        document.insert_before(root, paragraph, None)?;
        let text = document.create_text("1 < 2");
        document.insert_before(paragraph, text, None)?;
        let line_break = document.create_element("br", None);
        document.insert_before(paragraph, line_break, None)?;
        document.insert_html_before(paragraph, None, "<b>raw</b>")?;
        let comment = document.create_comment("");
        document.insert_before(root, comment, None)?;

        assert_eq!(
            document.to_html(),
            r#"<p title="&quot;a&quot; &amp; b">1 &lt; 2<br><b>raw</b></p><!---->"#
        );
        assert_eq!(document.inner_html(paragraph), "1 &lt; 2<br><b>raw</b>");
        Ok(())
    }

    /// Test the JSON snapshot.
    ///
    /// # Panics
    /// Panics if attributes are not sorted.
    #[test]
    fn json_sorts_attributes() -> Result<()> {
        let mut document = Document::new();
        let root = document.root();
        let div = document.create_element("div", None);
        document.set_attribute(div, "id", "x", None)?;
        document.set_attribute(div, "class", "y", None)?;
        document.insert_before(root, div, None)?;
        let json = document.to_json_value();
        assert_eq!(
            json["children"][0]["attrs"].as_object().map(|attrs| attrs.keys().cloned().collect::<Vec<_>>()),
            Some(vec!["class".to_owned(), "id".to_owned()])
        );
        assert!(format!("{document:?}").contains("<div class=\"y\" id=\"x\">"));
        Ok(())
    }
}
