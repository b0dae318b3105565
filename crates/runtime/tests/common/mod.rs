//! A document, a registry and a runtime wired together for rendering tests.

#![allow(dead_code, reason = "each test binary uses a different part of the harness")]

use anyhow::Result;
use core::cell::RefCell;
use serde_json::{Value as Json, json};
use std::rc::Rc;
use trellis_dom::{Document, Mutation, NodeId, NodeKind};
use trellis_opcode_compiler::Template;
use trellis_reference::{RootReference, TrackedObject, Value};
use trellis_runtime::{Environment, Registry, RenderResult, Runtime, RuntimeConfig, render_template};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A template from its wire-format parts.
pub fn template(id: &str, symbols: &Json, statements: &Json, upvars: &Json) -> Result<Template> {
    let block = serde_json::from_value(json!({
        "symbols": symbols,
        "statements": statements,
        "hasEval": false,
        "upvars": upvars,
    }))?;
    Ok(Template::from_block(id, block, json!({ "module": id })))
}

pub struct Harness {
    pub document: Rc<RefCell<Document>>,
    pub registry: Rc<Registry>,
    pub runtime: Rc<Runtime>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::with_config(RuntimeConfig::default())
    }
}

impl Harness {
    pub fn with_config(config: RuntimeConfig) -> Self {
        init();
        let document = Rc::new(RefCell::new(Document::new()));
        let env = Environment::with_defaults(Rc::clone(&document) as _);
        let registry = Registry::new();
        let runtime = Runtime::new(env, Rc::clone(&registry), config);
        Self {
            document,
            registry,
            runtime,
        }
    }

    pub fn root(&self) -> NodeId {
        self.document.borrow().root()
    }

    /// Render `template` into the document root with `this` as `self`.
    pub fn render(&self, template: &Template, this: &Rc<TrackedObject>) -> Result<RenderResult> {
        let this = RootReference::new(Value::from(Rc::clone(this)), self.runtime.env().path_delegate());
        let result = render_template(&self.runtime, template, this, self.root(), None)?;
        self.take_mutations();
        Ok(result)
    }

    pub fn html(&self) -> String {
        let document = self.document.borrow();
        document.inner_html(document.root())
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        self.document.borrow().inner_html(node)
    }

    pub fn take_mutations(&self) -> Vec<Mutation> {
        self.document.borrow_mut().take_mutations()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.document.borrow().children(node)
    }

    /// The first child of the root, which most tests render a wrapper into.
    pub fn first_element(&self) -> Option<NodeId> {
        self.children(self.root()).into_iter().find(|node| self.is_element(*node))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(
            self.document.borrow().node(node).map(|node| &node.kind),
            Some(NodeKind::Element { .. })
        )
    }
}

/// How a re-render changed the element children of one parent.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChildChanges {
    pub inserted: usize,
    pub moved: usize,
    pub removed: usize,
    pub text_updates: usize,
}

impl ChildChanges {
    /// Classify `mutations` against the element children `parent` had
    /// before them. Comments are ignored.
    pub fn of(harness: &Harness, parent: NodeId, before: &[NodeId], mutations: &[Mutation]) -> Self {
        let mut changes = Self::default();
        for mutation in mutations {
            match mutation {
                Mutation::Insert {
                    parent: target,
                    node,
                    ..
                } if *target == parent && harness.is_element(*node) => {
                    if before.contains(node) {
                        changes.moved += 1;
                    } else {
                        changes.inserted += 1;
                    }
                }
                Mutation::Remove { node } if before.contains(node) => changes.removed += 1,
                Mutation::SetText { .. } => changes.text_updates += 1,
                _ => {}
            }
        }
        changes
    }
}
