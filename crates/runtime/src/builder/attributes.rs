//! Attributes whose value can change after the initial render.

use anyhow::Result;
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_reference::{Reference, Value};

use crate::environment::{Environment, normalize_attribute_value};
use crate::modifier::ModifierInstance;
use crate::references::ClassListReference;

/// An attribute bound to a reference.
pub struct DynamicAttribute {
    element: NodeId,
    tag: Option<String>,
    name: Rc<str>,
    namespace: Option<Rc<str>>,
    trusting: bool,
}

impl DynamicAttribute {
    /// An attribute `name` of `element`.
    pub fn new(env: &Environment, element: NodeId, name: &str, namespace: Option<&str>) -> Self {
        let tag = env.dom().borrow().tag_name(element).map(str::to_owned);
        Self {
            element,
            tag,
            name: Rc::from(name),
            namespace: namespace.map(Rc::from),
            trusting: false,
        }
    }

    /// Skip URL sanitization, for `{{{triple-curlies}}}` attribute values.
    #[must_use]
    pub const fn trusting(mut self) -> Self {
        self.trusting = true;
        self
    }

    /// The attribute name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn normalize(&self, env: &Environment, value: &Value) -> Option<String> {
        match value {
            Value::SafeString(html) => Some(html.to_string()),
            other if self.trusting => normalize_attribute_value(other),
            other => normalize_attribute_value(other)
                .map(|text| env.sanitize(self.tag.as_deref(), &self.name, text)),
        }
    }

    /// Apply the initial value. An absent value sets nothing.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn set(&self, env: &Environment, value: &Value) -> Result<()> {
        if let Some(text) = self.normalize(env, value) {
            env.dom().borrow_mut().set_attribute(
                self.element,
                &self.name,
                &text,
                self.namespace.as_deref(),
            )?;
        }
        Ok(())
    }

    /// Apply a changed value, removing the attribute when it became absent.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn update(&self, env: &Environment, value: &Value) -> Result<()> {
        let mut dom = env.dom().borrow_mut();
        match self.normalize(env, value) {
            Some(text) => dom.set_attribute(self.element, &self.name, &text, self.namespace.as_deref()),
            None => dom.remove_attribute(self.element, &self.name, self.namespace.as_deref()),
        }
    }
}

/// An attribute collected for an element that receives `...attributes`.
#[derive(Clone)]
pub struct DeferredAttribute {
    /// The attribute name.
    pub name: Rc<str>,
    /// Its value.
    pub value: Reference,
    /// Its namespace.
    pub namespace: Option<Rc<str>>,
}

/// Attributes and modifiers collected for an element until it is flushed, so
/// the invocation's attributes can override the layout's.
#[derive(Default)]
pub struct ElementOperations {
    attributes: Vec<DeferredAttribute>,
    classes: Vec<Reference>,
    modifiers: Vec<ModifierInstance>,
}

impl ElementOperations {
    /// Record an attribute. A later value for the same name replaces the
    /// earlier one in place, except `class`, whose values are merged.
    pub fn set_attribute(&mut self, name: &str, value: Reference, namespace: Option<&str>) {
        if name == "class" {
            self.classes.push(Rc::clone(&value));
        }
        let attribute = DeferredAttribute {
            name: Rc::from(name),
            value,
            namespace: namespace.map(Rc::from),
        };
        match self.attributes.iter_mut().find(|existing| &*existing.name == name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Record a modifier to install on the element.
    pub fn add_modifier(&mut self, modifier: ModifierInstance) {
        self.modifiers.push(modifier);
    }

    /// The attributes to set, `type` last, and the modifiers to install.
    pub fn finish(self) -> (Vec<DeferredAttribute>, Vec<ModifierInstance>) {
        let Self {
            attributes,
            classes,
            modifiers,
        } = self;
        let (mut attributes, typed): (Vec<_>, Vec<_>) =
            attributes.into_iter().partition(|attribute| &*attribute.name != "type");
        if classes.len() > 1
            && let Some(class) = attributes.iter_mut().find(|attribute| &*attribute.name == "class")
        {
            class.value = ClassListReference::new(classes);
        }
        attributes.extend(typed);
        (attributes, modifiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use trellis_dom::{Document, DomTree as _};
    use trellis_reference::{ConstReference, PathReference as _};

    fn text(value: &str) -> Reference {
        ConstReference::new(Value::from(value))
    }

    /// Test override order, class merging and `type` ordering.
    ///
    /// # Panics
    /// Panics if an attribute is duplicated or out of order.
    #[test]
    fn later_attributes_win() {
        let mut operations = ElementOperations::default();
        operations.set_attribute("type", text("button"), None);
        operations.set_attribute("class", text("base"), None);
        operations.set_attribute("title", text("layout"), None);
        operations.set_attribute("title", text("caller"), None);
        operations.set_attribute("class", text("extra"), None);

        let (attributes, modifiers) = operations.finish();
        let names: Vec<&str> = attributes.iter().map(|attribute| &*attribute.name).collect();
        assert_eq!(names, ["class", "title", "type"]);
        assert_eq!(attributes[0].value.value(), Value::from("base extra"));
        assert_eq!(attributes[1].value.value(), Value::from("caller"));
        assert!(modifiers.is_empty());
    }

    /// Test setting, sanitizing and removing a dynamic attribute.
    ///
    /// # Panics
    /// Panics if a script URL reaches the DOM.
    #[test]
    fn dynamic_attributes_sanitize() -> Result<()> {
        let document = Rc::new(RefCell::new(Document::new()));
        let env = Environment::with_defaults(Rc::clone(&document) as _);
        let link = document.borrow_mut().create_element("a", None);
        let attribute = DynamicAttribute::new(&env, link, "href", None);

        attribute.set(&env, &Value::from("javascript:alert(1)"))?;
        assert_eq!(document.borrow().attribute(link, "href"), Some("unsafe:javascript:alert(1)"));
        attribute.update(&env, &Value::from("/home"))?;
        assert_eq!(document.borrow().attribute(link, "href"), Some("/home"));
        attribute.update(&env, &Value::Null)?;
        assert_eq!(document.borrow().attribute(link, "href"), None);
        Ok(())
    }
}
