//! Content, elements, attributes and modifiers.

use anyhow::{Result, anyhow};
use core::cell::RefCell;
use log::{trace, warn};
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_program::Register;
use trellis_reference::{ConstReference, PathReference as _, Reference, ReferenceCache, Value};

use crate::builder::{ElementOperations, LiveBlock, RemoteInsert, clear};
use crate::destroyable::Destroy;
use crate::environment::Environment;
use crate::modifier::ModifierInstance;
use crate::resolver::RuntimeResolverExt as _;
use crate::updating::{Assert, DynamicTextContent, UpdateDynamicAttribute, UpdateModifier};
use crate::vm::Vm;
use crate::vm::stack::StackValue;

pub fn text(vm: &mut Vm, index: i32) -> Result<()> {
    let text = vm.string(index)?;
    vm.builder().append_text(&text)?;
    Ok(())
}

pub fn comment(vm: &mut Vm, index: i32) -> Result<()> {
    let text = vm.string(index)?;
    vm.builder().append_comment(&text)?;
    Ok(())
}

pub fn append_text(vm: &mut Vm) -> Result<()> {
    let reference = vm.stack().pop()?.into_reference()?;
    let text = reference.value().to_text();
    let node = vm.builder().append_text(&text)?;
    if !reference.is_const() {
        vm.update_with(DynamicTextContent::new(node, reference, text))?;
    }
    Ok(())
}

/// Trusted HTML. Its block is re-rendered, not patched, when it changes.
pub fn append_html(vm: &mut Vm) -> Result<()> {
    let html = vm.stack().pop()?.into_reference()?.value().to_text();
    vm.builder().insert_html(&html)?;
    Ok(())
}

pub fn open_element(vm: &mut Vm, index: i32) -> Result<()> {
    let tag = vm.string(index)?;
    vm.builder().open_element(&tag);
    Ok(())
}

pub fn put_component_operations(vm: &mut Vm) -> Result<()> {
    let operations = Rc::new(RefCell::new(ElementOperations::default()));
    vm.low_level().load(Register::T0, StackValue::Operations(operations))
}

fn operations(vm: &mut Vm) -> Result<Option<Rc<RefCell<ElementOperations>>>> {
    vm.low_level().register(Register::T0)?.clone().into_operations()
}

pub fn static_attr(vm: &mut Vm, name: i32, value: i32, namespace: i32) -> Result<()> {
    let name = vm.string(name)?;
    let value = vm.string(value)?;
    let namespace = vm.optional_string(namespace)?;
    vm.builder().set_static_attribute(&name, &value, namespace.as_deref())
}

/// A static attribute on an element that receives `...attributes`: it is
/// deferred so the invocation's attributes can override it.
pub fn static_component_attr(vm: &mut Vm, name: i32, value: i32, namespace: i32) -> Result<()> {
    let Some(operations) = operations(vm)? else {
        return static_attr(vm, name, value, namespace);
    };
    let name = vm.string(name)?;
    let value = ConstReference::new(Value::string(&vm.string(value)?));
    let namespace = vm.optional_string(namespace)?;
    operations.borrow_mut().set_attribute(&name, value, namespace.as_deref());
    Ok(())
}

fn set_dynamic(vm: &mut Vm, name: &str, reference: Reference, namespace: Option<&str>, trusting: bool) -> Result<()> {
    let mut cache = ReferenceCache::new(Rc::clone(&reference));
    let value = cache.peek();
    let attribute = vm.builder().set_dynamic_attribute(name, &value, namespace, trusting)?;
    if !reference.is_const() {
        vm.update_with(UpdateDynamicAttribute::new(attribute, cache))?;
    }
    Ok(())
}

pub fn dynamic_attr(vm: &mut Vm, name: i32, trusting: i32, namespace: i32) -> Result<()> {
    let name = vm.string(name)?;
    let namespace = vm.optional_string(namespace)?;
    let reference = vm.stack().pop()?.into_reference()?;
    set_dynamic(vm, &name, reference, namespace.as_deref(), trusting != 0)
}

pub fn component_attr(vm: &mut Vm, name: i32, namespace: i32) -> Result<()> {
    let Some(operations) = operations(vm)? else {
        return dynamic_attr(vm, name, 0, namespace);
    };
    let name = vm.string(name)?;
    let namespace = vm.optional_string(namespace)?;
    let reference = vm.stack().pop()?.into_reference()?;
    operations.borrow_mut().set_attribute(&name, reference, namespace.as_deref());
    Ok(())
}

/// Apply the deferred attributes, if any, and insert the element.
pub fn flush_element(vm: &mut Vm) -> Result<()> {
    let modifiers = match operations(vm)? {
        Some(operations) => {
            vm.low_level().load(Register::T0, StackValue::Null)?;
            let operations = Rc::try_unwrap(operations)
                .map_or_else(|shared| shared.replace(ElementOperations::default()), RefCell::into_inner);
            let (attributes, modifiers) = operations.finish();
            for attribute in attributes {
                set_dynamic(vm, &attribute.name, attribute.value, attribute.namespace.as_deref(), false)?;
            }
            modifiers
        }
        None => Vec::new(),
    };
    vm.builder().flush_element(modifiers)?;
    Ok(())
}

/// Close the element and schedule its modifiers for installation.
pub fn close_element(vm: &mut Vm) -> Result<()> {
    let modifiers = vm.builder().close_element()?;
    for ModifierInstance { manager, state } in modifiers {
        if let Some(destructor) = manager.destructor(&state) {
            vm.associate_destroyable(destructor);
        }
        vm.env().schedule_install_modifier(manager, state)?;
    }
    Ok(())
}

pub fn modifier(vm: &mut Vm, handle: i32) -> Result<()> {
    let definition = vm.runtime().resolver().resolve_modifier(handle)?;
    let args = vm.stack().pop()?.into_args()?;
    let element = vm.builder().constructing()?;
    let dynamic_scope = vm.dynamic_scope()?;
    let manager = Rc::clone(definition.manager());
    let state = manager.create(element, definition.state(), args.capture(), &dynamic_scope)?;

    let tag = manager.tag(&state);
    if !tag.is_const() {
        vm.update_with(UpdateModifier::new(tag, Rc::clone(&manager), Rc::clone(&state)))?;
    }

    let instance = ModifierInstance { manager, state };
    match operations(vm)? {
        Some(operations) => operations.borrow_mut().add_modifier(instance),
        None => {
            let mut operations = ElementOperations::default();
            operations.add_modifier(instance);
            let operations = Rc::new(RefCell::new(operations));
            vm.low_level().load(Register::T0, StackValue::Operations(operations))?;
        }
    }
    Ok(())
}

/// Clears what an `{{#in-element}}` rendered into its destination.
struct RemoteBlock {
    env: Rc<Environment>,
    block: Rc<LiveBlock>,
}

impl Destroy for RemoteBlock {
    fn did_destroy(&self) {
        if let Err(error) = clear(&mut *self.env.dom().borrow_mut(), &self.block) {
            warn!(target: "trellis::vm", "failed to clear remote block: {error:#}");
        }
    }
}

fn node(value: &Value, role: &str) -> Result<NodeId> {
    value
        .downcast::<NodeId>()
        .map(|node| *node)
        .ok_or_else(|| anyhow!("in-element {role} {value} is not a node"))
}

/// Start rendering into the element on the stack.
pub fn push_remote_element(vm: &mut Vm) -> Result<()> {
    let stack = vm.stack();
    let element = stack.pop()?.into_reference()?;
    let before = stack.pop()?.into_reference()?;
    stack.pop()?;

    let mut element_cache = ReferenceCache::new(Rc::clone(&element));
    let destination = node(&element_cache.peek(), "destination")?;
    let mut before_cache = ReferenceCache::new(Rc::clone(&before));
    let insert = match before_cache.peek() {
        Value::Undefined => RemoteInsert::Replace,
        Value::Null => RemoteInsert::Before(None),
        other => RemoteInsert::Before(Some(node(&other, "insertBefore")?)),
    };
    if !element.is_const() {
        vm.update_with(Assert::new(element_cache))?;
    }
    if !before.is_const() && !matches!(insert, RemoteInsert::Replace) {
        vm.update_with(Assert::new(before_cache))?;
    }

    trace!(target: "trellis::vm", "rendering into remote element {destination}");
    let block = vm.builder().push_remote_element(destination, insert)?;
    let env = Rc::clone(vm.env());
    vm.associate_destroyable(Rc::new(RemoteBlock { env, block }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElementBuilder;
    use crate::config::RuntimeConfig;
    use crate::resolver::Registry;
    use crate::runtime::Runtime;
    use crate::vm::scope::{DynamicScope, Scope};
    use trellis_dom::Document;

    fn vm() -> (Rc<RefCell<Document>>, Vm) {
        let document = Rc::new(RefCell::new(Document::new()));
        let root = document.borrow().root();
        let env = Environment::with_defaults(Rc::clone(&document) as _);
        let runtime = Runtime::new(Rc::clone(&env), Registry::new(), RuntimeConfig::default());
        let builder = ElementBuilder::for_initial_render(env, root, None);
        let vm = Vm::initial(runtime, -1, Scope::root(ConstReference::undefined(), 1), DynamicScope::new(), builder);
        (document, vm)
    }

    fn string(vm: &Vm, text: &str) -> i32 {
        vm.runtime().program().borrow_mut().constants.string(text)
    }

    /// Test that deferred attributes override static ones and flush in order.
    ///
    /// # Panics
    /// Panics if the element has the layout's value.
    #[test]
    fn component_attributes_are_deferred() -> Result<()> {
        let (document, mut vm) = vm();
        let (div, title, layout) = (string(&vm, "div"), string(&vm, "title"), string(&vm, "layout"));
        open_element(&mut vm, div)?;
        put_component_operations(&mut vm)?;
        static_component_attr(&mut vm, title, layout, 0)?;
        vm.stack().push(StackValue::Reference(ConstReference::new(Value::from("caller"))));
        component_attr(&mut vm, title, 0)?;
        flush_element(&mut vm)?;
        close_element(&mut vm)?;

        let html = document.borrow().inner_html(document.borrow().root());
        assert_eq!(html, r#"<div title="caller"></div>"#);
        assert!(operations(&mut vm)?.is_none());
        Ok(())
    }

    /// Test that constant text leaves no updating opcode behind.
    ///
    /// # Panics
    /// Panics if the text is missing.
    #[test]
    fn constant_text_is_static() -> Result<()> {
        let (document, mut vm) = vm();
        vm.stack().push(StackValue::Reference(ConstReference::new(Value::from("hello"))));
        append_text(&mut vm)?;
        let outcome = vm.execute()?;
        assert!(outcome.updating.borrow().is_empty());
        let html = document.borrow().inner_html(document.borrow().root());
        assert_eq!(html, "hello");
        Ok(())
    }

    /// Test that a missing destination is reported.
    ///
    /// # Panics
    /// Panics if a non-element is accepted.
    #[test]
    fn in_element_requires_an_element() {
        let (_document, mut vm) = vm();
        for value in [Value::Null, Value::Undefined, Value::from("body")] {
            vm.stack().push(StackValue::Reference(ConstReference::new(value)));
        }
        assert!(push_remote_element(&mut vm).is_err());
    }
}
