//! `(component "name" arg=value)`: a definition with some arguments bound
//! ahead of the invocation.

use anyhow::{Result, anyhow};
use core::cell::RefCell;
use log::warn;
use std::rc::Rc;
use trellis_reference::{CapturedArguments, ConstReference, PathReference, Reference, Value};
use trellis_validator::Tag;

use super::{ComponentDefinition, InstanceDefinition};
use crate::resolver::RuntimeResolver;
use crate::vm::arguments::Arguments;

/// A definition plus the arguments curried into it. Curried definitions
/// nest.
pub struct CurriedComponentDefinition {
    inner: InstanceDefinition,
    args: CapturedArguments,
}

impl CurriedComponentDefinition {
    /// Curry `args` into `inner`.
    pub fn new(inner: InstanceDefinition, args: CapturedArguments) -> Rc<Self> {
        Rc::new(Self { inner, args })
    }

    /// The definition being curried.
    #[inline]
    pub const fn inner(&self) -> &InstanceDefinition {
        &self.inner
    }

    /// The curried arguments.
    #[inline]
    pub const fn args(&self) -> &CapturedArguments {
        &self.args
    }

    /// The innermost definition and `args` merged with every curried level.
    /// Positional arguments of inner levels come first; for named ones the
    /// invocation wins, then the outer levels.
    pub fn unwrap(&self, args: &Arguments) -> (Rc<ComponentDefinition>, Arguments) {
        let mut levels = vec![&self.args];
        let mut current = &self.inner;
        loop {
            match current {
                InstanceDefinition::Resolved(definition) => {
                    let merged = levels
                        .iter()
                        .fold(args.clone(), |merged, level| merged.with_curried(level));
                    return (Rc::clone(definition), merged);
                }
                InstanceDefinition::Curried(curried) => {
                    levels.push(&curried.args);
                    current = &curried.inner;
                }
            }
        }
    }
}

/// The value of `(component ...)`: re-resolves when the component name
/// changes.
pub struct CurryComponentReference {
    inner: Reference,
    resolver: Rc<dyn RuntimeResolver>,
    referrer: serde_json::Value,
    args: CapturedArguments,
    last: RefCell<Option<(Value, Value)>>,
}

impl CurryComponentReference {
    /// Curry `args` into whatever `inner` names.
    pub fn new(
        inner: Reference,
        resolver: Rc<dyn RuntimeResolver>,
        referrer: serde_json::Value,
        args: CapturedArguments,
    ) -> Rc<Self> {
        Rc::new(Self {
            inner,
            resolver,
            referrer,
            args,
            last: RefCell::new(None),
        })
    }

    fn curry(&self, definition: &Value) -> Value {
        let inner = match definition {
            Value::String(name) if !name.is_empty() => {
                match self.resolver.lookup_component(name, &self.referrer) {
                    Some(definition) => InstanceDefinition::Resolved(definition),
                    None => {
                        warn!(target: "trellis::component", "no component named {name}");
                        return Value::Null;
                    }
                }
            }
            Value::Opaque(_) => {
                if let Some(curried) = definition.downcast::<CurriedComponentDefinition>() {
                    if self.args.is_empty() {
                        return definition.clone();
                    }
                    InstanceDefinition::Curried(curried)
                } else if let Some(resolved) = definition.downcast::<ComponentDefinition>() {
                    InstanceDefinition::Resolved(resolved)
                } else {
                    return Value::Null;
                }
            }
            _ => return Value::Null,
        };
        Value::opaque(CurriedComponentDefinition {
            inner,
            args: self.args.clone(),
        })
    }
}

impl PathReference for CurryComponentReference {
    fn value(&self) -> Value {
        let definition = self.inner.value();
        if let Some((input, output)) = &*self.last.borrow()
            && input.identical(&definition)
        {
            return output.clone();
        }
        let curried = self.curry(&definition);
        *self.last.borrow_mut() = Some((definition, curried.clone()));
        curried
    }

    fn tag(&self) -> Tag {
        self.inner.tag()
    }

    fn get(self: Rc<Self>, _key: &str) -> Reference {
        ConstReference::undefined()
    }
}

/// Unwrap a curried value read from the stack.
///
/// # Errors
/// Returns an error if `value` is not a component.
pub fn definition_of(value: &Value) -> Result<InstanceDefinition> {
    if let Some(curried) = value.downcast::<CurriedComponentDefinition>() {
        return Ok(InstanceDefinition::Curried(curried));
    }
    if let Some(definition) = value.downcast::<ComponentDefinition>() {
        return Ok(InstanceDefinition::Resolved(definition));
    }
    Err(anyhow!("{value:?} is not a component"))
}
