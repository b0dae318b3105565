//! References the VM derives while rendering: truthiness, interpolation,
//! content types, list presence, dynamic variables and merged classes.

use core::cell::RefCell;
use std::rc::Rc;
use trellis_opcode_compiler::ContentType;
use trellis_reference::{
    CapturedArguments, ConstReference, HelperReference, IterationArtifacts, PathReference,
    Reference, Value, get_path,
};
use trellis_validator::{Tag, combine, create_update_tag, update_tag};

use crate::component::CurriedComponentDefinition;
use crate::environment::Environment;
use crate::vm::scope::DynamicScope;

/// `reference` read through the environment's truthiness rules.
pub fn to_bool(env: &Environment, reference: Reference) -> Reference {
    let delegate = env.path_delegate();
    if reference.is_const() {
        return ConstReference::new(Value::Bool(delegate.to_bool(&reference.value())));
    }
    let truthy = Rc::clone(&delegate);
    HelperReference::new(
        Rc::new(move |args: &CapturedArguments| {
            Value::Bool(truthy.to_bool(&args.positional_value(0)))
        }),
        CapturedArguments::new(vec![reference], Vec::new()),
        delegate,
    )
}

/// The text of every part joined together, as in `class="a {{b}}"`.
pub fn concat(env: &Environment, parts: Vec<Reference>) -> Reference {
    HelperReference::new(
        Rc::new(|args: &CapturedArguments| {
            Value::from(
                args.positional_values()
                    .iter()
                    .map(Value::to_text)
                    .collect::<String>(),
            )
        }),
        CapturedArguments::new(parts, Vec::new()),
        env.path_delegate(),
    )
}

/// How an appended value is rendered.
pub fn content_type_of(value: &Value) -> ContentType {
    match value {
        Value::SafeString(_) => ContentType::SafeString,
        Value::Opaque(_) if value.downcast::<CurriedComponentDefinition>().is_some() => {
            ContentType::Component
        }
        _ => ContentType::String,
    }
}

/// A number reference holding the [`ContentType`] of `reference`.
pub fn content_type(env: &Environment, reference: Reference) -> Reference {
    HelperReference::new(
        Rc::new(|args: &CapturedArguments| {
            Value::from(f64::from(content_type_of(&args.positional_value(0)) as u32))
        }),
        CapturedArguments::new(vec![reference], Vec::new()),
        env.path_delegate(),
    )
}

/// Whether an `{{#each}}` list has any items.
pub struct IterablePresenceReference {
    artifacts: Rc<RefCell<IterationArtifacts>>,
}

impl IterablePresenceReference {
    /// Presence of the items in `artifacts`.
    pub fn new(artifacts: Rc<RefCell<IterationArtifacts>>) -> Rc<Self> {
        Rc::new(Self { artifacts })
    }
}

impl PathReference for IterablePresenceReference {
    fn value(&self) -> Value {
        Value::Bool(!self.artifacts.borrow_mut().is_empty())
    }

    fn tag(&self) -> Tag {
        self.artifacts.borrow().tag()
    }

    fn get(self: Rc<Self>, _key: &str) -> Reference {
        ConstReference::undefined()
    }
}

/// `(-get-dynamic-var name)`: the dynamic variable `name` currently names.
pub struct DynamicVarReference {
    scope: Rc<DynamicScope>,
    name: Reference,
    variable: Tag,
    tag: Tag,
}

impl DynamicVarReference {
    /// Look `name` up in `scope`.
    pub fn new(scope: Rc<DynamicScope>, name: Reference) -> Rc<Self> {
        let variable = create_update_tag();
        let tag = combine([name.tag(), variable.clone()]);
        Rc::new(Self {
            scope,
            name,
            variable,
            tag,
        })
    }

    fn variable(&self) -> Reference {
        let name = self.name.value().to_text();
        let variable = self
            .scope
            .get(&name)
            .unwrap_or_else(ConstReference::undefined);
        update_tag(&self.variable, &variable.tag());
        variable
    }
}

impl PathReference for DynamicVarReference {
    fn value(&self) -> Value {
        self.variable().value()
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn get(self: Rc<Self>, key: &str) -> Reference {
        get_path(&self.variable(), key)
    }
}

/// The `class` values of a layout element and its invocation, merged.
pub struct ClassListReference {
    classes: Vec<Reference>,
    tag: Tag,
}

impl ClassListReference {
    /// Merge `classes` in order.
    pub fn new(classes: Vec<Reference>) -> Reference {
        let tag = combine(classes.iter().map(|class| class.tag()));
        Rc::new(Self { classes, tag })
    }
}

impl PathReference for ClassListReference {
    fn value(&self) -> Value {
        let names: Vec<String> = self
            .classes
            .iter()
            .map(|class| class.value().to_text())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            Value::Null
        } else {
            Value::from(names.join(" "))
        }
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn get(self: Rc<Self>, _key: &str) -> Reference {
        ConstReference::undefined()
    }
}
