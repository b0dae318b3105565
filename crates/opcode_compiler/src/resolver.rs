//! Compile-time name resolution.

use serde_json::Value as Json;
use std::rc::Rc;

use crate::template::CompilableTemplate;

/// What a component manager supports, which decides how invocations of its
/// components are compiled.
#[allow(
    clippy::struct_excessive_bools,
    reason = "each capability is an independent switch"
)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// The layout is only known once the instance exists.
    pub dynamic_layout: bool,
    /// The wrapping element's tag is computed.
    pub dynamic_tag: bool,
    /// Arguments go through `prepare_args` before creation.
    pub prepare_args: bool,
    /// The manager receives captured arguments.
    pub create_args: bool,
    /// The manager observes attributes.
    pub attribute_hook: bool,
    /// The manager observes the created element.
    pub element_hook: bool,
    /// The component can read and write dynamic scope.
    pub dynamic_scope: bool,
    /// The manager receives the caller's `self`.
    pub create_caller: bool,
    /// The manager is told about argument changes.
    pub update_hook: bool,
    /// The manager creates a per-invocation instance.
    pub create_instance: bool,
    /// The manager is told before teardown.
    pub will_destroy: bool,
}

impl Capabilities {
    /// A template-only component.
    pub const MINIMAL: Self = Self {
        dynamic_layout: false,
        dynamic_tag: false,
        prepare_args: false,
        create_args: false,
        attribute_hook: false,
        element_hook: false,
        dynamic_scope: false,
        create_caller: false,
        update_hook: false,
        create_instance: false,
        will_destroy: false,
    };

    /// Pack into the flag word components carry at runtime.
    pub const fn flags(&self) -> u32 {
        let bits = [
            self.dynamic_layout,
            self.dynamic_tag,
            self.prepare_args,
            self.create_args,
            self.attribute_hook,
            self.element_hook,
            self.dynamic_scope,
            self.create_caller,
            self.update_hook,
            self.create_instance,
            self.will_destroy,
        ];
        let mut flags = 0;
        let mut index = 0;
        while index < bits.len() {
            if bits[index] {
                flags |= 1 << index;
            }
            index += 1;
        }
        flags
    }
}

/// A component found by [`CompileTimeResolver::lookup_component`].
#[derive(Clone)]
pub struct CompileTimeComponent {
    /// Runtime handle of the component definition.
    pub handle: i32,
    /// The definition's manager capabilities.
    pub capabilities: Capabilities,
    /// The layout, when it is known statically.
    pub compilable: Option<Rc<CompilableTemplate>>,
}

/// Resolves names used in templates to runtime handles.
///
/// `referrer` is the metadata of the template doing the lookup.
pub trait CompileTimeResolver {
    /// A component by name.
    fn lookup_component(&self, name: &str, referrer: &Json) -> Option<CompileTimeComponent>;
    /// A helper by name.
    fn lookup_helper(&self, name: &str, referrer: &Json) -> Option<i32>;
    /// A modifier by name.
    fn lookup_modifier(&self, name: &str, referrer: &Json) -> Option<i32>;
    /// A partial by name.
    fn lookup_partial(&self, name: &str, referrer: &Json) -> Option<i32>;
}

/// A resolver that knows no names.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopResolver;

impl CompileTimeResolver for NoopResolver {
    fn lookup_component(&self, _name: &str, _referrer: &Json) -> Option<CompileTimeComponent> {
        None
    }

    fn lookup_helper(&self, _name: &str, _referrer: &Json) -> Option<i32> {
        None
    }

    fn lookup_modifier(&self, _name: &str, _referrer: &Json) -> Option<i32> {
        None
    }

    fn lookup_partial(&self, _name: &str, _referrer: &Json) -> Option<i32> {
        None
    }
}
