//! The compilation context shared by every template compiled into one
//! program.

use core::cell::Cell;
use log::{debug, warn};
use serde_json::json;
use std::rc::Rc;
use trellis_program::{
    Op, PLACEHOLDER_HANDLE, Program, Register, SerializedProgram, SharedProgram, StdlibHandles,
};

use crate::compiler::{Clause, Populate, TemplateCompiler};
use crate::encoder::Operand;
use crate::macros::Macros;
use crate::resolver::CompileTimeResolver;
use crate::template::CompileMeta;

/// What a value appended with `{{value}}` turns out to be.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ContentType {
    /// A curried component, rendered in place.
    Component = 0,
    /// Anything rendered as text (or HTML when trusted).
    String = 1,
    /// A string already marked as safe HTML.
    SafeString = 3,
}

/// Program, resolver, macros and stdlib routines.
pub struct SyntaxContext {
    program: SharedProgram,
    resolver: Rc<dyn CompileTimeResolver>,
    macros: Macros,
    stdlib: Cell<StdlibHandles>,
    depth: Cell<usize>,
}

impl SyntaxContext {
    /// A context with a fresh program and the built-in macros.
    pub fn new(resolver: Rc<dyn CompileTimeResolver>) -> Self {
        Self::with_program(Program::default().shared(), resolver, Macros::builtin())
    }

    /// A context compiling into `program`. The stdlib routines are compiled
    /// immediately.
    pub fn with_program(
        program: SharedProgram,
        resolver: Rc<dyn CompileTimeResolver>,
        macros: Macros,
    ) -> Self {
        let context = Self {
            program,
            resolver,
            macros,
            stdlib: Cell::new(StdlibHandles {
                main: PLACEHOLDER_HANDLE,
                trusting_append: PLACEHOLDER_HANDLE,
                cautious_append: PLACEHOLDER_HANDLE,
            }),
            depth: Cell::new(0),
        };
        let stdlib = StdlibHandles {
            main: context.build("main", main_routine),
            trusting_append: context.build("trusting-append", |nested| std_append(nested, true)),
            cautious_append: context.build("cautious-append", |nested| std_append(nested, false)),
        };
        debug!(target: "trellis::compiler", "compiled stdlib {stdlib:?}");
        context.stdlib.set(stdlib);
        context
    }

    /// The program being compiled into.
    #[inline]
    pub const fn program(&self) -> &SharedProgram {
        &self.program
    }

    /// The name resolver.
    #[inline]
    pub fn resolver(&self) -> &dyn CompileTimeResolver {
        self.resolver.as_ref()
    }

    /// The macro tables.
    #[inline]
    pub const fn macros(&self) -> &Macros {
        &self.macros
    }

    /// Handles of the stdlib routines.
    #[inline]
    pub fn stdlib(&self) -> StdlibHandles {
        self.stdlib.get()
    }

    /// Patch and snapshot the program.
    pub fn capture(&self) -> SerializedProgram {
        self.program.borrow_mut().capture(&self.stdlib.get())
    }

    /// Note the start of a (possibly nested) block compilation.
    pub(crate) fn enter(&self) {
        self.depth.set(self.depth.get() + 1);
    }

    /// Note the end of a block compilation. Deferred words are patched once
    /// the outermost one finishes.
    pub(crate) fn leave(&self) {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            let mut program = self.program.borrow_mut();
            program.heap.patch_stdlibs(&self.stdlib.get());
            program.heap.patch_placeholders();
        }
    }

    fn build<F>(&self, name: &str, routine: F) -> i32
    where
        F: FnOnce(&mut TemplateCompiler<'_>),
    {
        let meta = CompileMeta {
            referrer: json!({}),
            ..CompileMeta::default()
        };
        let mut compiler = TemplateCompiler::new(self, Rc::new(meta));
        routine(&mut compiler);
        match compiler.commit() {
            Ok(handle) => handle,
            Err(errors) => {
                warn!(target: "trellis::compiler", "stdlib routine {name}: {errors}");
                errors.handle
            }
        }
    }
}

/// Render the component whose definition, layout handle and symbol table
/// `Main` finds on the stack.
fn main_routine(compiler: &mut TemplateCompiler<'_>) {
    compiler.push(Op::Main, [Operand::Register(Register::S0)]);
    compiler.invoke_prepared_component(false, false, true, Populate::Ready);
}

/// Append the reference on top of the stack according to its content.
fn std_append(compiler: &mut TemplateCompiler<'_>, trusting: bool) {
    compiler.push(Op::ContentType, []);
    let string: Clause<'_, '_> = if trusting {
        Box::new(|nested| {
            nested.push(Op::AssertSame, []);
            nested.push(Op::AppendHTML, []);
        })
    } else {
        Box::new(|nested| nested.push(Op::AppendText, []))
    };
    let component: Clause<'_, '_> = Box::new(|nested| {
        nested.push(Op::PushCurriedComponent, []);
        nested.push(Op::PushDynamicComponentInstance, []);
        nested.invoke_bare_component();
    });
    let safe_string: Clause<'_, '_> = Box::new(|nested| {
        nested.push(Op::AssertSame, []);
        nested.push(Op::AppendSafeHTML, []);
    });
    compiler.switch_cases(vec![
        (ContentType::String as i32, string),
        (ContentType::Component as i32, component),
        (ContentType::SafeString as i32, safe_string),
    ]);
}
