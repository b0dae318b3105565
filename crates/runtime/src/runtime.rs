//! The handle tying a program, its resolver and the host environment
//! together.

use anyhow::{Result, anyhow};
use log::debug;
use std::rc::Rc;
use trellis_opcode_compiler::{CompilableTemplate, CompileTimeResolver, Macros, SyntaxContext};
use trellis_program::{Program, SerializedProgram, SharedProgram};

use crate::config::RuntimeConfig;
use crate::environment::Environment;
use crate::resolver::{Registry, RuntimeResolver};

/// Everything a render needs besides the template: the compiled program,
/// the names it was compiled against and the environment it renders into.
pub struct Runtime {
    env: Rc<Environment>,
    context: SyntaxContext,
    registry: Rc<Registry>,
    config: RuntimeConfig,
}

impl Runtime {
    /// A runtime compiling against `registry` into a fresh program.
    pub fn new(env: Rc<Environment>, registry: Rc<Registry>, config: RuntimeConfig) -> Rc<Self> {
        let program = Program::with_page_size(config.heap_page_size).shared();
        let resolver: Rc<dyn CompileTimeResolver> = Rc::clone(&registry) as _;
        let context = SyntaxContext::with_program(program, resolver, Macros::builtin());
        debug!(target: "trellis::runtime", "runtime ready with {config:?}");
        Rc::new(Self {
            env,
            context,
            registry,
            config,
        })
    }

    /// The host environment.
    #[inline]
    pub const fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    /// The compilation context.
    #[inline]
    pub const fn context(&self) -> &SyntaxContext {
        &self.context
    }

    /// The program every template is compiled into.
    #[inline]
    pub const fn program(&self) -> &SharedProgram {
        self.context.program()
    }

    /// The registry names are resolved against.
    #[inline]
    pub const fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    /// The registry as the VM sees it.
    pub fn resolver(&self) -> Rc<dyn RuntimeResolver> {
        Rc::clone(&self.registry) as _
    }

    /// Settings.
    #[inline]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compile `template`, returning its handle.
    ///
    /// # Errors
    /// Returns the compile errors, joined.
    pub fn compile(&self, template: &CompilableTemplate) -> Result<i32> {
        template
            .compile(&self.context)
            .map_err(|errors| anyhow!("{errors}"))
    }

    /// Snapshot the program compiled so far.
    pub fn serialize(&self) -> SerializedProgram {
        self.context.capture()
    }
}
