//! Compiles wire-format templates into Trellis VM instructions.
//!
//! Compilation is lazy: a top-level template compiles when first invoked,
//! nested blocks compile when the VM first reaches them (`CompileBlock`),
//! and statically known component layouts compile eagerly at their call
//! site.
//!
//! ```text
//!  SerializedTemplate ──► Template ──► CompilableTemplate ──► TemplateCompiler
//!                                             │                    │
//!                          SyntaxContext ─────┤          macros / resolver
//!                                             ▼                    │
//!                                    Program (heap + constants) ◄──┘
//! ```

mod compiler;
mod context;
mod encoder;
mod error;
mod macros;
mod resolver;
mod template;

pub use compiler::{Clause, Populate, TemplateCompiler};
pub use context::{ContentType, SyntaxContext};
pub use encoder::{Encoder, Operand, Primitive};
pub use error::{CompileError, CompileErrors};
pub use macros::{BlockInvocation, BlockMacro, InlineInvocation, InlineMacro, Macros};
pub use resolver::{Capabilities, CompileTimeComponent, CompileTimeResolver, NoopResolver};
pub use template::{
    ATTRS_BLOCK, CompilableTemplate, CompileMeta, NamedBlocks, SymbolTable, Template,
};
