//! The Trellis runtime: runs compiled templates against a DOM and keeps
//! the result current.
//!
//! - [`render::render_template`] / [`render::render_component`]: the first
//!   render, driven by the append VM in [`vm`]
//! - [`render::RenderResult::rerender`]: revalidation, driven by the
//!   [`updating`] program the first render left behind
//! - [`scheduler::RenderLoop`]: re-renders after tracked writes
//!
//! # Architecture
//!
//! ```text
//!  Template ──compile──► heap ──► LowLevelVm ──syscalls──► Vm (opcodes)
//!                                                            │
//!                               ElementBuilder ◄─────────────┤
//!                                    │ DOM                   │ updating ops
//!                                    ▼                       ▼
//!                              LiveBlock bounds ◄──── TryBlock / ListBlock
//!                                                            │
//!                                   UpdatingVm::execute ◄────┘ rerender
//! ```

#![allow(
    clippy::module_name_repetitions,
    reason = "ElementBuilder, RuntimeConfig and RenderResult read better with their module's name"
)]

pub mod builder;
pub mod component;
pub mod config;
pub mod destroyable;
pub mod environment;
pub mod low_level;
pub mod modifier;
mod opcodes;
pub mod references;
pub mod render;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod updating;
pub mod vm;

pub use config::RuntimeConfig;
pub use environment::{DefaultEnvironment, Environment, EnvironmentDelegate};
pub use render::{RenderResult, render_component, render_template};
pub use resolver::{ManagerRegistry, Registry, RuntimeResolver};
pub use runtime::Runtime;
pub use scheduler::RenderLoop;
