//! The precompiled template format of the Trellis rendering VM.
//!
//! Templates arrive already parsed into nested, numerically tagged JSON
//! tuples. This crate gives them Rust types that (de)serialize to exactly
//! that form:
//!
//! ```text
//! {"id": "...", "meta": {...}, "block": "{\"symbols\":[...],\"statements\":[...]}"}
//!                                                │
//!                     [9,"div",true]  [12,"id","intro",null]  [1,0,0,0,[27,[24,0],["count"]]]
//!                      OpenElement     StaticAttr              Append(this.count)
//! ```

mod expression;
mod statement;
mod template;
mod tuple;

pub use expression::{Expression, ExpressionContext, Hash, Literal, Span};
pub use statement::{Blocks, DynamicAttribute, InlineBlock, Statement, StaticAttribute};
pub use template::{SerializedTemplate, SerializedTemplateBlock, TemplateBlock};

/// Numeric discriminants of expression tuples.
pub mod expression_tags {
    pub use crate::expression::tags::*;
}

/// Numeric discriminants of statement tuples.
pub mod statement_tags {
    pub use crate::statement::tags::*;
}
