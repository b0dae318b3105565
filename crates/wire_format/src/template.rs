//! Whole precompiled templates.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::statement::Statement;

/// The top-level block of a template.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedTemplateBlock {
    /// Names of the template's local symbols, from slot 1.
    pub symbols: Vec<String>,
    /// The template body.
    pub statements: Vec<Statement>,
    /// Whether the template uses `{{partial}}` or `{{debugger}}`.
    #[serde(rename = "hasEval", default)]
    pub has_eval: bool,
    /// Names of free variables, indexed by `GetFree`/`GetContextualFree`.
    #[serde(default)]
    pub upvars: Vec<String>,
}

/// A template block either still encoded as a JSON string or already parsed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateBlock {
    /// The block as a JSON string, parsed on first use.
    Json(String),
    /// The parsed block.
    Parsed(SerializedTemplateBlock),
}

/// A serialized template: `{id, meta, block}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedTemplate {
    /// Template identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Opaque metadata handed back to the resolver as the referrer.
    #[serde(default)]
    pub meta: serde_json::Value,
    /// The template body.
    pub block: TemplateBlock,
}

impl SerializedTemplate {
    /// A template around an already parsed block.
    pub fn new(id: impl Into<String>, block: SerializedTemplateBlock) -> Self {
        Self {
            id: Some(id.into()),
            meta: serde_json::Value::Null,
            block: TemplateBlock::Parsed(block),
        }
    }

    /// Parse a template from its JSON text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid template.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing serialized template")
    }

    /// The parsed top-level block.
    ///
    /// # Errors
    /// Returns an error if a JSON-string block does not parse.
    pub fn parse_block(&self) -> Result<SerializedTemplateBlock> {
        match &self.block {
            TemplateBlock::Parsed(block) => Ok(block.clone()),
            TemplateBlock::Json(text) => serde_json::from_str(text).with_context(|| {
                format!("parsing block of template {}", self.id.as_deref().unwrap_or("<anonymous>"))
            }),
        }
    }
}
