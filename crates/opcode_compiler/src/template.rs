//! Compilable units: layouts, partials and inline blocks.

use anyhow::Result;
use core::cell::{OnceCell, RefCell};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::rc::Rc;
use trellis_program::PLACEHOLDER_HANDLE;
use trellis_wire_format::{
    Blocks, InlineBlock, SerializedTemplate, SerializedTemplateBlock, Statement,
};

use crate::compiler::TemplateCompiler;
use crate::context::SyntaxContext;
use crate::error::CompileErrors;

/// Name of the symbol holding the caller's `...attributes` block.
pub const ATTRS_BLOCK: &str = "&attrs";

/// Per-template facts shared by the template and every block nested in it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompileMeta {
    /// Whether free variables resolve against the partial's locals.
    pub as_partial: bool,
    /// The template's symbols, when it contains `{{partial}}` or `{{debugger}}`.
    pub eval_symbols: Option<Vec<String>>,
    /// Names of free variables.
    pub upvars: Vec<String>,
    /// Template metadata passed to the resolver.
    pub referrer: Json,
    /// Number of local symbols.
    pub size: usize,
    /// The local symbols, starting at slot 1.
    pub symbols: Vec<String>,
}

impl CompileMeta {
    /// Metadata for a top-level block.
    pub fn for_block(block: &SerializedTemplateBlock, referrer: Json, as_partial: bool) -> Self {
        Self {
            as_partial,
            eval_symbols: block.has_eval.then(|| block.symbols.clone()),
            upvars: block.upvars.clone(),
            referrer,
            size: block.symbols.len(),
            symbols: block.symbols.clone(),
        }
    }

    /// The slot of a `&name` block symbol.
    pub fn block_symbol(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .position(|symbol| symbol.strip_prefix('&') == Some(name))
            .map(|index| index as u32 + 1)
    }
}

/// How a compiled block binds its scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolTable {
    /// A layout or partial with its own root scope.
    Program {
        /// Local symbols from slot 1.
        symbols: Vec<String>,
        /// Whether the template uses `{{partial}}` or `{{debugger}}`.
        has_eval: bool,
    },
    /// A nested block that binds parameters into a child scope.
    Block {
        /// Slots the block parameters are bound to.
        parameters: Vec<u32>,
    },
}

impl SymbolTable {
    /// The block parameter slots; empty for programs.
    pub fn parameters(&self) -> &[u32] {
        match self {
            Self::Program { .. } => &[],
            Self::Block { parameters } => parameters,
        }
    }

    /// The program symbols; empty for blocks.
    pub fn symbols(&self) -> &[String] {
        match self {
            Self::Program { symbols, .. } => symbols,
            Self::Block { .. } => &[],
        }
    }

    /// Whether this is a program using eval features.
    pub const fn has_eval(&self) -> bool {
        matches!(self, Self::Program { has_eval: true, .. })
    }
}

/// Statements plus everything needed to compile them on demand.
///
/// Compilation happens at most once: the first call stores the result, and
/// recursive calls made while compiling see [`PLACEHOLDER_HANDLE`].
#[derive(Debug)]
pub struct CompilableTemplate {
    statements: Vec<Statement>,
    meta: Rc<CompileMeta>,
    table: SymbolTable,
    compiled: RefCell<Option<Result<i32, CompileErrors>>>,
}

impl CompilableTemplate {
    /// A compilable unit.
    pub fn new(statements: Vec<Statement>, meta: Rc<CompileMeta>, table: SymbolTable) -> Self {
        Self {
            statements,
            meta,
            table,
            compiled: RefCell::new(None),
        }
    }

    /// A nested block sharing its template's metadata.
    pub fn block(block: &InlineBlock, containing: &Rc<CompileMeta>) -> Self {
        Self::new(
            block.statements.clone(),
            Rc::clone(containing),
            SymbolTable::Block {
                parameters: block.parameters.clone(),
            },
        )
    }

    /// The block's symbol table.
    #[inline]
    pub const fn symbol_table(&self) -> &SymbolTable {
        &self.table
    }

    /// The template metadata.
    #[inline]
    pub fn meta(&self) -> &Rc<CompileMeta> {
        &self.meta
    }

    /// The handle, once compilation has started.
    pub fn handle(&self) -> Option<i32> {
        self.compiled.borrow().as_ref().map(|result| match result {
            Ok(handle) => *handle,
            Err(errors) => errors.handle,
        })
    }

    /// Compile into `context`'s program, or return the earlier result.
    ///
    /// # Errors
    /// Returns every compile error found in the statements.
    pub fn compile(&self, context: &SyntaxContext) -> Result<i32, CompileErrors> {
        if let Some(result) = self.compiled.borrow().as_ref() {
            return result.clone();
        }
        *self.compiled.borrow_mut() = Some(Ok(PLACEHOLDER_HANDLE));

        context.enter();
        let mut compiler = TemplateCompiler::new(context, Rc::clone(&self.meta));
        compiler.statements(&self.statements);
        let result = compiler.commit();
        match &result {
            Ok(handle) => debug!(target: "trellis::compiler", "compiled block to handle {handle}"),
            Err(errors) => debug!(
                target: "trellis::compiler",
                "compiled block to handle {} with {} error(s)",
                errors.handle,
                errors.errors.len()
            ),
        }
        *self.compiled.borrow_mut() = Some(result.clone());
        context.leave();
        result
    }
}

/// A parsed template that can be compiled as a layout or a partial.
#[derive(Debug)]
pub struct Template {
    id: String,
    block: SerializedTemplateBlock,
    referrer: Json,
    layout: OnceCell<Rc<CompilableTemplate>>,
    partial: OnceCell<Rc<CompilableTemplate>>,
}

impl Template {
    /// Parse `serialized`'s block.
    ///
    /// # Errors
    /// Returns an error if the block does not parse.
    pub fn new(serialized: &SerializedTemplate) -> Result<Self> {
        Ok(Self::from_block(
            serialized.id.clone().unwrap_or_else(|| "client".to_owned()),
            serialized.parse_block()?,
            serialized.meta.clone(),
        ))
    }

    /// A template around an already parsed block.
    pub fn from_block(id: impl Into<String>, block: SerializedTemplateBlock, referrer: Json) -> Self {
        Self {
            id: id.into(),
            block,
            referrer,
            layout: OnceCell::new(),
            partial: OnceCell::new(),
        }
    }

    /// The template id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The top-level symbols.
    #[inline]
    pub fn symbols(&self) -> &[String] {
        &self.block.symbols
    }

    /// The metadata handed to resolvers.
    #[inline]
    pub const fn referrer(&self) -> &Json {
        &self.referrer
    }

    /// The template compiled as a component layout.
    pub fn as_layout(&self) -> Rc<CompilableTemplate> {
        Rc::clone(self.layout.get_or_init(|| Rc::new(self.compilable(false))))
    }

    /// The template compiled as a partial, resolving free names against the
    /// caller's locals.
    pub fn as_partial(&self) -> Rc<CompilableTemplate> {
        Rc::clone(self.partial.get_or_init(|| Rc::new(self.compilable(true))))
    }

    fn compilable(&self, as_partial: bool) -> CompilableTemplate {
        CompilableTemplate::new(
            self.block.statements.clone(),
            Rc::new(CompileMeta::for_block(&self.block, self.referrer.clone(), as_partial)),
            SymbolTable::Program {
                symbols: self.block.symbols.clone(),
                has_eval: self.block.has_eval,
            },
        )
    }
}

/// The named blocks passed to an invocation.
///
/// A name may map to no block, which still counts as passed.
#[derive(Clone, Debug, Default)]
pub struct NamedBlocks {
    entries: Option<Vec<(String, Option<Rc<CompilableTemplate>>)>>,
}

impl NamedBlocks {
    /// No blocks at all.
    pub const EMPTY: Self = Self { entries: None };

    /// Blocks from `(name, block)` pairs.
    pub fn new(entries: Vec<(String, Option<Rc<CompilableTemplate>>)>) -> Self {
        Self {
            entries: Some(entries),
        }
    }

    /// Compile-ready blocks from the wire format.
    pub fn from_wire(blocks: Option<&Blocks>, meta: &Rc<CompileMeta>) -> Self {
        blocks.map_or(Self::EMPTY, |blocks| {
            Self::new(
                blocks
                    .names
                    .iter()
                    .zip(&blocks.blocks)
                    .map(|(name, block)| {
                        (name.clone(), Some(Rc::new(CompilableTemplate::block(block, meta))))
                    })
                    .collect(),
            )
        })
    }

    /// The block called `name`.
    pub fn get(&self, name: &str) -> Option<&Rc<CompilableTemplate>> {
        self.entries
            .iter()
            .flatten()
            .find(|(known, _)| known == name)
            .and_then(|(_, block)| block.as_ref())
    }

    /// Whether `name` was passed.
    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().flatten().any(|(known, _)| known == name)
    }

    /// A copy with `name` bound to `block`.
    pub fn with(&self, name: &str, block: Option<Rc<CompilableTemplate>>) -> Self {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .flatten()
            .filter(|(known, _)| known != name)
            .cloned()
            .collect();
        entries.push((name.to_owned(), block));
        Self::new(entries)
    }

    /// The passed names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flatten()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The passed entries, in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&Rc<CompilableTemplate>>)> {
        self.entries
            .iter()
            .flatten()
            .map(|(name, block)| (name.as_str(), block.as_ref()))
    }

    /// Whether any block list was passed.
    #[inline]
    pub const fn has_any(&self) -> bool {
        self.entries.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(statements: Vec<Statement>) -> InlineBlock {
        InlineBlock {
            statements,
            parameters: vec![1],
        }
    }

    /// Test name lookup in named blocks, including empty entries.
    ///
    /// # Panics
    /// Panics if a passed name is not found.
    #[test]
    fn named_blocks_track_presence() {
        let meta = Rc::new(CompileMeta::default());
        let blocks = NamedBlocks::from_wire(
            Some(&Blocks {
                names: vec!["default".to_owned()],
                blocks: vec![block(vec![Statement::text("hi")])],
            }),
            &meta,
        );
        assert!(blocks.has("default"));
        assert_eq!(
            blocks.get("default").map(|block| block.symbol_table().parameters().to_vec()),
            Some(vec![1])
        );

        let with_attrs = blocks.with("attrs", None);
        assert!(with_attrs.has("attrs"));
        assert!(with_attrs.get("attrs").is_none());
        assert_eq!(with_attrs.names(), ["default", "attrs"]);

        assert!(!NamedBlocks::EMPTY.has_any());
        assert!(NamedBlocks::EMPTY.with("attrs", None).has_any());
    }

    /// Test block symbol lookup.
    ///
    /// # Panics
    /// Panics if a block symbol gets the wrong slot.
    #[test]
    fn finds_block_symbols() {
        let meta = CompileMeta::for_block(
            &SerializedTemplateBlock {
                symbols: vec!["@title".to_owned(), "&default".to_owned()],
                statements: Vec::new(),
                has_eval: true,
                upvars: Vec::new(),
            },
            Json::Null,
            false,
        );
        assert_eq!(meta.block_symbol("default"), Some(2));
        assert_eq!(meta.block_symbol("title"), None);
        assert_eq!(meta.size, 2);
        assert_eq!(meta.eval_symbols.as_deref().map(<[String]>::len), Some(2));
    }
}
