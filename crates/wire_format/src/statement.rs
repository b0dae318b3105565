//! Statements and the blocks that nest them.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use crate::expression::{Expression, Hash, Span, params_json};
use crate::tuple::{Tuple, json_serde, strings};

/// Statement discriminants.
pub mod tags {
    /// `{{value}}` or static text.
    pub const APPEND: u64 = 1;
    /// `<!-- comment -->`.
    pub const COMMENT: u64 = 2;
    /// `{{modifier}}` in element position.
    pub const MODIFIER: u64 = 3;
    /// `{{#block}}`.
    pub const BLOCK: u64 = 5;
    /// `<Component>`.
    pub const COMPONENT: u64 = 7;
    /// `<tag`.
    pub const OPEN_ELEMENT: u64 = 9;
    /// `>` after the attributes.
    pub const FLUSH_ELEMENT: u64 = 10;
    /// `</tag>`.
    pub const CLOSE_ELEMENT: u64 = 11;
    /// `name="value"`.
    pub const STATIC_ATTR: u64 = 12;
    /// `name={{value}}`.
    pub const DYNAMIC_ATTR: u64 = 13;
    /// A dynamic attribute inside a component's `...attributes`.
    pub const COMPONENT_ATTR: u64 = 14;
    /// `...attributes`.
    pub const ATTR_SPLAT: u64 = 15;
    /// `{{yield}}`.
    pub const YIELD: u64 = 16;
    /// `{{partial}}`.
    pub const PARTIAL: u64 = 17;
    /// `name={{{value}}}`.
    pub const TRUSTING_DYNAMIC_ATTR: u64 = 20;
    /// A trusting attribute inside `...attributes`.
    pub const TRUSTING_COMPONENT_ATTR: u64 = 21;
    /// `{{debugger}}`.
    pub const DEBUGGER: u64 = 22;
    /// A static attribute inside `...attributes`.
    pub const STATIC_COMPONENT_ATTR: u64 = 23;
}

/// A static `name="value"` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: String,
    /// Attribute namespace.
    pub namespace: Option<String>,
}

/// A dynamic `name={{value}}` attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicAttribute {
    /// Attribute name.
    pub name: String,
    /// Value expression.
    pub value: Expression,
    /// Attribute namespace.
    pub namespace: Option<String>,
}

/// A nested block with its parameter symbols.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineBlock {
    /// Block body.
    pub statements: Vec<Statement>,
    /// Symbols the block's parameters bind to.
    #[serde(default)]
    pub parameters: Vec<u32>,
}

/// Named blocks: `[[names], [blocks]]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blocks {
    /// Block names such as `default` or `else`.
    pub names: Vec<String>,
    /// Blocks, parallel to `names`.
    pub blocks: Vec<InlineBlock>,
}

impl Blocks {
    /// The block called `name`.
    pub fn get(&self, name: &str) -> Option<&InlineBlock> {
        self.names
            .iter()
            .position(|known| known == name)
            .and_then(|index| self.blocks.get(index))
    }

    fn from_json(json: &Json) -> Result<Self> {
        let Some([names, blocks]) = json.as_array().map(Vec::as_slice) else {
            bail!("expected [names, blocks], got {json}");
        };
        let blocks = Self {
            names: strings(names)?,
            blocks: serde_json::from_value(blocks.clone())?,
        };
        if blocks.names.len() != blocks.blocks.len() {
            bail!("{} block names for {} blocks", blocks.names.len(), blocks.blocks.len());
        }
        Ok(blocks)
    }

    fn to_json(&self) -> Json {
        json!([self.names, self.blocks])
    }
}

json_serde!(Blocks);

/// A template statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// Append a value; trusted strings are static text or raw HTML.
    Append {
        /// `{{{triple}}}` or static text.
        trusted: bool,
        /// Source range.
        span: Span,
        /// The appended value.
        value: Expression,
    },
    /// An HTML comment.
    Comment(String),
    /// An element modifier.
    Modifier {
        /// Source range.
        span: Span,
        /// Modifier name expression.
        head: Expression,
        /// Positional arguments.
        params: Option<Vec<Expression>>,
        /// Named arguments.
        hash: Option<Hash>,
    },
    /// A block invocation.
    Block {
        /// Block name expression.
        head: Expression,
        /// Positional arguments.
        params: Option<Vec<Expression>>,
        /// Named arguments.
        hash: Option<Hash>,
        /// The named blocks passed.
        blocks: Option<Blocks>,
    },
    /// A component invocation.
    Component {
        /// A static tag name, or an expression producing a definition.
        tag: Expression,
        /// Attribute statements forwarded to `...attributes`.
        attrs: Vec<Statement>,
        /// `@named` arguments.
        args: Option<Hash>,
        /// The named blocks passed.
        blocks: Option<Blocks>,
    },
    /// Open an element.
    OpenElement {
        /// Tag name.
        tag: String,
        /// Whether the element has no `...attributes` or modifiers.
        simple: bool,
    },
    /// Finish the open tag.
    FlushElement,
    /// Close the current element.
    CloseElement,
    /// A static attribute.
    StaticAttr(StaticAttribute),
    /// A dynamic attribute.
    DynamicAttr(DynamicAttribute),
    /// A dynamic attribute that may be overridden by splatted attributes.
    ComponentAttr(DynamicAttribute),
    /// Splat the caller's attributes block.
    AttrSplat(u32),
    /// Yield to the block in symbol `to`.
    Yield {
        /// Block symbol.
        to: u32,
        /// Block parameters.
        params: Option<Vec<Expression>>,
    },
    /// A runtime-resolved partial.
    Partial {
        /// Partial name expression.
        name: Expression,
        /// Symbols visible to the partial.
        eval_info: Vec<u32>,
    },
    /// A dynamic attribute whose strings are not escaped.
    TrustingDynamicAttr(DynamicAttribute),
    /// A trusting component attribute.
    TrustingComponentAttr(DynamicAttribute),
    /// Log the visible locals.
    Debugger(Vec<u32>),
    /// A static attribute that may be overridden by splatted attributes.
    StaticComponentAttr(StaticAttribute),
}

impl Statement {
    /// Static text.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Append {
            trusted: true,
            span: Span::default(),
            value: Expression::string(value),
        }
    }

    /// Parse from the JSON wire form.
    ///
    /// # Errors
    /// Returns an error for unknown tags or malformed fields.
    pub fn from_json(json: &Json) -> Result<Self> {
        let items = json
            .as_array()
            .ok_or_else(|| anyhow!("expected a statement tuple, got {json}"))?;
        let tag = items
            .first()
            .and_then(Json::as_u64)
            .ok_or_else(|| anyhow!("statement tuple without a tag: {json}"))?;

        Ok(match tag {
            tags::APPEND => {
                let tuple = Tuple::new(items, "Append");
                Self::Append {
                    trusted: tuple.flag(1)?,
                    span: Span {
                        start: tuple.number(2)?,
                        offset: tuple.number(3)?,
                    },
                    value: tuple.expression(4)?,
                }
            }
            tags::COMMENT => Self::Comment(Tuple::new(items, "Comment").string(1)?),
            tags::MODIFIER => {
                let tuple = Tuple::new(items, "Modifier");
                Self::Modifier {
                    span: Span {
                        start: tuple.number(1)?,
                        offset: tuple.number(2)?,
                    },
                    head: tuple.expression(3)?,
                    params: tuple.params(4)?,
                    hash: tuple.hash(5)?,
                }
            }
            tags::BLOCK => {
                let tuple = Tuple::new(items, "Block");
                Self::Block {
                    head: tuple.expression(1)?,
                    params: tuple.params(2)?,
                    hash: tuple.hash(3)?,
                    blocks: tuple.optional(4).map(Blocks::from_json).transpose()?,
                }
            }
            tags::COMPONENT => {
                let tuple = Tuple::new(items, "Component");
                Self::Component {
                    tag: tuple.expression(1)?,
                    attrs: statements(tuple.at(2)?)?,
                    args: tuple.hash(3)?,
                    blocks: tuple.optional(4).map(Blocks::from_json).transpose()?,
                }
            }
            tags::OPEN_ELEMENT => {
                let tuple = Tuple::new(items, "OpenElement");
                Self::OpenElement {
                    tag: tuple.string(1)?,
                    simple: tuple.flag(2)?,
                }
            }
            tags::FLUSH_ELEMENT => Self::FlushElement,
            tags::CLOSE_ELEMENT => Self::CloseElement,
            tags::STATIC_ATTR => Self::StaticAttr(static_attribute(&Tuple::new(items, "StaticAttr"))?),
            tags::STATIC_COMPONENT_ATTR => Self::StaticComponentAttr(static_attribute(
                &Tuple::new(items, "StaticComponentAttr"),
            )?),
            tags::DYNAMIC_ATTR => {
                Self::DynamicAttr(dynamic_attribute(&Tuple::new(items, "DynamicAttr"))?)
            }
            tags::TRUSTING_DYNAMIC_ATTR => Self::TrustingDynamicAttr(dynamic_attribute(
                &Tuple::new(items, "TrustingDynamicAttr"),
            )?),
            tags::COMPONENT_ATTR => {
                Self::ComponentAttr(dynamic_attribute(&Tuple::new(items, "ComponentAttr"))?)
            }
            tags::TRUSTING_COMPONENT_ATTR => Self::TrustingComponentAttr(dynamic_attribute(
                &Tuple::new(items, "TrustingComponentAttr"),
            )?),
            tags::ATTR_SPLAT => Self::AttrSplat(Tuple::new(items, "AttrSplat").number(1)?),
            tags::YIELD => {
                let tuple = Tuple::new(items, "Yield");
                Self::Yield {
                    to: tuple.number(1)?,
                    params: tuple.params(2)?,
                }
            }
            tags::PARTIAL => {
                let tuple = Tuple::new(items, "Partial");
                Self::Partial {
                    name: tuple.expression(1)?,
                    eval_info: tuple.numbers(2)?,
                }
            }
            tags::DEBUGGER => Self::Debugger(Tuple::new(items, "Debugger").numbers(1)?),
            other => bail!("unknown statement tag {other}"),
        })
    }

    /// Write the JSON wire form.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Append {
                trusted,
                span,
                value,
            } => json!([tags::APPEND, u8::from(*trusted), span.start, span.offset, value.to_json()]),
            Self::Comment(text) => json!([tags::COMMENT, text]),
            Self::Modifier {
                span,
                head,
                params,
                hash,
            } => json!([
                tags::MODIFIER,
                span.start,
                span.offset,
                head.to_json(),
                params.as_deref().map(params_json),
                hash.as_ref().map(Hash::to_json),
            ]),
            Self::Block {
                head,
                params,
                hash,
                blocks,
            } => json!([
                tags::BLOCK,
                head.to_json(),
                params.as_deref().map(params_json),
                hash.as_ref().map(Hash::to_json),
                blocks.as_ref().map(Blocks::to_json),
            ]),
            Self::Component {
                tag,
                attrs,
                args,
                blocks,
            } => json!([
                tags::COMPONENT,
                tag.to_json(),
                attrs.iter().map(Self::to_json).collect::<Vec<_>>(),
                args.as_ref().map(Hash::to_json),
                blocks.as_ref().map(Blocks::to_json),
            ]),
            Self::OpenElement { tag, simple } => json!([tags::OPEN_ELEMENT, tag, simple]),
            Self::FlushElement => json!([tags::FLUSH_ELEMENT]),
            Self::CloseElement => json!([tags::CLOSE_ELEMENT]),
            Self::StaticAttr(attribute) => static_json(tags::STATIC_ATTR, attribute),
            Self::StaticComponentAttr(attribute) => {
                static_json(tags::STATIC_COMPONENT_ATTR, attribute)
            }
            Self::DynamicAttr(attribute) => dynamic_json(tags::DYNAMIC_ATTR, attribute),
            Self::TrustingDynamicAttr(attribute) => {
                dynamic_json(tags::TRUSTING_DYNAMIC_ATTR, attribute)
            }
            Self::ComponentAttr(attribute) => dynamic_json(tags::COMPONENT_ATTR, attribute),
            Self::TrustingComponentAttr(attribute) => {
                dynamic_json(tags::TRUSTING_COMPONENT_ATTR, attribute)
            }
            Self::AttrSplat(to) => json!([tags::ATTR_SPLAT, to]),
            Self::Yield { to, params } => {
                json!([tags::YIELD, to, params.as_deref().map(params_json)])
            }
            Self::Partial { name, eval_info } => json!([tags::PARTIAL, name.to_json(), eval_info]),
            Self::Debugger(eval_info) => json!([tags::DEBUGGER, eval_info]),
        }
    }
}

json_serde!(Statement);

fn statements(json: &Json) -> Result<Vec<Statement>> {
    json.as_array()
        .ok_or_else(|| anyhow!("expected an array of statements, got {json}"))?
        .iter()
        .map(Statement::from_json)
        .collect()
}

fn static_attribute(tuple: &Tuple<'_>) -> Result<StaticAttribute> {
    Ok(StaticAttribute {
        name: tuple.string(1)?,
        value: tuple.string(2)?,
        namespace: tuple.optional_string(3)?,
    })
}

fn dynamic_attribute(tuple: &Tuple<'_>) -> Result<DynamicAttribute> {
    Ok(DynamicAttribute {
        name: tuple.string(1)?,
        value: tuple.expression(2)?,
        namespace: tuple.optional_string(3)?,
    })
}

fn static_json(tag: u64, attribute: &StaticAttribute) -> Json {
    json!([tag, attribute.name, attribute.value, attribute.namespace])
}

fn dynamic_json(tag: u64, attribute: &DynamicAttribute) -> Json {
    json!([tag, attribute.name, attribute.value.to_json(), attribute.namespace])
}
