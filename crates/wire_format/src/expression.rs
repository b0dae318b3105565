//! Expressions: literals plus numerically tagged tuples.
//!
//! ```text
//! [24, symbol]                          GetSymbol
//! [25, upvar]                           GetFree
//! [26, upvar, context]                  GetContextualFree
//! [27, head, ["path", ...]]             GetPath
//! [28, block] / [29, block]             HasBlock / HasBlockParams
//! [30]                                  Undefined
//! [31, start, offset, head, params, hash]   Call
//! [32, [parts]]                         Concat
//! ```

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as Json, json};

use crate::tuple::{Tuple, expressions, json_serde, strings};

/// Expression discriminants.
pub mod tags {
    /// A local symbol.
    pub const GET_SYMBOL: u64 = 24;
    /// A free variable.
    pub const GET_FREE: u64 = 25;
    /// A free variable resolved by syntactic position.
    pub const GET_CONTEXTUAL_FREE: u64 = 26;
    /// A property path.
    pub const GET_PATH: u64 = 27;
    /// `has-block`.
    pub const HAS_BLOCK: u64 = 28;
    /// `has-block-params`.
    pub const HAS_BLOCK_PARAMS: u64 = 29;
    /// `undefined`.
    pub const UNDEFINED: u64 = 30;
    /// A helper call.
    pub const CALL: u64 = 31;
    /// String interpolation.
    pub const CONCAT: u64 = 32;
}

/// Where a free variable appeared, which decides how it resolves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpressionContext {
    /// `{{name}}` on its own: a helper if one resolves, else `this.name`.
    AppendSingleId,
    /// Any value position: always `this.name`.
    Expression,
    /// The head of a `(call)`.
    CallHead,
    /// The head of a `{{#block}}`.
    BlockHead,
    /// The head of a `{{modifier}}`.
    ModifierHead,
    /// The head of a component invocation.
    ComponentHead,
}

/// A JSON primitive literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number, kept in its JSON form.
    Number(Number),
    /// A string.
    String(String),
}

/// A source range as `start` plus `offset`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// First character.
    pub start: u32,
    /// Length in characters.
    pub offset: u32,
}

impl Span {
    /// One past the last character.
    #[inline]
    pub const fn end(&self) -> u32 {
        self.start + self.offset
    }
}

/// Named arguments: `[[keys], [values]]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hash {
    /// Argument names.
    pub keys: Vec<String>,
    /// Argument values, parallel to `keys`.
    pub values: Vec<Expression>,
}

impl Hash {
    /// The value for `key`.
    pub fn get(&self, key: &str) -> Option<&Expression> {
        self.keys
            .iter()
            .position(|name| name == key)
            .and_then(|index| self.values.get(index))
    }

    /// Whether there are no arguments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn from_json(json: &Json) -> Result<Self> {
        let Some([keys, values]) = json.as_array().map(Vec::as_slice) else {
            bail!("expected a [keys, values] hash, got {json}");
        };
        let hash = Self {
            keys: strings(keys)?,
            values: expressions(values)?,
        };
        if hash.keys.len() != hash.values.len() {
            bail!("hash has {} keys but {} values", hash.keys.len(), hash.values.len());
        }
        Ok(hash)
    }

    pub(crate) fn to_json(&self) -> Json {
        json!([self.keys, self.values.iter().map(Expression::to_json).collect::<Vec<_>>()])
    }
}

/// A template expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A primitive value.
    Literal(Literal),
    /// A local symbol by slot.
    GetSymbol(u32),
    /// A free variable by upvar index.
    GetFree(u32),
    /// A free variable resolved by where it appeared.
    GetContextualFree(u32, ExpressionContext),
    /// A property path off a head expression.
    GetPath(Box<Expression>, Vec<String>),
    /// Whether the block expression is present.
    HasBlock(Box<Expression>),
    /// Whether the block expression takes parameters.
    HasBlockParams(Box<Expression>),
    /// `undefined`.
    Undefined,
    /// A helper call.
    Call {
        /// Source range.
        span: Span,
        /// Helper name expression.
        head: Box<Expression>,
        /// Positional arguments.
        params: Option<Vec<Expression>>,
        /// Named arguments.
        hash: Option<Hash>,
    },
    /// String interpolation of the parts.
    Concat(Vec<Expression>),
}

impl Expression {
    /// A string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    /// `this.path` for a dotted path.
    pub fn this_path(path: &str) -> Self {
        Self::GetPath(
            Box::new(Self::GetSymbol(0)),
            path.split('.').map(str::to_owned).collect(),
        )
    }

    /// The string value of a string literal.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::Literal(Literal::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Parse from the JSON wire form.
    ///
    /// # Errors
    /// Returns an error for unknown tags or malformed fields.
    pub fn from_json(json: &Json) -> Result<Self> {
        let items = match json {
            Json::Null => return Ok(Self::Literal(Literal::Null)),
            Json::Bool(flag) => return Ok(Self::Literal(Literal::Bool(*flag))),
            Json::Number(number) => return Ok(Self::Literal(Literal::Number(number.clone()))),
            Json::String(value) => return Ok(Self::Literal(Literal::String(value.clone()))),
            Json::Object(_) => bail!("expected an expression, got {json}"),
            Json::Array(items) => items,
        };
        let tag = items
            .first()
            .and_then(Json::as_u64)
            .ok_or_else(|| anyhow!("expression tuple without a tag: {json}"))?;

        Ok(match tag {
            tags::GET_SYMBOL => Self::GetSymbol(Tuple::new(items, "GetSymbol").number(1)?),
            tags::GET_FREE => Self::GetFree(Tuple::new(items, "GetFree").number(1)?),
            tags::GET_CONTEXTUAL_FREE => {
                let tuple = Tuple::new(items, "GetContextualFree");
                let context = serde_json::from_value(tuple.at(2)?.clone())?;
                Self::GetContextualFree(tuple.number(1)?, context)
            }
            tags::GET_PATH => {
                let tuple = Tuple::new(items, "GetPath");
                Self::GetPath(Box::new(tuple.expression(1)?), strings(tuple.at(2)?)?)
            }
            tags::HAS_BLOCK => {
                Self::HasBlock(Box::new(Tuple::new(items, "HasBlock").expression(1)?))
            }
            tags::HAS_BLOCK_PARAMS => {
                Self::HasBlockParams(Box::new(Tuple::new(items, "HasBlockParams").expression(1)?))
            }
            tags::UNDEFINED => Self::Undefined,
            tags::CALL => {
                let tuple = Tuple::new(items, "Call");
                Self::Call {
                    span: Span {
                        start: tuple.number(1)?,
                        offset: tuple.number(2)?,
                    },
                    head: Box::new(tuple.expression(3)?),
                    params: tuple.params(4)?,
                    hash: tuple.hash(5)?,
                }
            }
            tags::CONCAT => Self::Concat(expressions(Tuple::new(items, "Concat").at(1)?)?),
            other => bail!("unknown expression tag {other}"),
        })
    }

    /// Write the JSON wire form.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Literal(Literal::Null) => Json::Null,
            Self::Literal(Literal::Bool(flag)) => Json::Bool(*flag),
            Self::Literal(Literal::Number(number)) => Json::Number(number.clone()),
            Self::Literal(Literal::String(value)) => Json::String(value.clone()),
            Self::GetSymbol(symbol) => json!([tags::GET_SYMBOL, symbol]),
            Self::GetFree(upvar) => json!([tags::GET_FREE, upvar]),
            Self::GetContextualFree(upvar, context) => {
                json!([tags::GET_CONTEXTUAL_FREE, upvar, context])
            }
            Self::GetPath(head, tail) => json!([tags::GET_PATH, head.to_json(), tail]),
            Self::HasBlock(block) => json!([tags::HAS_BLOCK, block.to_json()]),
            Self::HasBlockParams(block) => json!([tags::HAS_BLOCK_PARAMS, block.to_json()]),
            Self::Undefined => json!([tags::UNDEFINED]),
            Self::Call {
                span,
                head,
                params,
                hash,
            } => json!([
                tags::CALL,
                span.start,
                span.offset,
                head.to_json(),
                params.as_deref().map(params_json),
                hash.as_ref().map(Hash::to_json),
            ]),
            Self::Concat(parts) => json!([tags::CONCAT, params_json(parts)]),
        }
    }
}

pub(crate) fn params_json(params: &[Expression]) -> Json {
    Json::Array(params.iter().map(Expression::to_json).collect())
}

json_serde!(Expression);
json_serde!(Hash);

#[cfg(test)]
mod tests {
    use super::*;

    /// Test parsing of nested paths and calls.
    ///
    /// # Panics
    /// Panics if a field lands in the wrong place.
    #[test]
    fn parses_nested_tuples() -> Result<()> {
        let json: Json = serde_json::from_str(
            r#"[31,4,10,[27,[26,0,"CallHead"],[]],[[27,[24,0],["name"]]],[["sep"],[", "]]]"#,
        )?;
        let Expression::Call { span, head, params, hash } = Expression::from_json(&json)? else {
            return Err(anyhow!("expected a call"));
        };
        assert_eq!(span.end(), 14);
        assert_eq!(
            *head,
            Expression::GetPath(
                Box::new(Expression::GetContextualFree(0, ExpressionContext::CallHead)),
                Vec::new()
            )
        );
        assert_eq!(params, Some(vec![Expression::this_path("name")]));
        assert_eq!(
            hash.as_ref().and_then(|hash| hash.get("sep")),
            Some(&Expression::string(", "))
        );
        Ok(())
    }

    /// Test that malformed tuples are rejected.
    ///
    /// # Panics
    /// Panics if an invalid expression parses.
    #[test]
    fn rejects_unknown_tags() {
        assert!(Expression::from_json(&json!([99])).is_err());
        assert!(Expression::from_json(&json!([27, [24, 0]])).is_err());
        assert!(Hash::from_json(&json!([["a", "b"], [1]])).is_err());
    }
}
