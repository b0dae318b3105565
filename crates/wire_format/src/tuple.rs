//! Reading positional fields out of a tagged JSON tuple.

use anyhow::{Context as _, Result, anyhow, bail};
use serde_json::Value as Json;

use crate::expression::{Expression, Hash};

/// A borrowed `[opcode, field, field, ...]` array.
pub(crate) struct Tuple<'json> {
    items: &'json [Json],
    kind: &'static str,
}

impl<'json> Tuple<'json> {
    pub(crate) const fn new(items: &'json [Json], kind: &'static str) -> Self {
        Self { items, kind }
    }

    pub(crate) fn at(&self, index: usize) -> Result<&'json Json> {
        self.items
            .get(index)
            .ok_or_else(|| anyhow!("{} is missing field {index}", self.kind))
    }

    /// A field that may be absent or `null`.
    pub(crate) fn optional(&self, index: usize) -> Option<&'json Json> {
        self.items.get(index).filter(|json| !json.is_null())
    }

    pub(crate) fn string(&self, index: usize) -> Result<String> {
        self.at(index)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("{} field {index} must be a string", self.kind))
    }

    pub(crate) fn optional_string(&self, index: usize) -> Result<Option<String>> {
        self.optional(index)
            .map(|json| {
                json.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("{} field {index} must be a string", self.kind))
            })
            .transpose()
    }

    pub(crate) fn number(&self, index: usize) -> Result<u32> {
        self.at(index)?
            .as_u64()
            .and_then(|number| u32::try_from(number).ok())
            .ok_or_else(|| anyhow!("{} field {index} must be an unsigned integer", self.kind))
    }

    /// A flag written either as a boolean or as `0`/`1`.
    pub(crate) fn flag(&self, index: usize) -> Result<bool> {
        match self.at(index)? {
            Json::Bool(flag) => Ok(*flag),
            Json::Number(number) => Ok(number.as_u64().is_some_and(|number| number != 0)),
            other => bail!("{} field {index} must be a flag, got {other}", self.kind),
        }
    }

    pub(crate) fn numbers(&self, index: usize) -> Result<Vec<u32>> {
        symbols(self.at(index)?).with_context(|| format!("{} field {index}", self.kind))
    }

    pub(crate) fn expression(&self, index: usize) -> Result<Expression> {
        Expression::from_json(self.at(index)?)
            .with_context(|| format!("{} field {index}", self.kind))
    }

    pub(crate) fn params(&self, index: usize) -> Result<Option<Vec<Expression>>> {
        self.optional(index).map(expressions).transpose()
    }

    pub(crate) fn hash(&self, index: usize) -> Result<Option<Hash>> {
        self.optional(index).map(Hash::from_json).transpose()
    }
}

/// Read a JSON array of expressions.
pub(crate) fn expressions(json: &Json) -> Result<Vec<Expression>> {
    json.as_array()
        .ok_or_else(|| anyhow!("expected an array of expressions, got {json}"))?
        .iter()
        .map(Expression::from_json)
        .collect()
}

/// Read a JSON array of symbol numbers.
pub(crate) fn symbols(json: &Json) -> Result<Vec<u32>> {
    json.as_array()
        .ok_or_else(|| anyhow!("expected an array of symbols, got {json}"))?
        .iter()
        .map(|symbol| {
            symbol
                .as_u64()
                .and_then(|number| u32::try_from(number).ok())
                .ok_or_else(|| anyhow!("expected a symbol number, got {symbol}"))
        })
        .collect()
}

/// Read a JSON array of strings.
pub(crate) fn strings(json: &Json) -> Result<Vec<String>> {
    json.as_array()
        .ok_or_else(|| anyhow!("expected an array of strings, got {json}"))?
        .iter()
        .map(|name| {
            name.as_str()
                .map(str::to_owned)
                .ok_or_else(|| anyhow!("expected a string, got {name}"))
        })
        .collect()
}

/// Implement serde for a type through its `to_json`/`from_json` pair.
macro_rules! json_serde {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.to_json(), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let json = <serde_json::Value as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_json(&json).map_err(<D::Error as serde::de::Error>::custom)
            }
        }
    };
}

pub(crate) use json_serde;
