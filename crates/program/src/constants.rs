//! The constant pool.
//!
//! Operands too large for an instruction word live here and are referenced
//! by index. Strings are interned; arrays, numbers and template metadata are
//! deduplicated by content; runtime-only values ("others") are stored as-is.

use anyhow::{Context as _, Result, anyhow};
use lasso::{Key as _, Rodeo, Spur};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use core::any::Any;
use std::rc::Rc;

/// The serializable part of a [`Constants`] pool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    /// Interned strings, by index.
    pub strings: Vec<String>,
    /// Index arrays.
    pub arrays: Vec<Vec<i32>>,
    /// Numbers too large or fractional for an immediate.
    pub numbers: Vec<f64>,
}

/// Interning tables for instruction operands.
pub struct Constants {
    strings: Rodeo,
    arrays: Vec<Vec<i32>>,
    numbers: Vec<f64>,
    metas: Vec<serde_json::Value>,
    others: Vec<Rc<dyn Any>>,
}

impl Default for Constants {
    fn default() -> Self {
        Self::new()
    }
}

impl Constants {
    /// An empty pool. String index 0 is always the empty string and array
    /// index 0 the empty array, so a `0` operand reads as "none" for both.
    pub fn new() -> Self {
        let mut strings = Rodeo::new();
        strings.get_or_intern_static("");
        Self {
            strings,
            arrays: vec![Vec::new()],
            numbers: Vec::new(),
            metas: Vec::new(),
            others: Vec::new(),
        }
    }

    /// Intern a string.
    #[inline]
    pub fn string(&mut self, value: &str) -> i32 {
        self.strings.get_or_intern(value).into_usize() as i32
    }

    /// Resolve an interned string.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn get_string(&self, index: i32) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(Spur::try_from_usize)
            .and_then(|key| self.strings.try_resolve(&key))
            .ok_or_else(|| anyhow!("no string constant at {index}"))
    }

    /// Intern an index array.
    pub fn array(&mut self, values: &[i32]) -> i32 {
        if let Some(found) = self.arrays.iter().position(|array| array == values) {
            return found as i32;
        }
        self.arrays.push(values.to_vec());
        (self.arrays.len() - 1) as i32
    }

    /// Resolve an index array.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn get_array(&self, index: i32) -> Result<&[i32]> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.arrays.get(index))
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("no array constant at {index}"))
    }

    /// Intern an array of strings as an array of string indices.
    pub fn string_array<S: AsRef<str>>(&mut self, values: &[S]) -> i32 {
        let indices: Vec<i32> = values.iter().map(|value| self.string(value.as_ref())).collect();
        self.array(&indices)
    }

    /// Resolve an array of strings.
    ///
    /// # Errors
    /// Returns an error if the array or any of its strings is unknown.
    pub fn get_string_array(&self, index: i32) -> Result<Vec<Rc<str>>> {
        self.get_array(index)?
            .iter()
            .map(|string| self.get_string(*string).map(Rc::from))
            .collect()
    }

    /// Intern a number.
    pub fn number(&mut self, value: f64) -> i32 {
        if let Some(found) = self
            .numbers
            .iter()
            .position(|number| number.to_bits() == value.to_bits())
        {
            return found as i32;
        }
        self.numbers.push(value);
        (self.numbers.len() - 1) as i32
    }

    /// Resolve a number.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn get_number(&self, index: i32) -> Result<f64> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.numbers.get(index))
            .copied()
            .ok_or_else(|| anyhow!("no number constant at {index}"))
    }

    /// Store `value` as JSON in the string table.
    ///
    /// # Errors
    /// Returns an error if `value` cannot be serialized.
    pub fn serializable<T: Serialize>(&mut self, value: &T) -> Result<i32> {
        let json = serde_json::to_string(value).context("serializing constant")?;
        Ok(self.string(&json))
    }

    /// Read back a value stored with [`Constants::serializable`].
    ///
    /// # Errors
    /// Returns an error for an unknown index or malformed JSON.
    pub fn get_serializable<T: DeserializeOwned>(&self, index: i32) -> Result<T> {
        let json = self.get_string(index)?;
        serde_json::from_str(json).with_context(|| format!("decoding constant {index}"))
    }

    /// Intern template metadata.
    pub fn template_meta(&mut self, meta: &serde_json::Value) -> i32 {
        if let Some(found) = self.metas.iter().position(|known| known == meta) {
            return found as i32;
        }
        self.metas.push(meta.clone());
        (self.metas.len() - 1) as i32
    }

    /// Resolve template metadata.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn get_template_meta(&self, index: i32) -> Result<&serde_json::Value> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.metas.get(index))
            .ok_or_else(|| anyhow!("no template meta at {index}"))
    }

    /// Store a runtime value.
    pub fn other(&mut self, value: Rc<dyn Any>) -> i32 {
        self.others.push(value);
        (self.others.len() - 1) as i32
    }

    /// Resolve a runtime value of type `T`.
    ///
    /// # Errors
    /// Returns an error for an unknown index or a value of another type.
    pub fn get_other<T: Any>(&self, index: i32) -> Result<Rc<T>> {
        let value = usize::try_from(index)
            .ok()
            .and_then(|index| self.others.get(index))
            .ok_or_else(|| anyhow!("no runtime constant at {index}"))?;
        Rc::clone(value)
            .downcast::<T>()
            .map_err(|_| anyhow!("runtime constant {index} is not a {}", core::any::type_name::<T>()))
    }

    /// Snapshot the serializable tables.
    pub fn to_pool(&self) -> ConstantPool {
        ConstantPool {
            strings: self.strings.strings().map(str::to_owned).collect(),
            arrays: self.arrays.clone(),
            numbers: self.numbers.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test interning and deduplication.
    ///
    /// # Panics
    /// Panics if equal constants get different indices.
    #[test]
    fn dedupes_by_content() -> Result<()> {
        let mut constants = Constants::new();
        assert_eq!(constants.string(""), 0);
        let div = constants.string("div");
        assert_eq!(constants.string("div"), div);
        assert_eq!(constants.get_string(div)?, "div");

        assert_eq!(constants.array(&[]), 0);
        let pair = constants.string_array(&["a", "b"]);
        assert_eq!(constants.string_array(&["a", "b"]), pair);
        let names: Vec<String> = constants
            .get_string_array(pair)?
            .iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);

        let number = constants.number(1.5);
        assert_eq!(constants.number(1.5), number);
        assert!(constants.get_string(99).is_err());
        Ok(())
    }

    /// Test typed access to runtime values.
    ///
    /// # Panics
    /// Panics if a downcast to the wrong type succeeds.
    #[test]
    fn others_are_typed() -> Result<()> {
        let mut constants = Constants::new();
        let index = constants.other(Rc::new(7_u32));
        assert_eq!(*constants.get_other::<u32>(index)?, 7);
        assert!(constants.get_other::<String>(index).is_err());
        Ok(())
    }

    /// Test the serializable snapshot.
    ///
    /// # Panics
    /// Panics if a table is missing from the pool.
    #[test]
    fn snapshots_pool() -> Result<()> {
        let mut constants = Constants::new();
        let table = constants.serializable(&vec!["item"])?;
        let decoded: Vec<String> = constants.get_serializable(table)?;
        assert_eq!(decoded, ["item"]);

        let pool = constants.to_pool();
        assert_eq!(pool.strings, ["", r#"["item"]"#]);
        assert_eq!(pool.arrays, [Vec::<i32>::new()]);
        Ok(())
    }
}
