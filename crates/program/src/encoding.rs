//! Operand encoding.
//!
//! Operands are 32-bit words. Non-negative words are immediates; negative
//! words are handles into a constant pool:
//!
//! ```text
//!  2^31-1 ┐
//!         │ negative small ints   (NEGATIVE_BASE - value)
//! 2^30+4  ┘
//! 2^30+3    UNDEFINED
//! 2^30+2    NULL
//! 2^30+1    TRUE
//! 2^30      FALSE
//!  2^30-1 ┐
//!         │ non-negative small ints
//!       0 ┘
//!      -1 ┐
//!         │ string handles        (-1 - index)
//! -2^30   ┘
//! -2^30-1 ┐
//!         │ number handles        (-(2^30+1) - index)
//! -2^31   ┘
//! ```

use anyhow::{Result, bail};

/// Largest small integer stored inline.
pub const MAX_INT: i32 = 1_073_741_823;
/// Smallest small integer stored inline.
pub const MIN_INT: i32 = -1_073_741_820;
/// Encoded `false`.
pub const FALSE: i32 = 1_073_741_824;
/// Encoded `true`.
pub const TRUE: i32 = 1_073_741_825;
/// Encoded `null`.
pub const NULL: i32 = 1_073_741_826;
/// Encoded `undefined`.
pub const UNDEFINED: i32 = 1_073_741_827;
/// Base negative small ints are subtracted from.
pub const NEGATIVE_BASE: i32 = UNDEFINED;

/// Largest handle of the string range.
pub const STRING_MAX_HANDLE: i32 = -1;
/// Largest handle of the number range.
pub const NUMBER_MAX_HANDLE: i32 = -1_073_741_825;
/// Largest index representable in either handle range.
pub const MAX_HANDLE_INDEX: u32 = 1_073_741_823;

/// A value that fits in an operand word without a constant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Immediate {
    /// A small integer in `MIN_INT..=MAX_INT`.
    Int(i32),
    /// A boolean.
    Bool(bool),
    /// `null`.
    Null,
    /// `undefined`.
    Undefined,
}

/// Encode an immediate.
///
/// # Errors
/// Returns an error if an integer falls outside the small int range.
pub fn encode_immediate(value: Immediate) -> Result<i32> {
    Ok(match value {
        Immediate::Int(number) if !is_small_int(f64::from(number)) => {
            bail!("{number} is outside the immediate range {MIN_INT}..={MAX_INT}")
        }
        Immediate::Int(number) if number < 0 => NEGATIVE_BASE - number,
        Immediate::Int(number) => number,
        Immediate::Bool(false) => FALSE,
        Immediate::Bool(true) => TRUE,
        Immediate::Null => NULL,
        Immediate::Undefined => UNDEFINED,
    })
}

/// Decode a non-negative operand word into its immediate.
pub const fn decode_immediate(encoded: i32) -> Immediate {
    match encoded {
        FALSE => Immediate::Bool(false),
        TRUE => Immediate::Bool(true),
        NULL => Immediate::Null,
        UNDEFINED => Immediate::Undefined,
        word if word > MAX_INT => Immediate::Int(NEGATIVE_BASE - word),
        word => Immediate::Int(word),
    }
}

/// Whether `number` can be stored as an immediate.
#[allow(clippy::float_cmp, reason = "checks that the number is integral")]
pub fn is_small_int(number: f64) -> bool {
    number.trunc() == number && number >= f64::from(MIN_INT) && number <= f64::from(MAX_INT)
}

/// Whether an operand word is a handle rather than an immediate.
#[inline]
pub const fn is_handle(encoded: i32) -> bool {
    encoded < 0
}

/// Encode a constant pool index as a handle below `max_handle`.
///
/// # Errors
/// Returns an error if `index` exceeds `max_index`.
pub fn encode_handle(index: u32, max_index: u32, max_handle: i32) -> Result<i32> {
    if index > max_index {
        bail!("index {index} overflowed range 0 to {max_index}");
    }
    Ok(max_handle - index as i32)
}

/// Decode the pool index of a handle.
#[inline]
pub const fn decode_handle(handle: i32, max_handle: i32) -> u32 {
    (max_handle - handle) as u32
}

/// Whether a handle points into the string range.
#[inline]
pub const fn is_string_handle(handle: i32) -> bool {
    handle < 0 && handle > NUMBER_MAX_HANDLE
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the boundaries of the immediate encoding.
    ///
    /// # Panics
    /// Panics if a boundary value does not round-trip.
    #[test]
    fn immediate_boundaries() -> Result<()> {
        assert_eq!(encode_immediate(Immediate::Int(-1))?, 1_073_741_828);
        assert_eq!(encode_immediate(Immediate::Int(MIN_INT))?, i32::MAX);
        assert_eq!(decode_immediate(i32::MAX), Immediate::Int(MIN_INT));
        assert_eq!(decode_immediate(MAX_INT), Immediate::Int(MAX_INT));
        assert_eq!(decode_immediate(encode_immediate(Immediate::Null)?), Immediate::Null);
        assert!(encode_immediate(Immediate::Int(MIN_INT - 1)).is_err());
        Ok(())
    }

    /// Test handle ranges for strings and numbers.
    ///
    /// # Panics
    /// Panics if the two ranges overlap.
    #[test]
    fn handle_ranges() -> Result<()> {
        let string = encode_handle(MAX_HANDLE_INDEX, MAX_HANDLE_INDEX, STRING_MAX_HANDLE)?;
        let number = encode_handle(0, MAX_HANDLE_INDEX, NUMBER_MAX_HANDLE)?;
        assert_eq!(string, -1_073_741_824);
        assert!(is_string_handle(string));
        assert!(!is_string_handle(number));
        assert_eq!(decode_handle(number, NUMBER_MAX_HANDLE), 0);
        assert_eq!(
            encode_handle(MAX_HANDLE_INDEX, MAX_HANDLE_INDEX, NUMBER_MAX_HANDLE)?,
            i32::MIN
        );
        Ok(())
    }

    /// Test small int detection.
    ///
    /// # Panics
    /// Panics if fractions or out-of-range numbers are accepted.
    #[test]
    fn small_ints() {
        assert!(is_small_int(42.0));
        assert!(!is_small_int(1.5));
        assert!(!is_small_int(f64::NAN));
        assert!(!is_small_int(f64::from(MAX_INT) + 1.0));
    }
}
