//! Positional rendering of pattern indices.
//!
//! Local pattern indices are base-3 numbers whose digits are cell states.
//! Rendering one as a digit string makes exported coefficients readable:
//! `"2101"` is a four-cell pattern whose most significant cell holds an
//! opponent disc.

use arrayvec::ArrayVec;

/// Enough digits for any `u64` in base 2.
const MAX_DIGITS: usize = u64::BITS as usize;

/// Renders `value` in `base`, most significant digit first.
///
/// Zero renders as `"0"`. No padding is applied, so the string length is
/// the number of significant digits.
///
/// # Panics
///
/// Panics if `base` is not in `2..=36`.
///
/// # Examples
///
/// ```
/// use ntuple_pattern::radix::to_radix_string;
///
/// assert_eq!(to_radix_string(0, 3), "0");
/// assert_eq!(to_radix_string(4, 3), "11");
/// assert_eq!(to_radix_string(80, 3), "2222");
/// ```
#[must_use]
pub fn to_radix_string(value: u64, base: u32) -> String {
    assert!((2..=36).contains(&base), "base must be in 2..=36");

    let base = u64::from(base);
    let mut digits = ArrayVec::<char, MAX_DIGITS>::new();
    let mut rest = value;
    loop {
        #[expect(clippy::cast_possible_truncation)]
        let digit = (rest % base) as u32;
        digits.push(char::from_digit(digit, 36).expect("digit should be below base"));
        rest /= base;
        if rest == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Parses a digit string produced by [`to_radix_string`].
///
/// Returns `None` for empty strings, foreign digits, or overflow.
#[must_use]
pub fn parse_radix(digits: &str, base: u32) -> Option<u64> {
    if !(2..=36).contains(&base) {
        return None;
    }
    u64::from_str_radix(digits, base).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_renders_as_single_digit() {
        assert_eq!(to_radix_string(0, 3), "0");
        assert_eq!(to_radix_string(0, 10), "0");
    }

    #[test]
    fn test_ternary_digits_are_most_significant_first() {
        assert_eq!(to_radix_string(1, 3), "1");
        assert_eq!(to_radix_string(3, 3), "10");
        assert_eq!(to_radix_string(7, 3), "21");
        assert_eq!(to_radix_string(59_048, 3), "2222222222");
    }

    #[test]
    fn test_parse_recovers_value() {
        for value in (0..2000).chain([167_264, u64::from(u32::MAX), u64::MAX]) {
            let digits = to_radix_string(value, 3);
            assert_eq!(parse_radix(&digits, 3), Some(value), "value {value}");
        }
    }

    #[test]
    fn test_other_bases() {
        assert_eq!(to_radix_string(u64::MAX, 2).len(), 64);
        assert_eq!(to_radix_string(255, 16), "ff");
        assert_eq!(to_radix_string(1234, 10), "1234");
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert_eq!(parse_radix("", 3), None);
        assert_eq!(parse_radix("13", 3), None);
        assert_eq!(parse_radix("10", 1), None);
    }

    #[test]
    #[should_panic(expected = "base must be in 2..=36")]
    fn test_rejects_unit_base() {
        let _ = to_radix_string(5, 1);
    }
}
