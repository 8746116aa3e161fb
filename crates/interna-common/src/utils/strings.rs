//! Case-folded string comparison.
//!
//! Folding lowercases each character (including multi-character expansions
//! from [`char::to_lowercase`]). Strings that fold to the same sequence form
//! one group; [`cmp_folded_then_raw`] keeps each group contiguous and orders
//! its members by raw bytes.

use std::cmp::Ordering;

/// Compares two strings by their folded form only.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use interna_common::utils::strings::cmp_folded;
///
/// assert_eq!(cmp_folded("Two", "tWO"), Ordering::Equal);
/// assert_eq!(cmp_folded("apple", "Banana"), Ordering::Less);
/// ```
#[must_use]
pub fn cmp_folded(a: &str, b: &str) -> Ordering {
    if a.is_ascii() && b.is_ascii() {
        return a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()));
    }
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Compares by folded form, breaking ties on raw byte order.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use interna_common::utils::strings::cmp_folded_then_raw;
///
/// assert_eq!(cmp_folded_then_raw("TWO", "Two"), Ordering::Less);
/// assert_eq!(cmp_folded_then_raw("Two", "two"), Ordering::Less);
/// assert_eq!(cmp_folded_then_raw("two", "three"), Ordering::Greater);
/// ```
#[must_use]
pub fn cmp_folded_then_raw(a: &str, b: &str) -> Ordering {
    cmp_folded(a, b).then_with(|| a.cmp(b))
}
