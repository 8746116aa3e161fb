//! Value types the enum store can hold.

use std::cmp::Ordering;
use std::fmt::Debug;

use interna_common::utils::error::LoadError;
use interna_common::utils::hash::fx_hash;
use interna_common::utils::strings::{cmp_folded, cmp_folded_then_raw};

/// A value that can be stored, deduplicated and ordered by an enum store.
///
/// `compare` defines the dictionary order and must be a total order whose
/// equality agrees with `content_eq` and `content_hash`. `compare_folded` is
/// a coarser order used for folded lookups: whenever two values are
/// folded-equal, every value between them under `compare` is folded-equal
/// too.
///
/// The raw format is what the enumerated loaders decode: little-endian
/// fixed width for numbers and NUL-terminated UTF-8 for strings.
pub trait EnumValue: Clone + Debug + Send + Sync + 'static {
    /// Name used in diagnostics.
    const TYPE_NAME: &'static str;

    /// Total order used by the dictionary.
    fn compare(&self, other: &Self) -> Ordering;

    /// Order used by folded lookups. Defaults to [`compare`](Self::compare).
    fn compare_folded(&self, other: &Self) -> Ordering {
        self.compare(other)
    }

    /// Content equality, consistent with [`compare`](Self::compare).
    fn content_eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// 64-bit content hash, consistent with [`content_eq`](Self::content_eq).
    fn content_hash(&self) -> u64;

    /// Decodes one value starting at `raw[offset..]`.
    ///
    /// Returns the value and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] naming `offset` if the bytes do not hold a
    /// complete, well-formed value.
    fn decode_raw(raw: &[u8], offset: usize) -> Result<(Self, usize), LoadError>;

    /// Appends the raw encoding of this value.
    fn encode_raw(&self, out: &mut Vec<u8>);
}

fn fixed_width<const N: usize>(
    raw: &[u8],
    offset: usize,
    type_name: &'static str,
) -> Result<[u8; N], LoadError> {
    raw.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(LoadError::Truncated { type_name, offset })
}

macro_rules! impl_integer_value {
    ($($ty:ty),*) => {
        $(
            impl EnumValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }

                #[inline]
                fn content_eq(&self, other: &Self) -> bool {
                    self == other
                }

                #[inline]
                fn content_hash(&self) -> u64 {
                    fx_hash(self)
                }

                fn decode_raw(raw: &[u8], offset: usize) -> Result<(Self, usize), LoadError> {
                    let bytes = fixed_width::<{ size_of::<$ty>() }>(raw, offset, Self::TYPE_NAME)?;
                    Ok((<$ty>::from_le_bytes(bytes), size_of::<$ty>()))
                }

                fn encode_raw(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_integer_value!(i8, i16, i32, i64);

// Floats order by `total_cmp`, so equality is bit-pattern equality: a NaN
// payload is found again by the same payload, and -0.0 and 0.0 are distinct.
macro_rules! impl_float_value {
    ($($ty:ty),*) => {
        $(
            impl EnumValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    self.total_cmp(other)
                }

                #[inline]
                fn content_eq(&self, other: &Self) -> bool {
                    self.to_bits() == other.to_bits()
                }

                #[inline]
                fn content_hash(&self) -> u64 {
                    fx_hash(&self.to_bits())
                }

                fn decode_raw(raw: &[u8], offset: usize) -> Result<(Self, usize), LoadError> {
                    let bytes = fixed_width::<{ size_of::<$ty>() }>(raw, offset, Self::TYPE_NAME)?;
                    Ok((<$ty>::from_le_bytes(bytes), size_of::<$ty>()))
                }

                fn encode_raw(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_float_value!(f32, f64);

/// Strings order case-folded first and by raw bytes within a folded group,
/// so `"TWO" < "Two" < "two"` and the group sits between `"three"` and
/// anything after `"two"`.
impl EnumValue for String {
    const TYPE_NAME: &'static str = "string";

    fn compare(&self, other: &Self) -> Ordering {
        cmp_folded_then_raw(self, other)
    }

    fn compare_folded(&self, other: &Self) -> Ordering {
        cmp_folded(self, other)
    }

    fn content_eq(&self, other: &Self) -> bool {
        self == other
    }

    fn content_hash(&self) -> u64 {
        fx_hash(self.as_bytes())
    }

    fn decode_raw(raw: &[u8], offset: usize) -> Result<(Self, usize), LoadError> {
        let rest = raw.get(offset..).unwrap_or_default();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(LoadError::Truncated {
                type_name: Self::TYPE_NAME,
                offset,
            })?;
        let value = std::str::from_utf8(&rest[..end])
            .map_err(|_| LoadError::InvalidUtf8 { offset })?;
        Ok((value.to_owned(), end + 1))
    }

    fn encode_raw(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
        out.push(0);
    }
}

/// Encodes values back to back in the raw loader format.
#[must_use]
pub fn encode_values<T: EnumValue>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        value.encode_raw(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_is_bitwise() {
        let nan = f32::NAN;
        assert!(nan.content_eq(&nan));
        assert_eq!(nan.compare(&nan), Ordering::Equal);
        assert_eq!(nan.content_hash(), f32::NAN.content_hash());

        let other_nan = f64::from_bits(f64::NAN.to_bits() ^ 1);
        assert!(!f64::NAN.content_eq(&other_nan));
        assert!(!0.0_f64.content_eq(&-0.0));
        assert_eq!((-0.0_f64).compare(&0.0), Ordering::Less);
    }

    #[test]
    fn test_string_order() {
        let two = "two".to_string();
        let upper = "TWO".to_string();
        let three = "three".to_string();
        assert_eq!(upper.compare(&two), Ordering::Less);
        assert_eq!(upper.compare_folded(&two), Ordering::Equal);
        assert_eq!(three.compare(&upper), Ordering::Less);
        assert!(!upper.content_eq(&two));
    }

    #[test]
    fn test_decode_numbers() {
        let raw = encode_values(&[3_i32, -5, 7]);
        assert_eq!(raw.len(), 12);
        assert_eq!(i32::decode_raw(&raw, 4), Ok((-5, 4)));
        assert_eq!(
            i32::decode_raw(&raw, 10),
            Err(LoadError::Truncated {
                type_name: "i32",
                offset: 10
            })
        );

        let raw = encode_values(&[9.5_f64]);
        assert_eq!(f64::decode_raw(&raw, 0), Ok((9.5, 8)));
    }

    #[test]
    fn test_decode_strings() {
        let raw = encode_values(&["aa".to_string(), String::new(), "ccc".to_string()]);
        assert_eq!(raw, b"aa\0\0ccc\0");
        assert_eq!(String::decode_raw(&raw, 0), Ok(("aa".to_string(), 3)));
        assert_eq!(String::decode_raw(&raw, 3), Ok((String::new(), 1)));
        assert_eq!(String::decode_raw(&raw, 4), Ok(("ccc".to_string(), 4)));

        assert!(matches!(
            String::decode_raw(b"abc", 0),
            Err(LoadError::Truncated { offset: 0, .. })
        ));
        assert_eq!(
            String::decode_raw(b"\xff\0", 0),
            Err(LoadError::InvalidUtf8 { offset: 0 })
        );
        assert!(String::decode_raw(b"a\0", 9).is_err());
    }
}
