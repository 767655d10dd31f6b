//! Wire types understood by the engine and the order-preserving key encoding.
//!
//! Every record field is stored in one of two shapes:
//! - `string`: arbitrary bytes
//! - `u8` / `u16` / `u32` / `u64`: unsigned integers, optionally in descending order (`_rev`)
//!
//! Key fields are concatenated into a single byte string whose lexicographic
//! order matches the declared order of every component, so the record map can
//! be a plain ordered byte map.

use std::{fmt, str::FromStr};

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The two native storage primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireShape {
    /// Variable-length byte string.
    Bytes,
    /// Unsigned 64-bit slot.
    U64,
}

impl fmt::Display for WireShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => f.write_str("bytes"),
            Self::U64 => f.write_str("u64"),
        }
    }
}

/// Width of an integer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntWidth {
    /// 8 bits.
    W8,
    /// 16 bits.
    W16,
    /// 32 bits.
    W32,
    /// 64 bits.
    W64,
}

impl IntWidth {
    /// All widths, narrowest first.
    pub const ALL: [IntWidth; 4] = [Self::W8, Self::W16, Self::W32, Self::W64];

    /// Number of bits in the slot.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }

    /// Largest unsigned value the slot can hold.
    #[inline]
    pub const fn max_unsigned(self) -> u64 {
        match self {
            Self::W64 => u64::MAX,
            _ => (1u64 << self.bits()) - 1,
        }
    }
}

/// Sort direction of an integer key component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Smaller values first.
    #[default]
    Ascending,
    /// Larger values first.
    Descending,
}

/// Storage type of a single record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    /// Byte string, ordered lexicographically.
    String,
    /// Unsigned integer of the given width and order.
    UInt {
        /// Slot width.
        width: IntWidth,
        /// Comparison direction.
        order: SortOrder,
    },
}

impl WireType {
    /// Shorthand for an ascending unsigned slot.
    pub const fn uint(width: IntWidth) -> Self {
        Self::UInt { width, order: SortOrder::Ascending }
    }

    /// Shorthand for a descending unsigned slot.
    pub const fn uint_rev(width: IntWidth) -> Self {
        Self::UInt { width, order: SortOrder::Descending }
    }

    /// Returns the wire shape for this type.
    #[inline]
    pub const fn shape(self) -> WireShape {
        match self {
            Self::String => WireShape::Bytes,
            Self::UInt { .. } => WireShape::U64,
        }
    }

    /// Returns the canonical configuration name (`string`, `u32`, `u64_rev`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::UInt { width, order: SortOrder::Ascending } => match width {
                IntWidth::W8 => "u8",
                IntWidth::W16 => "u16",
                IntWidth::W32 => "u32",
                IntWidth::W64 => "u64",
            },
            Self::UInt { width, order: SortOrder::Descending } => match width {
                IntWidth::W8 => "u8_rev",
                IntWidth::W16 => "u16_rev",
                IntWidth::W32 => "u32_rev",
                IntWidth::W64 => "u64_rev",
            },
        }
    }

    /// Checks that `value` has this type's shape and fits its width.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] or [`Error::OutOfRange`].
    pub fn check(self, field: &str, value: &WireValue) -> Result<()> {
        match (self, value) {
            (Self::String, WireValue::Bytes(_)) => Ok(()),
            (Self::UInt { width, .. }, WireValue::U64(v)) => {
                if *v > width.max_unsigned() {
                    return Err(Error::OutOfRange {
                        field: field.to_string(),
                        value: *v,
                        max: width.max_unsigned(),
                    });
                }
                Ok(())
            },
            _ => Err(Error::ShapeMismatch {
                field: field.to_string(),
                expected: self.shape(),
                found: value.shape(),
            }),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (base, order) = match s.strip_suffix("_rev") {
            Some(base) => (base, SortOrder::Descending),
            None => (s, SortOrder::Ascending),
        };
        let width = match base {
            "string" if order == SortOrder::Ascending => return Ok(Self::String),
            "u8" => IntWidth::W8,
            "u16" => IntWidth::W16,
            "u32" => IntWidth::W32,
            "u64" => IntWidth::W64,
            _ => {
                return Err(Error::InvalidConfig {
                    key: s.to_string(),
                    reason: "unknown field type".to_string(),
                });
            },
        };
        Ok(Self::UInt { width, order })
    }
}

/// A field value as stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireValue {
    /// Byte string.
    Bytes(Vec<u8>),
    /// Unsigned 64-bit integer.
    U64(u64),
}

impl WireValue {
    /// Returns the shape of this value.
    #[inline]
    pub fn shape(&self) -> WireShape {
        match self {
            Self::Bytes(_) => WireShape::Bytes,
            Self::U64(_) => WireShape::U64,
        }
    }
}

/// A parsed field declaration: `<type>[,key(<index>)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Storage type of the field.
    pub wire_type: WireType,
    /// Position in the composite key, if the field is a key component.
    pub key_index: Option<u32>,
}

impl FieldSpec {
    /// Parses a field declaration such as `u32_rev,key(1)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the type or key marker is malformed.
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidConfig {
            key: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = spec.split(',').map(str::trim);
        let wire_type = parts.next().unwrap_or_default().parse()?;
        let key_index = match parts.next() {
            None => None,
            Some(marker) => {
                let index = marker
                    .strip_prefix("key(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| invalid("expected key(<index>)"))?;
                Some(index.parse().map_err(|_| invalid("key index is not an integer"))?)
            },
        };
        if parts.next().is_some() {
            return Err(invalid("trailing field options"));
        }

        Ok(Self { wire_type, key_index })
    }
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self { wire_type: WireType::String, key_index: None }
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_index {
            Some(index) => write!(f, "{},key({index})", self.wire_type),
            None => write!(f, "{}", self.wire_type),
        }
    }
}

// ============================================================================
// Key Encoding
// ============================================================================

fn push_u64(buf: &mut Vec<u8>, value: u64) {
    let mut bytes = [0u8; 8];
    BigEndian::write_u64(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

/// Appends one key component to `buf`.
///
/// - Integers: 8 bytes big-endian; descending components are bitwise inverted.
/// - Strings: `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x00`, so that a string sorts
///   before every string it prefixes and components stay self-delimiting.
///
/// The value must already have been checked against `wire_type`.
pub(crate) fn encode_key_component(wire_type: WireType, value: &WireValue, buf: &mut Vec<u8>) {
    match (wire_type, value) {
        (WireType::UInt { order, .. }, WireValue::U64(v)) => {
            let v = match order {
                SortOrder::Ascending => *v,
                SortOrder::Descending => !*v,
            };
            push_u64(buf, v);
        },
        (_, WireValue::Bytes(bytes)) => {
            for &b in bytes {
                buf.push(b);
                if b == 0x00 {
                    buf.push(0xFF);
                }
            }
            buf.extend_from_slice(&[0x00, 0x00]);
        },
        (WireType::String, WireValue::U64(v)) => {
            push_u64(buf, *v);
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn key_of(wire_type: WireType, value: WireValue) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_key_component(wire_type, &value, &mut buf);
        buf
    }

    #[test]
    fn test_wire_type_names_roundtrip() {
        for width in IntWidth::ALL {
            for wire_type in [WireType::uint(width), WireType::uint_rev(width)] {
                assert_eq!(wire_type.name().parse::<WireType>().unwrap(), wire_type);
            }
        }
        assert_eq!("string".parse::<WireType>().unwrap(), WireType::String);
        assert!("string_rev".parse::<WireType>().is_err());
        assert!("i32".parse::<WireType>().is_err());
    }

    #[test]
    fn test_field_spec_parse() {
        let spec = FieldSpec::parse("u32_rev,key(1)").unwrap();
        assert_eq!(spec.wire_type, WireType::uint_rev(IntWidth::W32));
        assert_eq!(spec.key_index, Some(1));
        assert_eq!(spec.to_string(), "u32_rev,key(1)");

        let spec = FieldSpec::parse("string").unwrap();
        assert_eq!(spec, FieldSpec::default());

        assert!(FieldSpec::parse("u8,key(x)").is_err());
        assert!(FieldSpec::parse("u8,index(0)").is_err());
        assert!(FieldSpec::parse("u8,key(0),extra").is_err());
    }

    #[test]
    fn test_range_check() {
        let u8_type = WireType::uint(IntWidth::W8);
        assert!(u8_type.check("f", &WireValue::U64(255)).is_ok());
        assert!(matches!(u8_type.check("f", &WireValue::U64(256)), Err(Error::OutOfRange { .. })));
        assert!(matches!(
            u8_type.check("f", &WireValue::Bytes(vec![])),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_uint_key_ordering() {
        let asc = WireType::uint(IntWidth::W64);
        let desc = WireType::uint_rev(IntWidth::W64);
        let values = [0u64, 1, 255, 256, u64::MAX];

        let asc_keys: Vec<_> = values.iter().map(|v| key_of(asc, WireValue::U64(*v))).collect();
        let mut sorted = asc_keys.clone();
        sorted.sort();
        assert_eq!(asc_keys, sorted);

        let desc_keys: Vec<_> = values.iter().map(|v| key_of(desc, WireValue::U64(*v))).collect();
        let mut sorted = desc_keys.clone();
        sorted.sort();
        sorted.reverse();
        assert_eq!(desc_keys, sorted);
    }

    #[test]
    fn test_uint_key_component_bytes() {
        let asc = WireType::uint(IntWidth::W16);
        let desc = WireType::uint_rev(IntWidth::W16);
        assert_eq!(key_of(asc, WireValue::U64(0x0102)), vec![0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(
            key_of(desc, WireValue::U64(0x0102)),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFD]
        );
    }

    #[test]
    fn test_string_key_prefix_and_nul_ordering() {
        let a = key_of(WireType::String, WireValue::Bytes(b"ab".to_vec()));
        let b = key_of(WireType::String, WireValue::Bytes(b"abc".to_vec()));
        let c = key_of(WireType::String, WireValue::Bytes(b"ab\x00".to_vec()));
        let d = key_of(WireType::String, WireValue::Bytes(b"b".to_vec()));
        assert!(a < c);
        assert!(c < b);
        assert!(b < d);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        fn composite(name: &[u8], score: u64) -> Vec<u8> {
            let mut buf = Vec::new();
            encode_key_component(WireType::String, &WireValue::Bytes(name.to_vec()), &mut buf);
            encode_key_component(
                WireType::uint_rev(IntWidth::W64),
                &WireValue::U64(score),
                &mut buf,
            );
            buf
        }

        proptest! {
            /// Composite key order matches (name ascending, score descending).
            #[test]
            fn prop_composite_key_order(
                a in (proptest::collection::vec(any::<u8>(), 0..6), any::<u64>()),
                b in (proptest::collection::vec(any::<u8>(), 0..6), any::<u64>()),
            ) {
                let expected = a.0.cmp(&b.0).then(b.1.cmp(&a.1));
                prop_assert_eq!(composite(&a.0, a.1).cmp(&composite(&b.0, b.1)), expected);
            }
        }
    }
}
