//! Proptest strategies for schema layer types.
//!
//! Strategies produce field types and values that the codec accepts, so
//! properties can focus on ordering and round-trip behavior.
//!
//! # Usage
//!
//! ```no_run
//! use quill_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn encodes(
//!         (ty, value) in strategies::arb_field_type()
//!             .prop_flat_map(|ty| (Just(ty.clone()), strategies::arb_value_for(&ty)))
//!     ) {
//!         prop_assert!(ty.encode(&value).is_ok());
//!     }
//! }
//! ```

use std::net::{Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;
use quill_schema::{EnumType, FieldType, IntWidth, Value};
use uuid::Uuid;

/// Generates a field or database name matching `[a-z][a-z0-9_]{0,15}`.
pub fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Generates one of the four integer widths.
pub fn arb_width() -> impl Strategy<Value = IntWidth> {
    prop::sample::select(IntWidth::ALL.to_vec())
}

/// The enumeration used by [`arb_field_type`]: `Level { low = -1, mid = 0, high = 7 }`.
#[allow(clippy::expect_used)]
pub fn level_enum() -> EnumType {
    EnumType::new("Level", [("low", -1), ("mid", 0), ("high", 7)]).expect("fixed members are valid")
}

/// Generates any field type, with integers in both orders and every width.
pub fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        arb_width().prop_map(FieldType::int),
        arb_width().prop_map(FieldType::int_rev),
        arb_width().prop_map(FieldType::uint),
        arb_width().prop_map(FieldType::uint_rev),
        Just(FieldType::Float),
        Just(FieldType::Bytes),
        Just(FieldType::String),
        Just(FieldType::Uuid),
        Just(FieldType::Ipv4),
        Just(FieldType::Ipv6),
        Just(FieldType::enumeration(level_enum())),
        Just(FieldType::Json),
        Just(FieldType::MessagePack),
        Just(FieldType::Pickle),
    ]
}

/// Generates an integer field type only, for ordering properties.
pub fn arb_integer_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        arb_width().prop_map(FieldType::int),
        arb_width().prop_map(FieldType::int_rev),
        arb_width().prop_map(FieldType::uint),
        arb_width().prop_map(FieldType::uint_rev),
    ]
}

fn signed_bounds(width: IntWidth) -> (i64, i64) {
    match width {
        IntWidth::W8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
        IntWidth::W16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
        IntWidth::W32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
        IntWidth::W64 => (i64::MIN, i64::MAX),
    }
}

fn unsigned_max(width: IntWidth) -> u64 {
    match width {
        IntWidth::W8 => u64::from(u8::MAX),
        IntWidth::W16 => u64::from(u16::MAX),
        IntWidth::W32 => u64::from(u32::MAX),
        IntWidth::W64 => u64::MAX,
    }
}

/// Small JSON documents: objects of strings and integers.
pub fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z ]{0,12}".prop_map(serde_json::Value::from),
        any::<bool>().prop_map(serde_json::Value::from),
    ];
    prop::collection::btree_map("[a-z]{1,6}", leaf, 0..5)
        .prop_map(|map| serde_json::Value::Object(map.into_iter().collect()))
}

/// Generates a value that `ty` can encode, as the codec decodes it back.
///
/// Floats exclude NaN so decoded values compare equal.
pub fn arb_value_for(ty: &FieldType) -> BoxedStrategy<Value> {
    match ty {
        FieldType::Int { width, .. } => {
            let (min, max) = signed_bounds(*width);
            (min..=max).prop_map(Value::Int).boxed()
        },
        FieldType::UInt { width, .. } => (0..=unsigned_max(*width)).prop_map(Value::UInt).boxed(),
        FieldType::Float => any::<f64>().prop_filter("NaN", |f| !f.is_nan()).prop_map(Value::Float).boxed(),
        FieldType::Bytes => prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes).boxed(),
        FieldType::String => "\\PC{0,24}".prop_map(Value::String).boxed(),
        FieldType::Uuid => any::<u128>().prop_map(|v| Value::Uuid(Uuid::from_u128(v))).boxed(),
        FieldType::Ipv4 => any::<u32>().prop_map(|v| Value::Ipv4(Ipv4Addr::from(v))).boxed(),
        FieldType::Ipv6 => any::<u128>().prop_map(|v| Value::Ipv6(Ipv6Addr::from(v))).boxed(),
        FieldType::Enum(enum_type) => {
            let members: Vec<String> = enum_type.members().map(|(m, _)| m.to_string()).collect();
            prop::sample::select(members).prop_map(Value::Enum).boxed()
        },
        FieldType::Json | FieldType::MessagePack | FieldType::Pickle => {
            arb_json().prop_map(Value::Json).boxed()
        },
    }
}
