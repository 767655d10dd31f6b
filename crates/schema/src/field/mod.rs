//! Field descriptors and the closed set of field types.
//!
//! Every field type maps onto exactly one engine wire type:
//!
//! | field type | wire type | default |
//! |------------|-----------|---------|
//! | `int{8,16,32,64}[_rev]` | `u{w}[_rev]`, sign bit flipped | `0` |
//! | `uint{8,16,32,64}[_rev]` | `u{w}[_rev]` | `0` |
//! | `float` | `u64`, IEEE-754 bit pattern | `0.0` |
//! | `bytes`, `string` | `string` | empty |
//! | `uuid` | `string`, 16 bytes | nil |
//! | `ipv4` | `u32` | `0.0.0.0` |
//! | `ipv6` | `string`, 16 octets | `::` |
//! | `enum(..)` | `u64`, member value sign flipped | first member |
//! | `json`, `msgpack`, `pickle` | `string` | `null` |
//!
//! Descending fields use the engine's `_rev` wire types; values themselves are
//! never negated. Float keys sort by raw bit pattern, so negative numbers and
//! NaN do not sort numerically.

mod codec;
mod enumeration;
mod value;

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

pub use enumeration::EnumType;
use quill_store::{FieldSpec, IntWidth, SortOrder, WireShape, WireType};
use uuid::Uuid;
pub use value::Value;

/// The closed set of field types.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Signed integer.
    Int {
        /// Slot width.
        width: IntWidth,
        /// Key order.
        order: SortOrder,
    },
    /// Unsigned integer.
    UInt {
        /// Slot width.
        width: IntWidth,
        /// Key order.
        order: SortOrder,
    },
    /// 64-bit float.
    Float,
    /// Raw bytes.
    Bytes,
    /// UTF-8 text.
    String,
    /// UUID.
    Uuid,
    /// IPv4 address.
    Ipv4,
    /// IPv6 address.
    Ipv6,
    /// Integer-backed enumeration.
    Enum(Arc<EnumType>),
    /// JSON document.
    Json,
    /// MessagePack document.
    MessagePack,
    /// Python pickle payload.
    Pickle,
}

impl FieldType {
    /// Ascending signed integer.
    pub const fn int(width: IntWidth) -> Self {
        Self::Int { width, order: SortOrder::Ascending }
    }

    /// Descending signed integer.
    pub const fn int_rev(width: IntWidth) -> Self {
        Self::Int { width, order: SortOrder::Descending }
    }

    /// Ascending unsigned integer.
    pub const fn uint(width: IntWidth) -> Self {
        Self::UInt { width, order: SortOrder::Ascending }
    }

    /// Descending unsigned integer.
    pub const fn uint_rev(width: IntWidth) -> Self {
        Self::UInt { width, order: SortOrder::Descending }
    }

    /// Enumeration-backed field.
    pub fn enumeration(enum_type: EnumType) -> Self {
        Self::Enum(Arc::new(enum_type))
    }

    /// Engine wire type this field is stored as.
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Int { width, order } | Self::UInt { width, order } => {
                WireType::UInt { width: *width, order: *order }
            },
            Self::Float | Self::Enum(_) => WireType::uint(IntWidth::W64),
            Self::Ipv4 => WireType::uint(IntWidth::W32),
            Self::Bytes
            | Self::String
            | Self::Uuid
            | Self::Ipv6
            | Self::Json
            | Self::MessagePack
            | Self::Pickle => WireType::String,
        }
    }

    /// Wire shape of encoded values.
    pub fn shape(&self) -> WireShape {
        self.wire_type().shape()
    }

    /// Key order of the field.
    pub fn order(&self) -> SortOrder {
        match self {
            Self::Int { order, .. } | Self::UInt { order, .. } => *order,
            _ => SortOrder::Ascending,
        }
    }

    /// Default value of the type.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Int { .. } => Value::Int(0),
            Self::UInt { .. } => Value::UInt(0),
            Self::Float => Value::Float(0.0),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::String => Value::String(String::new()),
            Self::Uuid => Value::Uuid(Uuid::nil()),
            Self::Ipv4 => Value::Ipv4(Ipv4Addr::UNSPECIFIED),
            Self::Ipv6 => Value::Ipv6(Ipv6Addr::UNSPECIFIED),
            Self::Enum(e) => Value::Enum(e.first().to_string()),
            Self::Json | Self::MessagePack | Self::Pickle => Value::Json(serde_json::Value::Null),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rev = |order: &SortOrder| match order {
            SortOrder::Ascending => "",
            SortOrder::Descending => "_rev",
        };
        match self {
            Self::Int { width, order } => write!(f, "int{}{}", width.bits(), rev(order)),
            Self::UInt { width, order } => write!(f, "uint{}{}", width.bits(), rev(order)),
            Self::Float => f.write_str("float"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
            Self::Uuid => f.write_str("uuid"),
            Self::Ipv4 => f.write_str("ipv4"),
            Self::Ipv6 => f.write_str("ipv6"),
            Self::Enum(e) => write!(f, "{e}"),
            Self::Json => f.write_str("json"),
            Self::MessagePack => f.write_str("msgpack"),
            Self::Pickle => f.write_str("pickle"),
        }
    }
}

/// An immutable field descriptor: type, key position, default.
///
/// ```
/// use quill_schema::{Field, IntWidth};
///
/// let name = Field::string().key(0);
/// let age = Field::uint(IntWidth::W8);
/// assert_eq!(name.config_value(), "string,key(0)");
/// assert_eq!(age.config_value(), "u8");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    ty: FieldType,
    key_index: Option<u32>,
    default: Option<Value>,
}

impl Field {
    /// Creates a value field of the given type.
    pub fn new(ty: FieldType) -> Self {
        Self { ty, key_index: None, default: None }
    }

    /// Signed integer field.
    pub fn int(width: IntWidth) -> Self {
        Self::new(FieldType::int(width))
    }

    /// Descending signed integer field.
    pub fn int_rev(width: IntWidth) -> Self {
        Self::new(FieldType::int_rev(width))
    }

    /// Unsigned integer field.
    pub fn uint(width: IntWidth) -> Self {
        Self::new(FieldType::uint(width))
    }

    /// Descending unsigned integer field.
    pub fn uint_rev(width: IntWidth) -> Self {
        Self::new(FieldType::uint_rev(width))
    }

    /// Float field.
    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    /// Bytes field.
    pub fn bytes() -> Self {
        Self::new(FieldType::Bytes)
    }

    /// String field.
    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    /// UUID field.
    pub fn uuid() -> Self {
        Self::new(FieldType::Uuid)
    }

    /// IPv4 address field.
    pub fn ipv4() -> Self {
        Self::new(FieldType::Ipv4)
    }

    /// IPv6 address field.
    pub fn ipv6() -> Self {
        Self::new(FieldType::Ipv6)
    }

    /// Enumeration field.
    pub fn enumeration(enum_type: EnumType) -> Self {
        Self::new(FieldType::enumeration(enum_type))
    }

    /// JSON field.
    pub fn json() -> Self {
        Self::new(FieldType::Json)
    }

    /// MessagePack field.
    pub fn msgpack() -> Self {
        Self::new(FieldType::MessagePack)
    }

    /// Pickle field.
    pub fn pickle() -> Self {
        Self::new(FieldType::Pickle)
    }

    /// Makes this the `index`-th component of the composite key.
    #[must_use]
    pub fn key(mut self, index: u32) -> Self {
        self.key_index = Some(index);
        self
    }

    /// Overrides the type's default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Field type.
    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    /// Key position, `None` for value fields.
    pub fn key_index(&self) -> Option<u32> {
        self.key_index
    }

    /// Returns true for key fields.
    pub fn is_key(&self) -> bool {
        self.key_index.is_some()
    }

    /// Default value: the explicit override, or the type's default.
    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.ty.default_value())
    }

    /// Engine field spec: wire type plus key position.
    pub fn spec(&self) -> FieldSpec {
        FieldSpec { wire_type: self.ty.wire_type(), key_index: self.key_index }
    }

    /// Engine configuration value, e.g. `u32_rev,key(1)`.
    pub fn config_value(&self) -> String {
        self.spec().to_string()
    }
}
