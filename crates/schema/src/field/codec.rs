//! Encoding between [`Value`]s and engine [`WireValue`]s.
//!
//! Signed integers flip the sign bit inside their width so that the engine's
//! unsigned ordering matches numeric ordering: for `int8`, `-128` becomes
//! `0x00`, `-1` becomes `0x7F`, `0` becomes `0x80` and `127` becomes `0xFF`.
//! Enumerations use the same mapping over 64 bits.

use std::net::{Ipv4Addr, Ipv6Addr};

use quill_store::{IntWidth, WireValue};
use uuid::Uuid;

use super::{FieldType, Value};
use crate::error::CodecError;

fn sign_bit(width: IntWidth) -> u64 {
    1u64 << (width.bits() - 1)
}

fn signed_range(width: IntWidth) -> (i64, i64) {
    match width {
        IntWidth::W64 => (i64::MIN, i64::MAX),
        _ => {
            let half = 1i64 << (width.bits() - 1);
            (-half, half - 1)
        },
    }
}

/// Maps a signed value onto the unsigned slot, preserving order.
fn flip_sign(width: IntWidth, value: i64) -> u64 {
    ((value as u64) & width.max_unsigned()) ^ sign_bit(width)
}

/// Inverse of [`flip_sign`] for slot values that fit the width.
fn unflip_sign(width: IntWidth, slot: u64) -> i64 {
    let shift = 64 - width.bits();
    (((slot ^ sign_bit(width)) << shift) as i64) >> shift
}

impl FieldType {
    /// Encodes an application value into its wire value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] for a value of the wrong kind,
    /// [`CodecError::ValueOutOfRange`] for integers that do not fit,
    /// [`CodecError::InvalidEnumValue`] for non-members, and
    /// [`CodecError::Encode`] if an opaque payload cannot be serialized.
    pub fn encode(&self, value: &Value) -> Result<WireValue, CodecError> {
        let mismatch = || CodecError::TypeMismatch { field_type: self.to_string(), found: value.kind() };
        let out_of_range =
            || CodecError::ValueOutOfRange { value: value.to_string(), field_type: self.to_string() };

        match self {
            Self::Int { width, .. } => {
                let v = match value {
                    Value::Int(v) => *v,
                    Value::UInt(u) => i64::try_from(*u).map_err(|_| out_of_range())?,
                    _ => return Err(mismatch()),
                };
                let (min, max) = signed_range(*width);
                if v < min || v > max {
                    return Err(out_of_range());
                }
                Ok(WireValue::U64(flip_sign(*width, v)))
            },
            Self::UInt { width, .. } => {
                let v = match value {
                    Value::UInt(u) => *u,
                    Value::Int(v) => u64::try_from(*v).map_err(|_| out_of_range())?,
                    _ => return Err(mismatch()),
                };
                if v > width.max_unsigned() {
                    return Err(out_of_range());
                }
                Ok(WireValue::U64(v))
            },
            Self::Float => match value {
                Value::Float(f) => Ok(WireValue::U64(f.to_bits())),
                _ => Err(mismatch()),
            },
            Self::Bytes => match value {
                Value::Bytes(b) => Ok(WireValue::Bytes(b.clone())),
                _ => Err(mismatch()),
            },
            Self::String => match value {
                Value::String(s) => Ok(WireValue::Bytes(s.as_bytes().to_vec())),
                _ => Err(mismatch()),
            },
            Self::Uuid => match value {
                Value::Uuid(u) => Ok(WireValue::Bytes(u.as_bytes().to_vec())),
                _ => Err(mismatch()),
            },
            Self::Ipv4 => match value {
                Value::Ipv4(addr) => Ok(WireValue::U64(u64::from(u32::from(*addr)))),
                _ => Err(mismatch()),
            },
            Self::Ipv6 => match value {
                Value::Ipv6(addr) => Ok(WireValue::Bytes(addr.octets().to_vec())),
                _ => Err(mismatch()),
            },
            Self::Enum(enum_type) => {
                let member_value = match value {
                    Value::Enum(member) => enum_type.value_of(member),
                    Value::Int(v) => enum_type.member_of(*v).map(|_| *v),
                    _ => return Err(mismatch()),
                };
                let member_value = member_value.ok_or_else(|| CodecError::InvalidEnumValue {
                    enumeration: enum_type.name().to_string(),
                    value: value.to_string(),
                })?;
                Ok(WireValue::U64(flip_sign(IntWidth::W64, member_value)))
            },
            Self::Json => match value {
                Value::Json(doc) => serde_json::to_vec(doc)
                    .map(WireValue::Bytes)
                    .map_err(|e| CodecError::Encode { reason: e.to_string() }),
                _ => Err(mismatch()),
            },
            Self::MessagePack => match value {
                Value::Json(doc) => rmp_serde::to_vec(doc)
                    .map(WireValue::Bytes)
                    .map_err(|e| CodecError::Encode { reason: e.to_string() }),
                _ => Err(mismatch()),
            },
            Self::Pickle => match value {
                Value::Json(doc) => serde_pickle::to_vec(doc, serde_pickle::SerOptions::new())
                    .map(WireValue::Bytes)
                    .map_err(|e| CodecError::Encode { reason: e.to_string() }),
                _ => Err(mismatch()),
            },
        }
    }

    /// Decodes a wire value back into an application value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ShapeMismatch`] if the wire value has the wrong
    /// shape, [`CodecError::Decode`] for malformed payloads, and
    /// [`CodecError::InvalidEnumValue`] for integers without a member.
    pub fn decode(&self, wire: &WireValue) -> Result<Value, CodecError> {
        let expected = self.shape();
        if wire.shape() != expected {
            return Err(CodecError::ShapeMismatch { expected, found: wire.shape() });
        }
        let malformed = |reason: String| CodecError::Decode { reason: format!("{self}: {reason}") };

        match (self, wire) {
            (Self::Int { width, .. }, WireValue::U64(slot)) => {
                if *slot > width.max_unsigned() {
                    return Err(malformed(format!("slot value {slot} exceeds width")));
                }
                Ok(Value::Int(unflip_sign(*width, *slot)))
            },
            (Self::UInt { width, .. }, WireValue::U64(v)) => {
                if *v > width.max_unsigned() {
                    return Err(malformed(format!("slot value {v} exceeds width")));
                }
                Ok(Value::UInt(*v))
            },
            (Self::Float, WireValue::U64(bits)) => Ok(Value::Float(f64::from_bits(*bits))),
            (Self::Bytes, WireValue::Bytes(b)) => Ok(Value::Bytes(b.clone())),
            (Self::String, WireValue::Bytes(b)) => String::from_utf8(b.clone())
                .map(Value::String)
                .map_err(|e| malformed(e.to_string())),
            (Self::Uuid, WireValue::Bytes(b)) => {
                Uuid::from_slice(b).map(Value::Uuid).map_err(|e| malformed(e.to_string()))
            },
            (Self::Ipv4, WireValue::U64(v)) => u32::try_from(*v)
                .map(|bits| Value::Ipv4(Ipv4Addr::from(bits)))
                .map_err(|_| malformed(format!("{v} is not an IPv4 address"))),
            (Self::Ipv6, WireValue::Bytes(b)) => <[u8; 16]>::try_from(b.as_slice())
                .map(|octets| Value::Ipv6(Ipv6Addr::from(octets)))
                .map_err(|_| malformed(format!("expected 16 octets, found {}", b.len()))),
            (Self::Enum(enum_type), WireValue::U64(slot)) => {
                let v = unflip_sign(IntWidth::W64, *slot);
                enum_type.member_of(v).map(|m| Value::Enum(m.to_string())).ok_or_else(|| {
                    CodecError::InvalidEnumValue {
                        enumeration: enum_type.name().to_string(),
                        value: v.to_string(),
                    }
                })
            },
            (Self::Json, WireValue::Bytes(b)) => serde_json::from_slice(b)
                .map(Value::Json)
                .map_err(|e| malformed(e.to_string())),
            (Self::MessagePack, WireValue::Bytes(b)) => rmp_serde::from_slice(b)
                .map(Value::Json)
                .map_err(|e| malformed(e.to_string())),
            (Self::Pickle, WireValue::Bytes(b)) => {
                serde_pickle::from_slice(b, serde_pickle::DeOptions::new())
                    .map(Value::Json)
                    .map_err(|e| malformed(e.to_string()))
            },
            // Shape was checked above
            (_, other) => Err(CodecError::ShapeMismatch { expected, found: other.shape() }),
        }
    }
}
