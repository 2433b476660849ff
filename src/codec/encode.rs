//! JSON value → protobuf binary, validated against a message definition.

use prost::encoding::{encode_key, encode_varint, WireType};
use serde_json::Value;

use super::decode_base64;
use crate::error::{DynwireError, Result};
use crate::schema::{EnumDef, FieldDef, MessageDef, ResolvedType, ScalarKind, SchemaGraph};

/// A single encoded scalar, before its key is written.
enum Scalar {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(Vec<u8>),
}

impl Scalar {
    fn is_default(&self) -> bool {
        match self {
            Scalar::Varint(v) | Scalar::Fixed64(v) => *v == 0,
            Scalar::Fixed32(v) => *v == 0,
            Scalar::Bytes(b) => b.is_empty(),
        }
    }

    fn wire_type(&self) -> WireType {
        match self {
            Scalar::Varint(_) => WireType::Varint,
            Scalar::Fixed32(_) => WireType::ThirtyTwoBit,
            Scalar::Fixed64(_) => WireType::SixtyFourBit,
            Scalar::Bytes(_) => WireType::LengthDelimited,
        }
    }

    /// Write the value without a key (packed element or after `encode_key`).
    fn write(&self, buf: &mut Vec<u8>) {
        match self {
            Scalar::Varint(v) => encode_varint(*v, buf),
            Scalar::Fixed32(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Scalar::Fixed64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Scalar::Bytes(b) => {
                encode_varint(b.len() as u64, buf);
                buf.extend_from_slice(b);
            }
        }
    }
}

fn invalid(path: &str, message: impl std::fmt::Display) -> DynwireError {
    DynwireError::Encoding(format!("{path}: {message}"))
}

/// Encode `value` as an instance of `msg` into `buf`.
///
/// `path` names the value in error messages (e.g. `Node.peers[0]`).
pub(crate) fn encode_message(
    graph: &SchemaGraph,
    msg: &MessageDef,
    value: &Value,
    path: &str,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(path, format!("expected object for {}", msg.name)))?;
    if let Some(unknown) = object.keys().find(|k| msg.field(k).is_none()) {
        return Err(invalid(path, format!("unknown field '{unknown}' for {}", msg.name)));
    }

    for field in &msg.fields {
        let Some(field_value) = object.get(&field.name) else {
            continue;
        };
        if field_value.is_null() {
            continue;
        }
        let field_path = format!("{path}.{}", field.name);
        let resolved = graph.resolve(field)?;

        if field.repeated {
            let items = field_value
                .as_array()
                .ok_or_else(|| invalid(&field_path, "expected array for repeated field"))?;
            encode_repeated(graph, field, resolved, items, &field_path, buf)?;
        } else {
            encode_singular(graph, field, resolved, field_value, &field_path, buf)?;
        }
    }
    Ok(())
}

fn encode_singular(
    graph: &SchemaGraph,
    field: &FieldDef,
    resolved: ResolvedType<'_>,
    value: &Value,
    path: &str,
    buf: &mut Vec<u8>,
) -> Result<()> {
    match resolved {
        ResolvedType::Message(inner) => {
            let mut nested = Vec::new();
            encode_message(graph, inner, value, path, &mut nested)?;
            encode_key(field.number, WireType::LengthDelimited, buf);
            Scalar::Bytes(nested).write(buf);
        }
        ResolvedType::Scalar(kind) => {
            let scalar = scalar_value(kind, value, path)?;
            if !scalar.is_default() {
                encode_key(field.number, scalar.wire_type(), buf);
                scalar.write(buf);
            }
        }
        ResolvedType::Enum(en) => {
            let number = enum_number(en, value, path)?;
            if number != 0 {
                encode_key(field.number, WireType::Varint, buf);
                encode_varint(number as i64 as u64, buf);
            }
        }
    }
    Ok(())
}

fn encode_repeated(
    graph: &SchemaGraph,
    field: &FieldDef,
    resolved: ResolvedType<'_>,
    items: &[Value],
    path: &str,
    buf: &mut Vec<u8>,
) -> Result<()> {
    match resolved {
        ResolvedType::Message(inner) => {
            for (i, item) in items.iter().enumerate() {
                let mut nested = Vec::new();
                encode_message(graph, inner, item, &format!("{path}[{i}]"), &mut nested)?;
                encode_key(field.number, WireType::LengthDelimited, buf);
                Scalar::Bytes(nested).write(buf);
            }
        }
        ResolvedType::Scalar(kind) if kind.is_string_like() => {
            for (i, item) in items.iter().enumerate() {
                let scalar = scalar_value(kind, item, &format!("{path}[{i}]"))?;
                encode_key(field.number, WireType::LengthDelimited, buf);
                scalar.write(buf);
            }
        }
        ResolvedType::Scalar(kind) => {
            let mut packed = Vec::new();
            for (i, item) in items.iter().enumerate() {
                scalar_value(kind, item, &format!("{path}[{i}]"))?.write(&mut packed);
            }
            write_packed(field.number, packed, buf);
        }
        ResolvedType::Enum(en) => {
            let mut packed = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let number = enum_number(en, item, &format!("{path}[{i}]"))?;
                encode_varint(number as i64 as u64, &mut packed);
            }
            write_packed(field.number, packed, buf);
        }
    }
    Ok(())
}

fn write_packed(number: u32, packed: Vec<u8>, buf: &mut Vec<u8>) {
    if packed.is_empty() {
        return;
    }
    encode_key(number, WireType::LengthDelimited, buf);
    Scalar::Bytes(packed).write(buf);
}

fn enum_number(en: &EnumDef, value: &Value, path: &str) -> Result<i32> {
    match value {
        Value::String(name) => en
            .number_of(name)
            .ok_or_else(|| invalid(path, format!("'{name}' is not a value of enum {}", en.name))),
        _ => {
            let n = as_i64(value, path)?;
            i32::try_from(n).map_err(|_| invalid(path, format!("{n} out of range for enum {}", en.name)))
        }
    }
}

fn scalar_value(kind: ScalarKind, value: &Value, path: &str) -> Result<Scalar> {
    let scalar = match kind {
        ScalarKind::String => match value {
            Value::String(s) => Scalar::Bytes(s.as_bytes().to_vec()),
            _ => return Err(invalid(path, "expected string")),
        },
        ScalarKind::Bytes => match value {
            Value::String(s) => {
                Scalar::Bytes(decode_base64(s).ok_or_else(|| invalid(path, "expected base64 string"))?)
            }
            _ => return Err(invalid(path, "expected base64 string")),
        },
        ScalarKind::Bool => match value {
            Value::Bool(b) => Scalar::Varint(u64::from(*b)),
            _ => return Err(invalid(path, "expected boolean")),
        },
        ScalarKind::Int32 => Scalar::Varint(i64::from(as_i32(value, path)?) as u64),
        ScalarKind::Int64 => Scalar::Varint(as_i64(value, path)? as u64),
        ScalarKind::Uint32 => Scalar::Varint(u64::from(as_u32(value, path)?)),
        ScalarKind::Uint64 => Scalar::Varint(as_u64(value, path)?),
        ScalarKind::Sint32 => {
            let n = as_i32(value, path)?;
            Scalar::Varint(u64::from(((n << 1) ^ (n >> 31)) as u32))
        }
        ScalarKind::Sint64 => {
            let n = as_i64(value, path)?;
            Scalar::Varint(((n << 1) ^ (n >> 63)) as u64)
        }
        ScalarKind::Fixed32 => Scalar::Fixed32(as_u32(value, path)?),
        ScalarKind::Sfixed32 => Scalar::Fixed32(as_i32(value, path)? as u32),
        ScalarKind::Fixed64 => Scalar::Fixed64(as_u64(value, path)?),
        ScalarKind::Sfixed64 => Scalar::Fixed64(as_i64(value, path)? as u64),
        ScalarKind::Float => Scalar::Fixed32((as_f64(value, path)? as f32).to_bits()),
        ScalarKind::Double => Scalar::Fixed64(as_f64(value, path)?.to_bits()),
    };
    Ok(scalar)
}

fn as_i64(value: &Value, path: &str) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(path, format!("expected integer, found {value}")))
}

fn as_u64(value: &Value, path: &str) -> Result<u64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < 1.8e19).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(path, format!("expected unsigned integer, found {value}")))
}

fn as_i32(value: &Value, path: &str) -> Result<i32> {
    let n = as_i64(value, path)?;
    i32::try_from(n).map_err(|_| invalid(path, format!("{n} out of range for 32-bit integer")))
}

fn as_u32(value: &Value, path: &str) -> Result<u32> {
    let n = as_u64(value, path)?;
    u32::try_from(n).map_err(|_| invalid(path, format!("{n} out of range for 32-bit unsigned integer")))
}

fn as_f64(value: &Value, path: &str) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(path, format!("expected number, found {value}")))
}
