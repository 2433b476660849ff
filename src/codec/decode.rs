//! Protobuf binary → JSON value, shaped by a message definition.
//!
//! Every declared field appears in the output in declaration order. Absent
//! scalars take their proto3 default, absent repeated fields are `[]` and
//! absent message fields are `null`. Unknown field numbers are skipped.

use bytes::Buf;
use prost::encoding::{decode_key, decode_varint, WireType};
use serde_json::{Map, Value};

use super::encode_base64;
use crate::error::{DynwireError, Result};
use crate::schema::{EnumDef, FieldDef, MessageDef, ResolvedType, ScalarKind, SchemaGraph};

/// Nesting limit for embedded messages.
pub(crate) const RECURSION_LIMIT: usize = 100;

fn malformed(path: &str, message: impl std::fmt::Display) -> DynwireError {
    DynwireError::Decoding(format!("{path}: {message}"))
}

pub(crate) fn decode_message(
    graph: &SchemaGraph,
    msg: &MessageDef,
    mut buf: &[u8],
    path: &str,
    depth: usize,
) -> Result<Value> {
    if depth > RECURSION_LIMIT {
        return Err(malformed(path, "recursion limit reached"));
    }

    let mut slots: Vec<Vec<Value>> = vec![Vec::new(); msg.fields.len()];

    while buf.has_remaining() {
        let (number, wire_type) = decode_key(&mut buf).map_err(|e| malformed(path, e))?;
        let Some(index) = msg.fields.iter().position(|f| f.number == number) else {
            skip_field(wire_type, &mut buf, path)?;
            continue;
        };
        let field = &msg.fields[index];
        let field_path = format!("{path}.{}", field.name);
        let resolved = graph
            .resolve(field)
            .map_err(|e| malformed(&field_path, e))?;
        let slot = &mut slots[index];

        match resolved {
            ResolvedType::Message(inner) => {
                expect_wire_type(wire_type, WireType::LengthDelimited, &field_path)?;
                let body = take_delimited(&mut buf, &field_path)?;
                slot.push(decode_message(graph, inner, body, &field_path, depth + 1)?);
            }
            ResolvedType::Scalar(kind) => {
                let expected = scalar_wire_type(kind);
                if wire_type == WireType::LengthDelimited && expected != WireType::LengthDelimited {
                    let mut packed = take_delimited(&mut buf, &field_path)?;
                    while packed.has_remaining() {
                        slot.push(read_scalar(kind, &mut packed, &field_path)?);
                    }
                } else {
                    expect_wire_type(wire_type, expected, &field_path)?;
                    slot.push(read_scalar(kind, &mut buf, &field_path)?);
                }
            }
            ResolvedType::Enum(en) => {
                if wire_type == WireType::LengthDelimited {
                    let mut packed = take_delimited(&mut buf, &field_path)?;
                    while packed.has_remaining() {
                        slot.push(read_enum(en, &mut packed, &field_path)?);
                    }
                } else {
                    expect_wire_type(wire_type, WireType::Varint, &field_path)?;
                    slot.push(read_enum(en, &mut buf, &field_path)?);
                }
            }
        }
    }

    let mut object = Map::with_capacity(msg.fields.len());
    for (field, mut values) in msg.fields.iter().zip(slots) {
        let value = if field.repeated {
            Value::Array(values)
        } else {
            // Last occurrence wins for singular fields.
            match values.pop() {
                Some(v) => v,
                None => default_value(graph, field),
            }
        };
        object.insert(field.name.clone(), value);
    }
    Ok(Value::Object(object))
}

fn default_value(graph: &SchemaGraph, field: &FieldDef) -> Value {
    match graph.resolve(field) {
        Ok(ResolvedType::Scalar(kind)) => match kind {
            ScalarKind::String | ScalarKind::Bytes => Value::String(String::new()),
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Float | ScalarKind::Double => Value::from(0.0),
            _ => Value::from(0),
        },
        Ok(ResolvedType::Enum(en)) => enum_value(en, 0),
        Ok(ResolvedType::Message(_)) | Err(_) => Value::Null,
    }
}

fn scalar_wire_type(kind: ScalarKind) -> WireType {
    match kind {
        ScalarKind::String | ScalarKind::Bytes => WireType::LengthDelimited,
        ScalarKind::Fixed32 | ScalarKind::Sfixed32 | ScalarKind::Float => WireType::ThirtyTwoBit,
        ScalarKind::Fixed64 | ScalarKind::Sfixed64 | ScalarKind::Double => WireType::SixtyFourBit,
        _ => WireType::Varint,
    }
}

fn expect_wire_type(actual: WireType, expected: WireType, path: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(malformed(
            path,
            format!("wire type mismatch: expected {expected:?}, found {actual:?}"),
        ))
    }
}

fn read_varint(buf: &mut &[u8], path: &str) -> Result<u64> {
    decode_varint(buf).map_err(|e| malformed(path, e))
}

fn take<'a>(buf: &mut &'a [u8], len: usize, path: &str) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(malformed(
            path,
            format!("truncated: need {len} bytes, {} remaining", buf.len()),
        ));
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn take_delimited<'a>(buf: &mut &'a [u8], path: &str) -> Result<&'a [u8]> {
    let len = read_varint(buf, path)?;
    let len = usize::try_from(len).map_err(|_| malformed(path, "length overflow"))?;
    take(buf, len, path)
}

fn skip_field(wire_type: WireType, buf: &mut &[u8], path: &str) -> Result<()> {
    match wire_type {
        WireType::Varint => {
            read_varint(buf, path)?;
        }
        WireType::SixtyFourBit => {
            take(buf, 8, path)?;
        }
        WireType::ThirtyTwoBit => {
            take(buf, 4, path)?;
        }
        WireType::LengthDelimited => {
            take_delimited(buf, path)?;
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(malformed(path, "group encoding is not supported"));
        }
    }
    Ok(())
}

fn read_enum(en: &EnumDef, buf: &mut &[u8], path: &str) -> Result<Value> {
    let raw = read_varint(buf, path)?;
    Ok(enum_value(en, raw as i64 as i32))
}

fn enum_value(en: &EnumDef, number: i32) -> Value {
    match en.name_of(number) {
        Some(name) => Value::String(name.to_string()),
        None => Value::from(number),
    }
}

fn read_scalar(kind: ScalarKind, buf: &mut &[u8], path: &str) -> Result<Value> {
    let value = match kind {
        ScalarKind::String => {
            let raw = take_delimited(buf, path)?;
            let text = std::str::from_utf8(raw).map_err(|e| malformed(path, e))?;
            Value::String(text.to_string())
        }
        ScalarKind::Bytes => Value::String(encode_base64(take_delimited(buf, path)?)),
        ScalarKind::Bool => Value::Bool(read_varint(buf, path)? != 0),
        ScalarKind::Int32 => Value::from(read_varint(buf, path)? as i64 as i32),
        ScalarKind::Int64 => Value::from(read_varint(buf, path)? as i64),
        ScalarKind::Uint32 => Value::from(read_varint(buf, path)? as u32),
        ScalarKind::Uint64 => Value::from(read_varint(buf, path)?),
        ScalarKind::Sint32 => {
            let n = read_varint(buf, path)? as u32;
            Value::from(((n >> 1) as i32) ^ -((n & 1) as i32))
        }
        ScalarKind::Sint64 => {
            let n = read_varint(buf, path)?;
            Value::from(((n >> 1) as i64) ^ -((n & 1) as i64))
        }
        ScalarKind::Fixed32 => Value::from(take(buf, 4, path)?.get_u32_le()),
        ScalarKind::Sfixed32 => Value::from(take(buf, 4, path)?.get_i32_le()),
        ScalarKind::Float => Value::from(f64::from(take(buf, 4, path)?.get_f32_le())),
        ScalarKind::Fixed64 => Value::from(take(buf, 8, path)?.get_u64_le()),
        ScalarKind::Sfixed64 => Value::from(take(buf, 8, path)?.get_i64_le()),
        ScalarKind::Double => Value::from(take(buf, 8, path)?.get_f64_le()),
    };
    Ok(value)
}
