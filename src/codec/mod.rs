//! Codec module - protobuf payloads driven by a runtime [`SchemaGraph`].
//!
//! - [`ProtoCodec`] - JSON value ⇄ protobuf binary for any message in a graph
//! - [`encode_base64`] / [`decode_base64`] - the text form used for `bytes`
//!   fields and for envelope payloads
//!
//! # Design
//!
//! Like the rest of the crate's codecs, [`ProtoCodec`] is a marker struct
//! with static methods. The schema travels as an argument instead of being
//! baked into generated types.
//!
//! # Example
//!
//! ```
//! use dynwire_client::codec::ProtoCodec;
//! use dynwire_client::schema::parse_schema;
//! use serde_json::json;
//!
//! let graph = parse_schema("message Peer { uint32 id = 1; string name = 2; }").unwrap();
//! let bytes = ProtoCodec::encode(&graph, "Peer", &json!({ "id": 7, "name": "a" })).unwrap();
//! let value = ProtoCodec::decode(&graph, "Peer", &bytes).unwrap();
//! assert_eq!(value, json!({ "id": 7, "name": "a" }));
//! ```

mod decode;
mod encode;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde_json::Value;

use crate::error::{DynwireError, Result};
use crate::schema::SchemaGraph;

/// Protobuf codec for schemas known only at runtime.
pub struct ProtoCodec;

impl ProtoCodec {
    /// Encode a JSON object as the message `type_name`.
    ///
    /// Keys that are not fields of the message are rejected. Singular
    /// scalars equal to their default are omitted, and repeated numeric
    /// fields are written packed.
    ///
    /// # Errors
    ///
    /// [`DynwireError::UnknownType`] if the graph has no such message,
    /// [`DynwireError::Encoding`] if the value does not fit the schema.
    pub fn encode(graph: &SchemaGraph, type_name: &str, value: &Value) -> Result<Vec<u8>> {
        let msg = graph
            .message(type_name)
            .ok_or_else(|| DynwireError::UnknownType(type_name.to_string()))?;
        let mut buf = Vec::new();
        encode::encode_message(graph, msg, value, &msg.name, &mut buf)?;
        Ok(buf)
    }

    /// Decode `bytes` as the message `type_name`.
    ///
    /// # Errors
    ///
    /// [`DynwireError::UnknownType`] if the graph has no such message,
    /// [`DynwireError::Decoding`] if the bytes are not a valid instance.
    pub fn decode(graph: &SchemaGraph, type_name: &str, bytes: &[u8]) -> Result<Value> {
        let msg = graph
            .message(type_name)
            .ok_or_else(|| DynwireError::UnknownType(type_name.to_string()))?;
        decode::decode_message(graph, msg, bytes, &msg.name, 0)
    }
}

/// Standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Accepts standard or URL-safe base64, padded or not.
pub fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;
    use serde_json::json;

    const SCHEMA: &str = r#"
        syntax = "proto3";
        package demo;

        enum Mode { MODE_OFF = 0; MODE_ON = 1; MODE_AUTO = 2; }

        message Peer {
          uint32 id = 1;
          bytes address = 2;
        }

        message Sample {
          string name = 1;
          int32 delta = 2;
          int64 total = 3;
          sint32 offset = 4;
          sint64 drift = 5;
          fixed32 crc = 6;
          sfixed64 stamp = 7;
          double ratio = 8;
          float gain = 9;
          bool enabled = 10;
          Mode mode = 11;
          repeated uint32 values = 12;
          repeated string tags = 13;
          repeated Peer peers = 14;
          Peer primary = 15;
          repeated Mode modes = 16;
        }
    "#;

    fn graph() -> SchemaGraph {
        parse_schema(SCHEMA).unwrap()
    }

    #[test]
    fn test_known_wire_bytes() {
        let graph = graph();
        let bytes = ProtoCodec::encode(&graph, "Peer", &json!({ "id": 150 })).unwrap();
        assert_eq!(bytes, vec![0x08, 0x96, 0x01]);

        let bytes = ProtoCodec::encode(&graph, "Sample", &json!({ "values": [3, 270] })).unwrap();
        // Packed: key (12 << 3 | 2), length 3, then varints.
        assert_eq!(bytes, vec![0x62, 0x03, 0x03, 0x8e, 0x02]);
    }

    #[test]
    fn test_defaults_omitted() {
        let graph = graph();
        let bytes = ProtoCodec::encode(
            &graph,
            "Sample",
            &json!({ "name": "", "delta": 0, "enabled": false, "mode": "MODE_OFF", "values": [] }),
        )
        .unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let graph = graph();
        let input = json!({
            "name": "node-1",
            "delta": -5,
            "total": 9007199254740993i64,
            "offset": -3,
            "drift": -70000,
            "crc": 4294967295u32,
            "stamp": -1,
            "ratio": 0.25,
            "gain": 1.5,
            "enabled": true,
            "mode": "MODE_AUTO",
            "values": [1, 2, 300],
            "tags": ["a", "", "c"],
            "peers": [{ "id": 1, "address": "AQID" }, { "id": 2, "address": "" }],
            "primary": { "id": 9, "address": "/w==" },
            "modes": ["MODE_ON", "MODE_OFF"]
        });
        let bytes = ProtoCodec::encode(&graph, "Sample", &input).unwrap();
        let output = ProtoCodec::decode(&graph, "Sample", &bytes).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_decode_fills_defaults_in_order() {
        let graph = graph();
        let value = ProtoCodec::decode(&graph, "Sample", &[]).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys[0], "name");
        assert_eq!(keys.last().unwrap(), "modes");
        assert_eq!(value["name"], json!(""));
        assert_eq!(value["delta"], json!(0));
        assert_eq!(value["enabled"], json!(false));
        assert_eq!(value["mode"], json!("MODE_OFF"));
        assert_eq!(value["values"], json!([]));
        assert_eq!(value["primary"], Value::Null);
    }

    #[test]
    fn test_lenient_scalar_inputs() {
        let graph = graph();
        let bytes = ProtoCodec::encode(
            &graph,
            "Sample",
            &json!({ "total": "12", "mode": 1, "ratio": "NaN" }),
        )
        .unwrap();
        let value = ProtoCodec::decode(&graph, "Sample", &bytes).unwrap();
        assert_eq!(value["total"], json!(12));
        assert_eq!(value["mode"], json!("MODE_ON"));
    }

    #[test]
    fn test_unpacked_repeated_accepted() {
        let graph = graph();
        // values = 1, values = 2 as individual varint records.
        let value = ProtoCodec::decode(&graph, "Sample", &[0x60, 0x01, 0x60, 0x02]).unwrap();
        assert_eq!(value["values"], json!([1, 2]));
    }

    #[test]
    fn test_unknown_fields_skipped_on_decode() {
        let graph = graph();
        // field 99 varint, field 98 length-delimited, then id = 5.
        let bytes = [0x98, 0x06, 0x01, 0x92, 0x06, 0x02, 0xaa, 0xbb, 0x08, 0x05];
        let value = ProtoCodec::decode(&graph, "Peer", &bytes).unwrap();
        assert_eq!(value, json!({ "id": 5, "address": "" }));
    }

    #[test]
    fn test_unknown_enum_number_kept_numeric() {
        let graph = graph();
        let value = ProtoCodec::decode(&graph, "Sample", &[0x58, 0x07]).unwrap();
        assert_eq!(value["mode"], json!(7));
    }

    #[test]
    fn test_encode_errors() {
        let graph = graph();
        let cases = [
            json!("not an object"),
            json!({ "bogus": 1 }),
            json!({ "delta": "abc" }),
            json!({ "delta": 4294967296i64 }),
            json!({ "crc": -1 }),
            json!({ "enabled": "yes" }),
            json!({ "values": 3 }),
            json!({ "mode": "MODE_UNKNOWN" }),
            json!({ "primary": { "address": "***" } }),
            json!({ "peers": [{ "nope": 1 }] }),
        ];
        for case in cases {
            let err = ProtoCodec::encode(&graph, "Sample", &case).unwrap_err();
            assert!(matches!(err, DynwireError::Encoding(_)), "{case}: {err:?}");
        }
    }

    #[test]
    fn test_error_message_names_path() {
        let graph = graph();
        let err = ProtoCodec::encode(&graph, "Sample", &json!({ "peers": [{ "id": "x" }] })).unwrap_err();
        assert!(err.to_string().contains("Sample.peers[0].id"), "{err}");
    }

    #[test]
    fn test_decode_errors() {
        let graph = graph();
        let cases: [&[u8]; 5] = [
            &[0x08],             // truncated varint
            &[0x12, 0x05, 0x01], // length past end
            &[0x0a, 0x02, 0xff, 0xfe], // invalid UTF-8 in name
            &[0x0d, 0x00, 0x00, 0x00, 0x00], // fixed32 for a string field
            &[0x00],             // field number zero
        ];
        for case in cases {
            let err = ProtoCodec::decode(&graph, "Sample", case).unwrap_err();
            assert!(matches!(err, DynwireError::Decoding(_)), "{case:?}: {err:?}");
        }
    }

    #[test]
    fn test_unknown_type() {
        let graph = graph();
        assert!(matches!(
            ProtoCodec::encode(&graph, "Nope", &json!({})),
            Err(DynwireError::UnknownType(_))
        ));
        assert!(matches!(
            ProtoCodec::decode(&graph, "Nope", &[]),
            Err(DynwireError::UnknownType(_))
        ));
    }

    #[test]
    fn test_qualified_type_name() {
        let graph = graph();
        let bytes = ProtoCodec::encode(&graph, ".demo.Peer", &json!({ "id": 1 })).unwrap();
        assert_eq!(ProtoCodec::decode(&graph, "demo.Peer", &bytes).unwrap()["id"], json!(1));
    }

    #[test]
    fn test_base64_variants() {
        assert_eq!(encode_base64(&[0xfb, 0xff]), "+/8=");
        assert_eq!(decode_base64("+/8=").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode_base64("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(decode_base64("not base64!").is_none());
    }
}
