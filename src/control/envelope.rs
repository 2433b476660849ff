//! Outer envelope framing.
//!
//! Control commands travel as-is. Commands for any other protocol are
//! wrapped in a `NodeCmdRequest` and sent through `process_cmd`; their
//! replies come back wrapped in a `NodeCmdResponse`.

use serde_json::json;

use super::schema::PROCESS_CMD;
use crate::codec::{decode_base64, encode_base64, ProtoCodec};
use crate::error::{DynwireError, Result};
use crate::schema::SchemaGraph;
use crate::transport::WireRequest;

const NODE_CMD_REQUEST: &str = "NodeCmdRequest";
const NODE_CMD_RESPONSE: &str = "NodeCmdResponse";

/// Envelope for a control command.
pub fn control_request(command: &str, payload: Vec<u8>) -> WireRequest {
    WireRequest::new(command, payload)
}

/// Envelope for a command of a node-hosted protocol.
pub fn node_request(
    control: &SchemaGraph,
    node_id: &[u8],
    command: &str,
    params: &[u8],
) -> Result<WireRequest> {
    let envelope = json!({
        "node_id": encode_base64(node_id),
        "cmd": encode_base64(command.as_bytes()),
        "params": encode_base64(params),
    });
    let msg = ProtoCodec::encode(control, NODE_CMD_REQUEST, &envelope)?;
    Ok(WireRequest::new(PROCESS_CMD, msg))
}

/// Extract the inner response bytes from a `NodeCmdResponse`.
pub fn unwrap_node_response(control: &SchemaGraph, bytes: &[u8]) -> Result<Vec<u8>> {
    let value = ProtoCodec::decode(control, NODE_CMD_RESPONSE, bytes)?;
    value["response"]
        .as_str()
        .and_then(decode_base64)
        .ok_or_else(|| DynwireError::Decoding("NodeCmdResponse.response: missing bytes".into()))
}
