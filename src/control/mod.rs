//! Control module - the built-in `rpc` protocol and envelope framing.
//!
//! The control protocol is self-describing: its schema and command table
//! ship with the crate. Every exchange goes out as a control command; calls
//! to other protocols ride inside `process_cmd`.

mod envelope;
mod schema;

pub use envelope::{control_request, node_request, unwrap_node_response};
pub use schema::{
    control_catalog, CONTROL_PROTOCOL_ID, CONTROL_SCHEMA, CONTROL_SCHEMA_FILE, GET_PROTOCOLS,
    LIST_NODES, PROCESS_CMD,
};
