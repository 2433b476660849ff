//! The control protocol: embedded schema and fixed command table.
//!
//! The control protocol is known ahead of time. Every other protocol is
//! discovered and loaded through it.

use crate::catalog::CommandCatalog;

/// Id of the control protocol.
pub const CONTROL_PROTOCOL_ID: &str = "rpc";

/// File name the control schema is shown under.
pub const CONTROL_SCHEMA_FILE: &str = "rpc.proto";

/// Control command that carries a command for a node-hosted protocol.
pub const PROCESS_CMD: &str = "process_cmd";

/// Control command whose response carries protocol bundles.
pub const GET_PROTOCOLS: &str = "get_protocols";

/// Control command whose response is the list of running nodes.
pub const LIST_NODES: &str = "list_nodes";

/// Control protocol schema.
pub const CONTROL_SCHEMA: &str = r#"syntax = "proto3";

// --- protocol messages ---

message Protocol {
  bytes protocol_id = 1;
  repeated bytes file_names = 2;
  repeated bytes files = 3;
}

message ProtocolIDsList {
  repeated bytes protocol_ids = 1;
}

message ProtocolsList {
  repeated Protocol protocols = 1;
}

// -- node messages --

message Node {
  bytes id = 1;
  bytes protocol_id = 2;
  bytes address = 3;
}

message NodeID {
  bytes node_id = 1;
}

message NodeIdsList {
  repeated bytes node_ids = 1;
}

message NodesList {
  repeated Node nodes = 1;
}

message NodeCmdRequest {
  bytes node_id = 1;
  bytes cmd = 2;
  bytes params = 3;
}

message NodeCmdResponse {
  bytes response = 1;
}

message PeerIdsList {
  bytes node_id = 1;
  repeated uint32 peer_ids = 2;
}

message PeerAddressesList {
  bytes node_id = 1;
  repeated bytes peer_addresses = 2;
}

message PeersList {
  bytes node_id = 1;
  repeated Peer peers = 2;
}

message Peer {
  uint32 id = 1;
  bytes address = 2;
}
"#;

const CONTROL_COMMANDS: &[(&str, &str, &str)] = &[
    ("list_supported_protocols", "", "ProtocolIDsList"),
    ("list_running_protocols", "", "ProtocolIDsList"),
    (GET_PROTOCOLS, "ProtocolIDsList", "ProtocolsList"),
    ("load_protocols", "ProtocolIDsList", ""),
    ("launch_node", "Node", ""),
    (LIST_NODES, "", "NodeIdsList"),
    ("get_nodes", "NodeIdsList", "NodesList"),
    ("add_peers", "PeerAddressesList", "PeersList"),
    ("remove_peers", "PeerIdsList", ""),
    ("list_known_peers", "NodeID", "PeerIdsList"),
    ("list_connected_peers", "NodeID", "PeerIdsList"),
    ("get_peers", "PeerIdsList", "PeersList"),
    ("connect", "PeerIdsList", ""),
    ("disconnect", "PeerIdsList", ""),
    (PROCESS_CMD, "NodeCmdRequest", "NodeCmdResponse"),
];

/// The fixed control command table.
pub fn control_catalog() -> CommandCatalog {
    CommandCatalog::from_entries(CONTROL_PROTOCOL_ID, CONTROL_COMMANDS.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema;

    #[test]
    fn test_control_schema_parses() {
        let graph = parse_schema(CONTROL_SCHEMA).unwrap();
        assert_eq!(graph.len(), 13);
        assert!(graph.message("NodeCmdRequest").is_some());
    }

    #[test]
    fn test_every_command_type_is_defined() {
        let graph = parse_schema(CONTROL_SCHEMA).unwrap();
        let catalog = control_catalog();
        assert_eq!(catalog.len(), 15);
        for spec in catalog.iter() {
            for ty in [spec.request_type(), spec.response_type()].into_iter().flatten() {
                assert!(graph.message(ty).is_some(), "{}: {ty}", spec.name);
            }
        }
    }

    #[test]
    fn test_get_nodes_takes_node_ids() {
        let spec = control_catalog().lookup("get_nodes").unwrap().clone();
        assert_eq!(spec.request_type(), Some("NodeIdsList"));
        assert_eq!(spec.response_type(), Some("NodesList"));
    }
}
