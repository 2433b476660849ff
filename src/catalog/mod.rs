//! Catalog module - per-protocol command tables.
//!
//! - [`CommandCatalog`] - command → request/response types, manifest order
//! - [`Manifest`] - the bundle's JSON command list
//!
//! # Example
//!
//! ```
//! use dynwire_client::catalog::CommandCatalog;
//!
//! let catalog = CommandCatalog::from_manifest(
//!     "chat",
//!     r#"{"commands": [["get_msg", "GetMsgRequest", "GetMsgResponse"]]}"#,
//! )
//! .unwrap();
//! assert_eq!(catalog.lookup("get_msg").unwrap().request_type(), Some("GetMsgRequest"));
//! ```

mod commands;
mod manifest;

pub use commands::{CommandCatalog, CommandSpec};
pub use manifest::Manifest;
