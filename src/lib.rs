//! # dynwire-client
//!
//! Client runtime for talking to node-hosted wire protocols whose schemas
//! are only known at runtime.
//!
//! A fixed control protocol (`rpc`) ships with the crate. It is used to
//! discover and fetch other protocols as bundles (a `.proto` schema plus a
//! JSON command manifest), which are parsed and cached in a
//! [`ProtocolRegistry`]. The [`Dispatcher`] then invokes their commands,
//! wrapping each call in a control envelope.
//!
//! ## Architecture
//!
//! - **Schema** ([`schema`]): `.proto` text → [`SchemaGraph`], default templates
//! - **Codec** ([`codec`]): JSON ⇄ protobuf binary against a graph
//! - **Catalog** ([`catalog`]): command → request/response types
//! - **Control** ([`control`]): built-in protocol and envelope framing
//! - **Registry** ([`registry`]): loaded protocols and known nodes
//! - **Transport** ([`transport`]): bytes in, bytes out (HTTP by default)
//!
//! ## Example
//!
//! ```ignore
//! use dynwire_client::Dispatcher;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> dynwire_client::Result<()> {
//!     let dispatcher = Dispatcher::builder().build()?;
//!
//!     let ids = dispatcher.invoke("rpc", "list_supported_protocols", None).await?;
//!     dispatcher
//!         .invoke("rpc", "get_protocols", Some(json!({ "protocol_ids": ids["protocol_ids"] })))
//!         .await?;
//!
//!     for id in dispatcher.registry().protocol_ids() {
//!         println!("{id}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod codec;
pub mod control;
pub mod error;
pub mod registry;
pub mod schema;
pub mod transport;

mod dispatcher;
mod inflight;

pub use dispatcher::{
    Dispatcher, DispatcherBuilder, DispatcherConfig, PendingInvocation, DEFAULT_EXCHANGE_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use error::{DynwireError, Result};
pub use inflight::{InFlightGuard, InFlightTracker};
pub use registry::{Protocol, ProtocolBundle, ProtocolRegistry};
pub use schema::SchemaGraph;
