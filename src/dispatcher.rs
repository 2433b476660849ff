//! Invocation pipeline.
//!
//! The [`DispatcherBuilder`] configures the endpoint, exchange timeout and
//! transport. A [`Dispatcher`] then runs each invocation through:
//! 1. Command lookup in the protocol's catalog
//! 2. Request encoding against the protocol's schema
//! 3. Envelope framing with the control schema
//! 4. One transport exchange, bounded by the exchange timeout
//! 5. Envelope and response decoding
//! 6. Bootstrap side effects for `get_protocols` and `list_nodes`
//!
//! # Example
//!
//! ```ignore
//! use dynwire_client::Dispatcher;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> dynwire_client::Result<()> {
//!     let dispatcher = Dispatcher::builder()
//!         .endpoint("http://127.0.0.1:33777")
//!         .build()?;
//!
//!     dispatcher
//!         .invoke("rpc", "get_protocols", Some(json!({ "protocol_ids": ["Y2hhdA=="] })))
//!         .await?;
//!     let reply = dispatcher
//!         .invoke_on(b"node-1", "chat", "get_msg", Some(json!({ "id": 1 })))
//!         .await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::codec::{decode_base64, ProtoCodec};
use crate::control::{
    control_request, node_request, unwrap_node_response, CONTROL_PROTOCOL_ID, GET_PROTOCOLS,
    LIST_NODES,
};
use crate::error::{DynwireError, Result};
use crate::inflight::InFlightTracker;
use crate::registry::{ProtocolBundle, ProtocolRegistry};
use crate::transport::{HttpTransport, Transport, DEFAULT_ENDPOINT};

/// Default bound on a single exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default HTTP user agent.
pub const DEFAULT_USER_AGENT: &str = concat!("dynwire/", env!("CARGO_PKG_VERSION"));

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Control endpoint for the HTTP transport.
    pub endpoint: String,
    /// Upper bound on one transport exchange.
    pub exchange_timeout: Duration,
    /// User agent sent by the HTTP transport.
    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Builder for a [`Dispatcher`].
///
/// Without an explicit transport, `build()` creates an [`HttpTransport`]
/// for the configured endpoint.
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    registry: Option<Arc<ProtocolRegistry>>,
    transport: Option<Arc<dyn Transport>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the control endpoint.
    ///
    /// Default: `http://127.0.0.1:33777`
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the exchange timeout.
    ///
    /// Default: 10 seconds
    pub fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.config.exchange_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Share an existing registry instead of creating a new one.
    pub fn registry(mut self, registry: Arc<ProtocolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a custom transport.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Build the dispatcher.
    ///
    /// # Errors
    ///
    /// [`DynwireError::Transport`] if the default HTTP client cannot be created.
    pub fn build(self) -> Result<Dispatcher> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                self.config.endpoint.clone(),
                self.config.exchange_timeout,
                &self.config.user_agent,
            )?),
        };
        Ok(Dispatcher {
            inner: Arc::new(Inner {
                registry: self.registry.unwrap_or_default(),
                transport,
                config: self.config,
                in_flight: InFlightTracker::new(),
            }),
        })
    }
}

struct Inner {
    registry: Arc<ProtocolRegistry>,
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
    in_flight: InFlightTracker,
}

/// Sends commands of any loaded protocol and decodes their replies.
///
/// Cheap to clone; clones share the registry, transport and in-flight set.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("in_flight", &self.inner.in_flight)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatcher with default settings over `transport`.
    pub fn new(transport: impl Transport) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(ProtocolRegistry::new()),
                transport: Arc::new(transport),
                config: DispatcherConfig::default(),
                in_flight: InFlightTracker::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Outstanding `(protocol, command)` pairs.
    pub fn in_flight(&self) -> Vec<(String, String)> {
        self.inner.in_flight.snapshot()
    }

    /// Invoke `command` of `protocol_id` with an empty node id.
    pub async fn invoke(
        &self,
        protocol_id: &str,
        command: &str,
        payload: Option<Value>,
    ) -> Result<Value> {
        self.invoke_on(&[], protocol_id, command, payload).await
    }

    /// Invoke `command` of `protocol_id` on `node_id`.
    ///
    /// A `null` payload counts as no payload. Returns `null` for commands
    /// without a response type.
    ///
    /// # Errors
    ///
    /// - [`DynwireError::ProtocolNotLoaded`] / [`DynwireError::UnknownCommand`]
    /// - [`DynwireError::Encoding`] for a bad payload or payload/no-payload mismatch
    /// - [`DynwireError::InFlight`] if the same pair is already outstanding
    /// - [`DynwireError::Transport`] / [`DynwireError::Timeout`] from the exchange
    /// - [`DynwireError::Decoding`] if the reply does not match the response type
    pub async fn invoke_on(
        &self,
        node_id: &[u8],
        protocol_id: &str,
        command: &str,
        payload: Option<Value>,
    ) -> Result<Value> {
        let registry = &self.inner.registry;
        let control = registry.ensure_control_loaded()?;
        let is_control = protocol_id == CONTROL_PROTOCOL_ID;
        let protocol = if is_control {
            Arc::clone(&control)
        } else {
            registry.get(protocol_id)?
        };
        let spec = protocol.commands().lookup(command)?;

        let payload = payload.filter(|v| !v.is_null());
        let msg = match (spec.request_type(), payload) {
            (Some(request_type), Some(value)) => {
                ProtoCodec::encode(protocol.schema(), request_type, &value).map_err(as_encoding)?
            }
            (None, None) => Vec::new(),
            (Some(request_type), None) => {
                return Err(DynwireError::Encoding(format!(
                    "{command} expects a {request_type} payload"
                )));
            }
            (None, Some(_)) => {
                return Err(DynwireError::Encoding(format!("{command} takes no payload")));
            }
        };

        let request = if is_control {
            control_request(command, msg)
        } else {
            node_request(control.schema(), node_id, command, &msg).map_err(as_encoding)?
        };

        let guard = self.inner.in_flight.try_acquire(protocol_id, command)?;
        let limit = self.inner.config.exchange_timeout;
        debug!(protocol = protocol_id, command, bytes = request.msg.len(), "exchange");
        let exchange = self.inner.transport.exchange(request);
        let response = tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| DynwireError::Timeout(limit))?;
        drop(guard);
        let response = response?;
        debug!(protocol = protocol_id, command, bytes = response.len(), "reply");

        let value = if is_control {
            match spec.response_type() {
                Some(response_type) => ProtoCodec::decode(control.schema(), response_type, &response)
                    .map_err(as_decoding)?,
                None => Value::Null,
            }
        } else {
            let inner = unwrap_node_response(control.schema(), &response).map_err(as_decoding)?;
            match spec.response_type() {
                Some(response_type) => {
                    ProtoCodec::decode(protocol.schema(), response_type, &inner).map_err(as_decoding)?
                }
                None => Value::Null,
            }
        };

        if is_control {
            self.bootstrap(command, &value);
        }
        Ok(value)
    }

    /// Start an invocation on the runtime and return a handle to its result.
    pub fn submit(
        &self,
        node_id: impl Into<Bytes>,
        protocol_id: impl Into<String>,
        command: impl Into<String>,
        payload: Option<Value>,
    ) -> PendingInvocation {
        let node_id = node_id.into();
        let protocol_id = protocol_id.into();
        let command = command.into();
        let this = self.clone();
        let (p, c) = (protocol_id.clone(), command.clone());
        let handle =
            tokio::spawn(async move { this.invoke_on(&node_id, &p, &c, payload).await });
        PendingInvocation {
            protocol_id,
            command,
            handle,
        }
    }

    fn bootstrap(&self, command: &str, value: &Value) {
        match command {
            GET_PROTOCOLS => {
                let bundles = bundles_from(value);
                let loaded = self.inner.registry.load_bundles(bundles);
                debug!(?loaded, "protocols loaded from get_protocols");
            }
            LIST_NODES => {
                let nodes = value["node_ids"]
                    .as_array()
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| id.as_str().and_then(decode_base64))
                            .map(Bytes::from)
                            .collect()
                    })
                    .unwrap_or_default();
                self.inner.registry.set_known_nodes(nodes);
            }
            _ => {}
        }
    }
}

/// Turn a decoded `ProtocolsList` into bundles, skipping non-UTF-8 entries.
fn bundles_from(value: &Value) -> Vec<ProtocolBundle> {
    let Some(protocols) = value["protocols"].as_array() else {
        return Vec::new();
    };
    let text = |v: &Value| -> Option<String> {
        let bytes = decode_base64(v.as_str()?)?;
        String::from_utf8(bytes).ok()
    };
    let texts = |v: &Value| -> Option<Vec<String>> {
        v.as_array()
            .map(|items| items.iter().map(text).collect::<Option<Vec<_>>>())
            .unwrap_or(Some(Vec::new()))
    };

    let mut bundles = Vec::with_capacity(protocols.len());
    for entry in protocols {
        let Some(id) = text(&entry["protocol_id"]) else {
            warn!("skipping protocol with a non UTF-8 id");
            continue;
        };
        let (Some(names), Some(files)) = (texts(&entry["file_names"]), texts(&entry["files"])) else {
            warn!(protocol = %id, "skipping protocol bundle with non UTF-8 files");
            continue;
        };
        if names.len() != files.len() {
            warn!(
                protocol = %id,
                names = names.len(),
                files = files.len(),
                "skipping protocol bundle with mismatched file lists"
            );
            continue;
        }
        bundles.push(ProtocolBundle::new(id, names.into_iter().zip(files).collect()));
    }
    bundles
}

fn as_encoding(e: DynwireError) -> DynwireError {
    match e {
        DynwireError::Encoding(_) => e,
        other => DynwireError::Encoding(other.to_string()),
    }
}

fn as_decoding(e: DynwireError) -> DynwireError {
    match e {
        DynwireError::Decoding(_) => e,
        other => DynwireError::Decoding(other.to_string()),
    }
}

/// Handle to an invocation started with [`Dispatcher::submit`].
#[derive(Debug)]
pub struct PendingInvocation {
    protocol_id: String,
    command: String,
    handle: JoinHandle<Result<Value>>,
}

impl PendingInvocation {
    pub fn protocol_id(&self) -> &str {
        &self.protocol_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the invocation. Its in-flight slot is released.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Wait for the result.
    pub async fn wait(self) -> Result<Value> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                if !e.is_cancelled() {
                    error!(protocol = %self.protocol_id, command = %self.command, "invocation task failed: {e}");
                }
                Err(DynwireError::Transport(format!(
                    "{}/{} did not complete: {e}",
                    self.protocol_id, self.command
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_base64;
    use crate::transport::{BoxFuture, WireRequest};
    use serde_json::json;

    struct Silent;

    impl Transport for Silent {
        fn exchange(&self, _request: WireRequest) -> BoxFuture<'static, Result<Bytes>> {
            Box::pin(async { Ok(Bytes::new()) })
        }
    }

    #[test]
    fn test_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:33777");
        assert_eq!(config.exchange_timeout, Duration::from_secs(10));
        assert!(config.user_agent.starts_with("dynwire/"));
    }

    #[test]
    fn test_builder_chaining() {
        let registry = Arc::new(ProtocolRegistry::new());
        let dispatcher = Dispatcher::builder()
            .endpoint("http://example.invalid:1")
            .exchange_timeout(Duration::from_millis(250))
            .user_agent("test")
            .registry(Arc::clone(&registry))
            .transport(Silent)
            .build()
            .unwrap();

        assert_eq!(dispatcher.config().endpoint, "http://example.invalid:1");
        assert_eq!(dispatcher.config().exchange_timeout, Duration::from_millis(250));
        assert!(Arc::ptr_eq(dispatcher.registry(), &registry));
        assert!(dispatcher.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_command_without_response_yields_null() {
        let dispatcher = Dispatcher::new(Silent);
        let value = dispatcher
            .invoke("rpc", "load_protocols", Some(json!({ "protocol_ids": [] })))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_null_payload_is_absent() {
        let dispatcher = Dispatcher::new(Silent);
        let value = dispatcher
            .invoke("rpc", "list_nodes", Some(Value::Null))
            .await
            .unwrap();
        assert_eq!(value, json!({ "node_ids": [] }));
    }

    #[test]
    fn test_bundles_from_skips_bad_entries() {
        let b64 = |s: &str| encode_base64(s.as_bytes());
        let value = json!({
            "protocols": [
                {
                    "protocol_id": b64("chat"),
                    "file_names": [b64("chat.proto"), b64("config")],
                    "files": [b64("message A {}"), b64("{}")]
                },
                {
                    "protocol_id": b64("binary"),
                    "file_names": [b64("x.proto")],
                    "files": [encode_base64(&[0xff, 0xfe])]
                },
                {
                    "protocol_id": b64("uneven"),
                    "file_names": [b64("a"), b64("b")],
                    "files": [b64("a")]
                }
            ]
        });
        let bundles = bundles_from(&value);
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].id, "chat");
        assert_eq!(bundles[0].files[1], ("config".to_string(), "{}".to_string()));
    }

    #[test]
    fn test_error_mapping_keeps_kind() {
        let e = as_decoding(DynwireError::UnknownType("X".into()));
        assert!(matches!(e, DynwireError::Decoding(msg) if msg.contains("X")));
        let e = as_encoding(DynwireError::Encoding("kept".into()));
        assert!(matches!(e, DynwireError::Encoding(msg) if msg == "kept"));
    }
}
