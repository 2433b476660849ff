//! Transport module - moves one encoded envelope and returns the response bytes.
//!
//! - [`Transport`] - the "bytes in, bytes out" boundary the dispatcher calls
//! - [`HttpTransport`] - JSON-over-HTTP instantiation (reqwest)
//!
//! Anything that can carry a [`WireRequest`] and hand back the response
//! bytes can stand in for the HTTP transport, e.g. an in-memory fake in
//! tests.

mod http;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

pub use http::{HttpTransport, DEFAULT_ENDPOINT, REQUEST_TIMEOUT_GRACE};

/// Boxed future returned by transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One outer envelope ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// Control command name (`process_cmd` for non-control protocols).
    pub method: String,
    /// Encoded control-schema payload, empty when there is none.
    pub msg: Bytes,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, msg: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            msg: msg.into(),
        }
    }
}

/// Carries a request to the remote side and resolves with the response bytes.
pub trait Transport: Send + Sync + 'static {
    fn exchange(&self, request: WireRequest) -> BoxFuture<'static, Result<Bytes>>;
}
