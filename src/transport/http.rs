//! HTTP transport.
//!
//! The request is POSTed as `{"method": ..., "msg": <base64>}`; the
//! response body is the base64 text of the response bytes.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{BoxFuture, Transport, WireRequest};
use crate::codec::{decode_base64, encode_base64};
use crate::error::{DynwireError, Result};

/// Default control endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:33777";

/// Extra time the HTTP client waits past the exchange timeout, so an
/// overdue exchange is reported by the dispatcher as a timeout.
pub const REQUEST_TIMEOUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct HttpBody<'a> {
    method: &'a str,
    msg: String,
}

/// [`Transport`] over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `endpoint`.
    ///
    /// `exchange_timeout` is the dispatcher's bound. Each HTTP request is
    /// given [`REQUEST_TIMEOUT_GRACE`] more than that.
    pub fn new(
        endpoint: impl Into<String>,
        exchange_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let request_timeout = exchange_timeout.saturating_add(REQUEST_TIMEOUT_GRACE);
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DynwireError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            request_timeout,
        })
    }

    /// Timeout applied to each HTTP request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Endpoint requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn exchange(&self, request: WireRequest) -> BoxFuture<'static, Result<Bytes>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        Box::pin(async move {
            let body = HttpBody {
                method: &request.method,
                msg: if request.msg.is_empty() {
                    String::new()
                } else {
                    encode_base64(&request.msg)
                },
            };
            debug!(method = %request.method, bytes = request.msg.len(), "POST {}", endpoint);

            let response = client.post(&endpoint).json(&body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(DynwireError::Transport(format!(
                    "{} returned {status}: {text}",
                    request.method
                )));
            }

            let text = response.text().await?;
            let bytes = decode_base64(&text).ok_or_else(|| {
                DynwireError::Decoding(format!("{}: response body is not base64", request.method))
            })?;
            Ok(Bytes::from(bytes))
        })
    }
}
