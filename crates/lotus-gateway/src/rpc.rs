//! JSON-RPC 2.0 over HTTP.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{GatewayError, Result};

static RPC_ID: AtomicU64 = AtomicU64::new(1);

const RPC_PATH: &str = "/rpc/v0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for a single call. Calls that block on the chain
/// (`StateWaitMsg`) pass their own bound through [`JsonRpcClient::request_with_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate may have installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Normalize an API endpoint into an HTTP URL ending in `/rpc/v0`.
///
/// Accepts `host:port`, `http(s)://` and `ws(s)://` URLs, and the multiaddr
/// form the node writes into its `api` file (`/ip4/127.0.0.1/tcp/2345/http`).
pub fn endpoint_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(GatewayError::InvalidEndpoint("empty endpoint".to_string()));
    }

    let base = if endpoint.starts_with('/') {
        multiaddr_to_url(endpoint)?
    } else if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    let mut url = url::Url::parse(&base)
        .map_err(|e| GatewayError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if url.host_str().is_none() {
        return Err(GatewayError::InvalidEndpoint(format!("{endpoint}: missing host")));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(RPC_PATH);
    }
    Ok(url.to_string())
}

fn multiaddr_to_url(addr: &str) -> Result<String> {
    let parts: Vec<&str> = addr.split('/').filter(|p| !p.is_empty()).collect();
    let invalid = || GatewayError::InvalidEndpoint(format!("{addr}: unsupported multiaddr"));

    let (host, rest) = match parts.as_slice() {
        ["ip4" | "dns" | "dns4" | "dns6", host, rest @ ..] => (host.to_string(), rest),
        ["ip6", host, rest @ ..] => (format!("[{host}]"), rest),
        _ => return Err(invalid()),
    };
    let (port, rest) = match rest {
        ["tcp", port, rest @ ..] => (port.parse::<u16>().map_err(|_| invalid())?, rest),
        _ => return Err(invalid()),
    };
    let scheme = match rest {
        [] | ["http"] | ["ws"] => "http",
        ["https"] | ["wss"] => "https",
        _ => return Err(invalid()),
    };
    Ok(format!("{scheme}://{host}:{port}"))
}

/// JSON-RPC client with an optional bearer token.
///
/// The token can be replaced after construction: the storage-miner daemon
/// only writes its token once it has started.
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
    request_timeout: Duration,
}

impl JsonRpcClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        install_rustls_provider();
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            url: endpoint_url(endpoint)?,
            client,
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Replace the per-call timeout used by [`request`](Self::request).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        *self.token.write() = Some(token.trim().to_string());
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = RPC_ID.fetch_add(1, Ordering::Relaxed);
        let payload = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        trace!(method, id, url = %self.url, "JSON-RPC request");

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&payload);
        let token = self.token.read().clone();
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body: JsonRpcResponse<R> = response.json().await?;
        if let Some(error) = body.error {
            return Err(GatewayError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        body.result.ok_or_else(|| GatewayError::MissingResult {
            method: method.to_string(),
        })
    }
}
