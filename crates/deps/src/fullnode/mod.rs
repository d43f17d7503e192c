//! Client for the chain full node the provider talks to.

mod types;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, NodeVersion};

const RPC_PATH: &str = "/rpc/v1";

#[derive(Debug, Error)]
pub enum FullNodeError {
    #[error("no chain api endpoints configured")]
    NoEndpoints,
    #[error("invalid chain api info `{0}`")]
    InvalidApiInfo(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("no chain api endpoint reachable: {0}")]
    Unreachable(String),
    #[error("full node client is closed")]
    Closed,
}

impl From<reqwest::Error> for FullNodeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// One parsed chain api entry: `TOKEN:/ip4/<host>/tcp/<port>/http` or a
/// plain URL.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiInfo {
    pub token: Option<String>,
    pub endpoint: String,
}

impl std::fmt::Debug for ApiInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiInfo")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiInfo {
    pub fn parse(raw: &str) -> Result<Self, FullNodeError> {
        let raw = raw.trim();
        let invalid = || FullNodeError::InvalidApiInfo(raw.to_string());

        if let Some((scheme, rest)) = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .find_map(|scheme| raw.strip_prefix(scheme).map(|rest| (*scheme, rest)))
        {
            if rest.is_empty() {
                return Err(invalid());
            }
            let scheme = match scheme {
                "ws://" => "http://",
                "wss://" => "https://",
                other => other,
            };
            let endpoint = if rest.contains('/') {
                format!("{scheme}{rest}")
            } else {
                format!("{scheme}{rest}{RPC_PATH}")
            };
            return Ok(Self {
                token: None,
                endpoint,
            });
        }

        let (token, addr) = if raw.starts_with('/') {
            (None, raw.to_string())
        } else {
            match raw.split_once(":/") {
                Some((token, addr)) => (Some(token.to_string()), format!("/{addr}")),
                None => return Err(invalid()),
            }
        };
        let token = token.filter(|t| !t.is_empty());

        let parts: Vec<&str> = addr.split('/').skip(1).collect();
        let (host, port, proto) = match parts.as_slice() {
            [family, host, "tcp", port, rest @ ..] if rest.len() <= 1 => {
                let host = match *family {
                    "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
                    "ip6" => format!("[{host}]"),
                    _ => return Err(invalid()),
                };
                let port: u16 = port.parse().map_err(|_| invalid())?;
                (host, port, rest.first().copied().unwrap_or("http"))
            }
            _ => return Err(invalid()),
        };
        let scheme = match proto {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            _ => return Err(invalid()),
        };

        Ok(Self {
            token,
            endpoint: format!("{scheme}://{host}:{port}{RPC_PATH}"),
        })
    }
}

#[async_trait]
pub trait FullNodeApi: Send + Sync {
    async fn version(&self) -> Result<NodeVersion, FullNodeError>;
    fn close(&self) -> Result<(), FullNodeError>;
}

pub type SharedFullNode = Arc<dyn FullNodeApi>;

/// Releases a full node client. Run once, on shutdown.
pub type Closer = Box<dyn FnOnce() -> Result<(), String> + Send>;

#[async_trait]
pub trait FullNodeConnector: Send + Sync {
    async fn connect(&self, api_info: &[String]) -> Result<(SharedFullNode, Closer), FullNodeError>;
}

pub struct RpcFullNode {
    http: reqwest::Client,
    info: ApiInfo,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl RpcFullNode {
    /// Full nodes are dialed directly; proxy variables are ignored.
    pub fn new(info: ApiInfo) -> Result<Self, FullNodeError> {
        let http = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            http,
            info,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.info.endpoint
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, FullNodeError>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FullNodeError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = self
            .http
            .post(&self.info.endpoint)
            .json(&JsonRpcRequest::new(id, method, params));
        if let Some(token) = &self.info.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| FullNodeError::Rpc(err.to_string()))?;
            request = request.header(AUTHORIZATION, value);
        }

        let response: JsonRpcResponse<R> = request.send().await?.error_for_status()?.json().await?;
        if let Some(err) = response.error {
            return Err(FullNodeError::Rpc(format!("{} (code {})", err.message, err.code)));
        }
        response
            .result
            .ok_or_else(|| FullNodeError::Rpc(format!("{method} returned no result")))
    }
}

#[async_trait]
impl FullNodeApi for RpcFullNode {
    async fn version(&self) -> Result<NodeVersion, FullNodeError> {
        self.call("Filecoin.Version", Vec::<()>::new()).await
    }

    fn close(&self) -> Result<(), FullNodeError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(FullNodeError::Closed);
        }
        debug!(endpoint = %self.info.endpoint, "full node client closed");
        Ok(())
    }
}

/// Connects over JSON-RPC, taking the first endpoint that answers
/// `Filecoin.Version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcFullNodeConnector;

#[async_trait]
impl FullNodeConnector for RpcFullNodeConnector {
    async fn connect(&self, api_info: &[String]) -> Result<(SharedFullNode, Closer), FullNodeError> {
        if api_info.is_empty() {
            return Err(FullNodeError::NoEndpoints);
        }

        let mut last_err = None;
        for raw in api_info {
            let info = ApiInfo::parse(raw)?;
            let node = Arc::new(RpcFullNode::new(info)?);
            match node.version().await {
                Ok(version) => {
                    info!(endpoint = %node.endpoint(), version = %version.version, "connected to full node");
                    let handle = node.clone();
                    let closer: Closer = Box::new(move || handle.close().map_err(|err| err.to_string()));
                    return Ok((node as SharedFullNode, closer));
                }
                Err(err) => {
                    warn!(endpoint = %node.endpoint(), %err, "full node endpoint not responding");
                    last_err = Some(err);
                }
            }
        }

        Err(FullNodeError::Unreachable(
            last_err.map(|err| err.to_string()).unwrap_or_default(),
        ))
    }
}
