//! Turns the configured bind address into one peers can dial.

use std::net::IpAddr;

use provider_node_domain::storage::{RoutableIpSource, StorageError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ListenAddressError {
    #[error("listen address `{0}` has no port")]
    MissingPort(String),
    #[error("listen address `{0}` has an invalid port")]
    InvalidPort(String),
    #[error("cannot resolve routable ip for `{address}`: {source}")]
    RoutableIp {
        address: String,
        #[source]
        source: StorageError,
    },
}

/// Replaces a wildcard host (`0.0.0.0` or `::`) with the routable IP
/// reported by `source`, keeping the port. Other hosts pass through and
/// `source` is not queried.
pub async fn resolve_listen_address<S>(bind: &str, source: &S) -> Result<String, ListenAddressError>
where
    S: RoutableIpSource + ?Sized,
{
    let (host, port) = bind
        .rsplit_once(':')
        .ok_or_else(|| ListenAddressError::MissingPort(bind.to_string()))?;
    if port.is_empty() {
        return Err(ListenAddressError::MissingPort(bind.to_string()));
    }

    let host_ip = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok();
    if !host_ip.is_some_and(|ip| ip.is_unspecified()) {
        return Ok(bind.to_string());
    }
    let port: u16 = port
        .parse()
        .map_err(|_| ListenAddressError::InvalidPort(bind.to_string()))?;

    let ip = source
        .routable_ip()
        .await
        .map_err(|source| ListenAddressError::RoutableIp {
            address: bind.to_string(),
            source,
        })?;
    let resolved = match ip {
        IpAddr::V4(v4) => format!("{v4}:{port}"),
        IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    };
    debug!(bind, %resolved, "resolved wildcard listen address");
    Ok(resolved)
}
