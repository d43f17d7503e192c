use std::net::IpAddr;

use provider_node_domain::storage::{RoutableIpSource, StorageError, StorageResult};
use tokio::net::TcpStream;
use tracing::debug;

use crate::HarmonyStorage;

/// The routable address is the local end of a TCP connection to the database:
/// the interface the OS picks to reach the cluster is the one peers can use.
#[async_trait::async_trait]
impl RoutableIpSource for HarmonyStorage {
    async fn routable_ip(&self) -> StorageResult<IpAddr> {
        if self.route_targets().is_empty() {
            return Err(StorageError::RoutableIp(
                "database handle has no network host to probe".into(),
            ));
        }

        let mut last_err = String::new();
        for (host, port) in self.route_targets() {
            match TcpStream::connect((host.as_str(), *port)).await {
                Ok(stream) => {
                    let local = stream
                        .local_addr()
                        .map_err(|err| StorageError::RoutableIp(err.to_string()))?;
                    debug!(host = %host, ip = %local.ip(), "discovered routable ip");
                    return Ok(local.ip());
                }
                Err(err) => last_err = format!("{host}:{port}: {err}"),
            }
        }

        Err(StorageError::RoutableIp(last_err))
    }
}
