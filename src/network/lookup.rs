//! One-shot port lookup

use bytes::Bytes;

use super::connection::{Connection, ConnectionResult};
use super::EpmdAddr;
use crate::protocol::{PortLookupRequest, PortLookupResponse};

/// Resolve `node_name` to its registration on the daemon at `host:port`.
///
/// Opens a fresh connection for the single PORT_PLEASE2 exchange and closes
/// it afterwards, whatever the outcome. An unknown name is not an error: it
/// comes back as [`PortLookupResponse::NotFound`].
pub async fn lookup_port(
    node_name: impl Into<Bytes>,
    host: &str,
    port: u16,
) -> ConnectionResult<PortLookupResponse> {
    let addr = EpmdAddr::new(host, port);
    let node_name = node_name.into();

    let mut conn = Connection::open(&addr).await?;
    let result = conn.port_please2(PortLookupRequest::new(node_name.clone())).await;
    conn.close().await;

    match &result {
        Ok(PortLookupResponse::Found(info)) => tracing::debug!(
            "EPMD at {} resolved '{}' to port {}",
            addr,
            String::from_utf8_lossy(&node_name),
            info.port
        ),
        Ok(PortLookupResponse::NotFound { result }) => tracing::debug!(
            "EPMD at {} does not know '{}' (result {})",
            addr,
            String::from_utf8_lossy(&node_name),
            result
        ),
        Err(e) => tracing::debug!("Lookup against {} failed: {}", addr, e),
    }

    result
}

/// [`lookup_port`] against the default daemon address
pub async fn port_please(node_name: impl Into<Bytes>) -> ConnectionResult<PortLookupResponse> {
    let addr = EpmdAddr::default();
    lookup_port(node_name, &addr.host, addr.port).await
}
