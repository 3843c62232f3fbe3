//! Queries against an upstream DNS resolver.
//!
//! Each lookup is one UDP round trip with a fixed timeout and no retry.

use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::dns::{decode_response, encode_query, QueryType, Response};
use crate::errors::DnsError;
use crate::utils::join_labels;

/// Default time to wait for an upstream answer.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(2);

/// Receive buffer size for upstream responses.
pub const MAX_UPSTREAM_PACKET_SIZE: usize = 4096;

/// An upstream resolver reachable over UDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upstream {
    pub addr: SocketAddr,
    pub timeout: Duration,
}

impl Upstream {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Send one query and wait for its response.
    ///
    /// # Arguments
    /// * `name` - Labels of the name to look up.
    /// * `qtype` - Record type to ask for.
    ///
    /// # Returns
    /// The decoded response, or an error on timeout, I/O failure, a malformed
    /// datagram, a reply that does not belong to this query, or a truncated
    /// reply.
    pub async fn query(&self, name: &[String], qtype: QueryType) -> Result<Response, DnsError> {
        let id: u16 = rand::random();
        let request = encode_query(id, name, qtype);

        let bind_addr = if self.addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.addr).await?;
        socket.send(&request).await?;
        debug!("Sent {:?} query for {} to {}", qtype, join_labels(name), self.addr);

        let mut buf = vec![0u8; MAX_UPSTREAM_PACKET_SIZE];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| DnsError::Timeout(self.addr))??;

        let response = decode_response(&buf[..len])?;
        if !response.is_response() || response.id != id {
            return Err(DnsError::Protocol(format!(
                "unexpected reply from {} (id {:#06x}, expected {:#06x})",
                self.addr, response.id, id
            )));
        }
        if response.is_truncated() {
            return Err(DnsError::Protocol(format!("truncated reply from {}", self.addr)));
        }
        Ok(response)
    }
}
