//! Request handling for the DNS responders.
//!
//! `Responder` turns one inbound datagram into at most one outbound datagram
//! using the configured strategy. `serve_udp` runs it over a socket, handling
//! one datagram at a time.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use log::{debug, error, info, warn};
use tokio::net::UdpSocket;

use crate::arbitrary_ip::HostnameDecoder;
use crate::config::{ServerConfig, StrategyConfig};
use crate::dns::{decode_query, AddressRecord, Answer, Query, QueryType, ResponseCode, CLASS_IN};
use crate::errors::DnsError;
use crate::switcheroo::AssignmentStore;
use crate::targeted::TargetedSwitcheroo;
use crate::utils::{join_labels, strip_base_domain};

/// Bytes of a rejected datagram shown in debug logs.
const HEX_PREVIEW_LEN: usize = 32;

/// The resolution strategy and whatever state it carries.
#[derive(Debug)]
pub enum Strategy {
    ArbitraryIp(HostnameDecoder),
    Switcheroo(AssignmentStore),
    TargetedSwitcheroo(TargetedSwitcheroo),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::ArbitraryIp(_) => "arbitrary-ip",
            Strategy::Switcheroo(_) => "switcheroo",
            Strategy::TargetedSwitcheroo(_) => "targeted-switcheroo",
        }
    }
}

impl From<StrategyConfig> for Strategy {
    fn from(config: StrategyConfig) -> Self {
        match config {
            StrategyConfig::ArbitraryIp { reverse } => Strategy::ArbitraryIp(HostnameDecoder::new(reverse)),
            StrategyConfig::Switcheroo { ips } => Strategy::Switcheroo(AssignmentStore::new(ips)),
            StrategyConfig::TargetedSwitcheroo {
                mappings,
                fallback,
                upstream,
            } => Strategy::TargetedSwitcheroo(TargetedSwitcheroo::new(mappings, fallback, upstream)),
        }
    }
}

/// Owns all per-process state needed to answer queries.
///
/// Answering takes `&mut self`; callers that want to serve datagrams
/// concurrently must wrap the responder in a lock.
#[derive(Debug)]
pub struct Responder {
    base_domain: Vec<String>,
    ttl: u32,
    strategy: Strategy,
}

impl Responder {
    pub fn new(base_domain: Vec<String>, ttl: u32, strategy: Strategy) -> Self {
        Self {
            base_domain,
            ttl,
            strategy,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.base_domain.clone(), config.ttl, config.strategy.clone().into())
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Answer one datagram.
    ///
    /// # Arguments
    /// * `datagram` - The raw query.
    /// * `source` - Address of the sender.
    ///
    /// # Returns
    /// The encoded response, or `None` if the datagram should be dropped.
    pub async fn respond(&mut self, datagram: &[u8], source: Ipv4Addr) -> Option<Vec<u8>> {
        let query = match decode_query(datagram) {
            Ok(query) => query,
            Err(e) => {
                let preview = &datagram[..datagram.len().min(HEX_PREVIEW_LEN)];
                debug!("Dropping malformed datagram from {}: {} ({})", source, e, hex::encode(preview));
                return None;
            }
        };
        if query.is_response() {
            debug!("Dropping response datagram from {}", source);
            return None;
        }
        if query.opcode() != 0 {
            debug!("Opcode {} from {} not implemented", query.opcode(), source);
            return Some(Answer::with_rcode(&query, ResponseCode::NotImp).encode());
        }

        let records = match self.resolve(&query, source).await {
            Some(ip) => {
                info!("{} asked for {}, answering {}", source, join_labels(&query.question.name), ip);
                vec![AddressRecord {
                    name: query.question.name.clone(),
                    ttl: self.ttl,
                    ip,
                }]
            }
            None => Vec::new(),
        };
        Some(Answer::new(&query, records).encode())
    }

    async fn resolve(&mut self, query: &Query, source: Ipv4Addr) -> Option<Ipv4Addr> {
        let question = &query.question;
        if question.qtype != QueryType::A || question.qclass != CLASS_IN {
            debug!("Question is not A/IN ({:?}), skipping", question.qtype);
            return None;
        }
        let Some(subject) = strip_base_domain(&question.name, &self.base_domain) else {
            debug!("{} is not under the base domain, skipping", join_labels(&question.name));
            return None;
        };

        match &mut self.strategy {
            Strategy::ArbitraryIp(decoder) => {
                let ip = decoder.decode(&subject);
                if ip.is_none() {
                    debug!("Could not decode an address from {:?}", join_labels(&subject));
                }
                ip
            }
            Strategy::Switcheroo(store) => {
                if subject.is_empty() {
                    debug!("Query for the bare base domain, skipping");
                    return None;
                }
                Some(store.assign(&subject, source))
            }
            Strategy::TargetedSwitcheroo(engine) => Some(engine.resolve(source).await),
        }
    }
}

/// IPv4 address of a sender, unwrapping v4-mapped IPv6.
pub fn source_ipv4(addr: SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}

/// Run the UDP DNS server.
///
/// # Arguments
/// * `config` - The server configuration.
///
/// # Returns
/// Only returns on a bind failure.
pub async fn run_udp_server(config: ServerConfig) -> Result<(), DnsError> {
    let socket = UdpSocket::bind(config.bind_addr).await?;
    let responder = Responder::from_config(&config);
    info!(
        "UDP DNS server ({}) listening on {} for {}",
        responder.strategy().name(),
        config.bind_addr,
        join_labels(&config.base_domain)
    );
    serve_udp(socket, responder, config.max_packet_size).await
}

/// Serve datagrams from `socket` until the task is dropped.
///
/// Each datagram is fully answered, upstream lookups included, before the
/// next one is read.
pub async fn serve_udp(socket: UdpSocket, mut responder: Responder, max_packet_size: usize) -> Result<(), DnsError> {
    let mut buf = vec![0u8; max_packet_size];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("UDP receive error: {}", e);
                continue;
            }
        };
        let Some(source) = source_ipv4(src) else {
            debug!("Ignoring non-IPv4 sender {}", src);
            continue;
        };

        if let Some(response) = responder.respond(&buf[..len], source).await {
            if let Err(e) = socket.send_to(&response, src).await {
                warn!("Failed to send response to {}: {}", src, e);
            }
        }
    }
}
