//! Targeted switcheroo: choose an answer from the requester's reverse DNS.
//!
//! For every query the PTR and SOA records of the requester's `in-addr.arpa`
//! name are fetched from an upstream resolver. The PTR target and the SOA
//! MNAME/RNAME become match candidates, and the first mapping (in
//! configuration order) whose substring occurs in any candidate decides the
//! answer. Without a match the fallback address is used.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use log::{debug, warn};

use crate::dns::{QueryType, RecordData};
use crate::errors::DnsError;
use crate::upstream::Upstream;
use crate::utils::reverse_zone_name;

/// A substring and the address returned when it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub pattern: String,
    pub target: Ipv4Addr,
}

impl FromStr for MappingEntry {
    type Err = DnsError;

    /// Parse `SUBSTRING,IPV4`. The substring itself may contain commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pattern, ip) = s
            .rsplit_once(',')
            .ok_or_else(|| DnsError::Config(format!("ip mapping {s:?} is not SUBSTRING,IP")))?;
        if pattern.is_empty() {
            return Err(DnsError::Config(format!("ip mapping {s:?} has an empty substring")));
        }
        Ok(Self {
            pattern: pattern.to_owned(),
            target: ip.trim().parse()?,
        })
    }
}

impl fmt::Display for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.pattern, self.target)
    }
}

/// Mappings in match precedence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable(Vec<MappingEntry>);

impl MappingTable {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.0
    }

    /// First entry whose pattern occurs literally in any candidate.
    pub fn select<S: AsRef<str>>(&self, candidates: &[S]) -> Option<&MappingEntry> {
        self.0.iter().find(|entry| {
            candidates
                .iter()
                .any(|candidate| candidate.as_ref().contains(entry.pattern.as_str()))
        })
    }
}

/// Result of one upstream lookup stage.
#[derive(Debug)]
pub enum Stage<T> {
    Found(T),
    Failed(DnsError),
}

impl<T> Stage<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Stage::Found(value) => Some(value),
            Stage::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoaNames {
    pub mname: String,
    pub rname: String,
}

/// Reverse-zone metadata for one requester.
#[derive(Debug)]
pub struct ReverseMetadata {
    pub ptr: Stage<Vec<String>>,
    pub soa: Stage<Vec<SoaNames>>,
}

impl ReverseMetadata {
    /// Strings the mapping table is matched against.
    pub fn candidates(&self) -> Vec<String> {
        let mut candidates: Vec<String> = self.ptr.found().cloned().unwrap_or_default();
        for soa in self.soa.found().into_iter().flatten() {
            candidates.push(soa.mname.clone());
            candidates.push(soa.rname.clone());
        }
        candidates
    }
}

/// How an answer was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Matched(MappingEntry),
    Fallback(Ipv4Addr),
}

impl Resolution {
    pub fn ip(&self) -> Ipv4Addr {
        match self {
            Resolution::Matched(entry) => entry.target,
            Resolution::Fallback(ip) => *ip,
        }
    }
}

/// Match engine for the targeted switcheroo strategy.
#[derive(Debug, Clone)]
pub struct TargetedSwitcheroo {
    pub table: MappingTable,
    pub fallback: Ipv4Addr,
    pub upstream: Upstream,
}

impl TargetedSwitcheroo {
    pub fn new(table: MappingTable, fallback: Ipv4Addr, upstream: Upstream) -> Self {
        Self {
            table,
            fallback,
            upstream,
        }
    }

    /// Fetch PTR and SOA data for `source`, one after the other.
    ///
    /// A failing stage is recorded, never propagated.
    pub async fn lookup(&self, source: Ipv4Addr) -> ReverseMetadata {
        let name = reverse_zone_name(source);

        let ptr = match self.upstream.query(&name, QueryType::Ptr).await {
            Ok(response) => Stage::Found(
                response
                    .answers
                    .into_iter()
                    .filter_map(|record| match record.data {
                        RecordData::Ptr(target) => Some(target),
                        _ => None,
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("PTR lookup for {} failed: {}", source, e);
                Stage::Failed(e)
            }
        };

        let soa = match self.upstream.query(&name, QueryType::Soa).await {
            Ok(response) => Stage::Found(
                response
                    .records()
                    .filter_map(|record| match &record.data {
                        RecordData::Soa { mname, rname } => Some(SoaNames {
                            mname: mname.clone(),
                            rname: rname.clone(),
                        }),
                        _ => None,
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("SOA lookup for {} failed: {}", source, e);
                Stage::Failed(e)
            }
        };

        ReverseMetadata { ptr, soa }
    }

    /// Pick the answer for already fetched metadata.
    pub fn evaluate(&self, metadata: &ReverseMetadata) -> Resolution {
        let candidates = metadata.candidates();
        debug!("Match candidates: {:?}", candidates);
        match self.table.select(candidates.as_slice()) {
            Some(entry) => Resolution::Matched(entry.clone()),
            None => Resolution::Fallback(self.fallback),
        }
    }

    /// Choose the address to answer `source` with.
    pub async fn resolve(&self, source: Ipv4Addr) -> Ipv4Addr {
        let metadata = self.lookup(source).await;
        let resolution = self.evaluate(&metadata);
        match &resolution {
            Resolution::Matched(entry) => debug!("{} matched {:?} -> {}", source, entry.pattern, entry.target),
            Resolution::Fallback(ip) => debug!("{} matched nothing, falling back to {}", source, ip),
        }
        resolution.ip()
    }
}
