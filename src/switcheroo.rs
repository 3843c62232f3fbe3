//! Sticky per-source assignment of addresses from a fixed list.
//!
//! Every subject keeps its own sequence: the first source to ask for it gets
//! the first address, the second source the second one, and so on until the
//! list runs out, after which every new source gets the last address. Once a
//! source has an address for a subject it keeps it for the life of the
//! process.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use log::debug;

use crate::errors::DnsError;
use crate::utils::{join_labels, Label};

/// Ordered, non-empty list of addresses handed out by the switcheroo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpList(Vec<Ipv4Addr>);

impl IpList {
    pub fn new(ips: Vec<Ipv4Addr>) -> Result<Self, DnsError> {
        if ips.is_empty() {
            return Err(DnsError::Config("at least one --ip is required".into()));
        }
        Ok(Self(ips))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Ipv4Addr] {
        &self.0
    }

    fn get(&self, index: usize) -> Ipv4Addr {
        self.0[index.min(self.0.len() - 1)]
    }
}

/// Sources seen for one subject and the index each was given.
#[derive(Debug, Default)]
struct SubjectAssignments {
    by_source: HashMap<Ipv4Addr, usize>,
}

/// Assignment state for the switcheroo strategy.
///
/// Entries are never evicted.
#[derive(Debug)]
pub struct AssignmentStore {
    ips: IpList,
    /// Keyed on the lowercased subject labels, so `a.b` as one label and
    /// `a`,`b` as two stay distinct.
    subjects: HashMap<Vec<Label>, SubjectAssignments>,
}

impl AssignmentStore {
    pub fn new(ips: IpList) -> Self {
        Self {
            ips,
            subjects: HashMap::new(),
        }
    }

    /// Return the address assigned to `source` for `subject`, assigning the
    /// next one in the list on first sight.
    ///
    /// # Arguments
    /// * `subject` - Labels of the subdomain being queried; compared
    ///   case-insensitively.
    /// * `source` - Address of the requester.
    pub fn assign<S: AsRef<[u8]>>(&mut self, subject: &[S], source: Ipv4Addr) -> Ipv4Addr {
        let key = subject_key(subject);
        let last = self.ips.len() - 1;
        let assignments = self.subjects.entry(key).or_default();

        let seen = assignments.by_source.len();
        let index = match assignments.by_source.get(&source) {
            Some(&index) => {
                debug!("{} already holds index {} on subject {:?}", source, index, join_labels(subject));
                index
            }
            None => {
                let index = seen.min(last);
                assignments.by_source.insert(source, index);
                debug!(
                    "{} is source #{} on subject {:?}, assigned index {}",
                    source,
                    seen + 1,
                    join_labels(subject),
                    index
                );
                index
            }
        };
        self.ips.get(index)
    }

    /// Number of sources seen so far for `subject`.
    pub fn sources_seen<S: AsRef<[u8]>>(&self, subject: &[S]) -> usize {
        self.subjects
            .get(&subject_key(subject))
            .map_or(0, |a| a.by_source.len())
    }
}

fn subject_key<S: AsRef<[u8]>>(subject: &[S]) -> Vec<Label> {
    subject.iter().map(|label| label.as_ref().to_ascii_lowercase()).collect()
}
