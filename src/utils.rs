//! Utility functions for DNS names.
//!
//! This module provides helpers for reading and writing wire-format names
//! and for splitting a queried name into the labels a strategy works on.

use std::net::Ipv4Addr;

use crate::errors::DecodeError;

/// One label of a queried name, kept as the raw octets from the wire.
pub type Label = Vec<u8>;

/// Maximum encoded length of a domain name, terminator included.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum number of labels in a domain name.
pub const MAX_LABELS: usize = 127;

/// Read an uncompressed name starting at `start`.
///
/// # Arguments
/// * `data` - The whole DNS message.
/// * `start` - Offset of the first length byte.
///
/// # Returns
/// The labels in order, byte for byte, and the offset just past the
/// terminating zero.
pub fn read_labels(data: &[u8], start: usize) -> Result<(Vec<Label>, usize), DecodeError> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut name_len = 1; // terminator

    loop {
        let len_byte = *data.get(pos).ok_or(DecodeError::Truncated)?;
        if len_byte == 0 {
            return Ok((labels, pos + 1));
        }
        match len_byte & 0xC0 {
            0x00 => {}
            0xC0 => return Err(DecodeError::CompressionPointer),
            _ => return Err(DecodeError::ReservedLabelType(len_byte)),
        }

        let len = len_byte as usize;
        let body = data
            .get(pos + 1..pos + 1 + len)
            .ok_or(DecodeError::LabelOverrun { offset: pos, len })?;

        if labels.len() == MAX_LABELS {
            return Err(DecodeError::TooManyLabels);
        }
        name_len += 1 + len;
        if name_len > MAX_NAME_LEN {
            return Err(DecodeError::NameTooLong);
        }

        labels.push(body.to_vec());
        pos += 1 + len;
    }
}

/// Read a possibly compressed name starting at `start`.
///
/// Pointers may refer anywhere in `data`; the number of jumps is bounded so a
/// pointer cycle fails instead of looping. Octets that are not UTF-8 come
/// back as U+FFFD.
///
/// # Returns
/// The dotted name (empty for the root) and the offset just past the name as
/// it appears at `start`.
pub fn read_name(data: &[u8], start: usize) -> Result<(String, usize), DecodeError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut end: Option<usize> = None;
    let mut jumps = 0;
    let mut name_len = 1;

    loop {
        let len_byte = *data.get(pos).ok_or(DecodeError::Truncated)?;
        if len_byte == 0 {
            break;
        }
        match len_byte & 0xC0 {
            0x00 => {
                let len = len_byte as usize;
                let body = data
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(DecodeError::LabelOverrun { offset: pos, len })?;
                name_len += 1 + len;
                if name_len > MAX_NAME_LEN {
                    return Err(DecodeError::NameTooLong);
                }
                labels.push(String::from_utf8_lossy(body).into_owned());
                pos += 1 + len;
            }
            0xC0 => {
                let low = *data.get(pos + 1).ok_or(DecodeError::Truncated)?;
                let target = (((len_byte & 0x3F) as usize) << 8) | low as usize;
                end.get_or_insert(pos + 2);
                jumps += 1;
                if jumps > MAX_LABELS || target >= data.len() {
                    return Err(DecodeError::BadPointer(target));
                }
                pos = target;
            }
            _ => return Err(DecodeError::ReservedLabelType(len_byte)),
        }
    }

    Ok((labels.join("."), end.unwrap_or(pos + 1)))
}

/// Encode labels in DNS wire format, without compression.
pub fn encode_labels<S: AsRef<[u8]>>(labels: &[S], out: &mut Vec<u8>) {
    for label in labels {
        let label = label.as_ref();
        out.push(label.len() as u8);
        out.extend_from_slice(label);
    }
    out.push(0);
}

/// Split a dotted domain into labels. A trailing dot is ignored.
pub fn split_domain(domain: &str) -> Vec<String> {
    let domain = domain.trim_end_matches('.');
    if domain.is_empty() {
        return Vec::new();
    }
    domain.split('.').map(str::to_owned).collect()
}

/// Join labels back into a dotted name, for logging.
pub fn join_labels<S: AsRef<[u8]>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|label| String::from_utf8_lossy(label.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Strip the base domain from the end of a queried name.
///
/// The tail of `name` must equal `base` label for label, ignoring ASCII case.
///
/// # Arguments
/// * `name` - Labels of the queried name.
/// * `base` - Labels of the configured base domain.
///
/// # Returns
/// The remaining leading labels, lowercased, or `None` when the name is not
/// under the base domain.
pub fn strip_base_domain(name: &[Label], base: &[String]) -> Option<Vec<Label>> {
    let split = name.len().checked_sub(base.len())?;
    let (subject, tail) = name.split_at(split);
    let matches = tail
        .iter()
        .zip(base)
        .all(|(label, base_label)| label.eq_ignore_ascii_case(base_label.as_bytes()));
    if !matches {
        return None;
    }
    Some(subject.iter().map(|label| label.to_ascii_lowercase()).collect())
}

/// Labels of the `in-addr.arpa` name used for reverse lookups of `ip`.
pub fn reverse_zone_name(ip: Ipv4Addr) -> Vec<String> {
    let mut labels: Vec<String> = ip.octets().iter().rev().map(u8::to_string).collect();
    labels.push("in-addr".to_owned());
    labels.push("arpa".to_owned());
    labels
}
