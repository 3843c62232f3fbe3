//! Decoding of IPv4 addresses spelled out in subdomain labels.
//!
//! Each of the four labels is one octet. A label is a hyphen separated run of
//! tokens, every token either plain digits or an English digit word, so
//! `one-nine-two.168.zero.1` decodes to `192.168.0.1`.

use std::net::Ipv4Addr;

const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// Longest numeral an octet may spell out, leading zeros included.
const MAX_OCTET_DIGITS: usize = 4;

/// Turns subject labels into an address for the arbitrary-ip strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameDecoder {
    /// Read the octets right to left, as in `1.0.168.192`.
    pub reverse: bool,
}

impl HostnameDecoder {
    pub fn new(reverse: bool) -> Self {
        Self { reverse }
    }

    /// Decode subject labels into an address.
    ///
    /// # Arguments
    /// * `subject` - Labels left after stripping the base domain.
    ///
    /// # Returns
    /// The address, or `None` unless there are exactly four valid octets.
    pub fn decode<S: AsRef<[u8]>>(&self, subject: &[S]) -> Option<Ipv4Addr> {
        let mut octets = [0u8; 4];
        if subject.len() != octets.len() {
            return None;
        }
        for (octet, group) in octets.iter_mut().zip(subject) {
            *octet = decode_octet(group.as_ref())?;
        }
        if self.reverse {
            octets.reverse();
        }
        Some(Ipv4Addr::from(octets))
    }
}

/// Decode a single hyphen separated group into an octet.
///
/// Groups are raw label octets; anything outside ASCII digits and digit
/// words rejects the group.
pub fn decode_octet(group: &[u8]) -> Option<u8> {
    let mut digits = Vec::with_capacity(MAX_OCTET_DIGITS);
    for token in group.split(|&b| b == b'-') {
        push_token_digits(token, &mut digits)?;
        if digits.len() > MAX_OCTET_DIGITS {
            return None;
        }
    }
    if digits.is_empty() {
        return None;
    }
    let value = digits.iter().fold(0u16, |acc, &d| acc * 10 + u16::from(d));
    u8::try_from(value).ok()
}

fn push_token_digits(token: &[u8], digits: &mut Vec<u8>) -> Option<()> {
    if token.is_empty() {
        return None;
    }
    if token.iter().all(u8::is_ascii_digit) {
        digits.extend(token.iter().map(|b| b - b'0'));
        return Some(());
    }
    let digit = DIGIT_WORDS
        .iter()
        .position(|word| word.as_bytes().eq_ignore_ascii_case(token))?;
    digits.push(digit as u8);
    Some(())
}
