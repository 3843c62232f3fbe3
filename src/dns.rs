//! DNS protocol implementation.
//!
//! This module decodes inbound queries and encodes the address answers sent
//! back, and also covers the small amount of client-side codec needed to talk
//! to an upstream resolver (PTR/SOA queries and their responses).

use std::net::Ipv4Addr;

use crate::errors::DecodeError;
use crate::utils::{encode_labels, read_labels, read_name, Label};

pub const TYPE_A: u16 = 1;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const CLASS_IN: u16 = 1;

/// Length of the fixed message header.
pub const HEADER_LEN: usize = 12;

pub const FLAG_QR: u16 = 1 << 15;
pub const FLAG_AA: u16 = 1 << 10;
pub const FLAG_TC: u16 = 1 << 9;
pub const FLAG_RD: u16 = 1 << 8;
pub const MASK_OPCODE: u16 = 0x7800;
pub const MASK_RCODE: u16 = 0x000F;

/// Question types this server distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    A,
    Ptr,
    Soa,
    /// Any other type, kept so the question can be echoed verbatim.
    Other(u16),
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            TYPE_A => QueryType::A,
            TYPE_PTR => QueryType::Ptr,
            TYPE_SOA => QueryType::Soa,
            other => QueryType::Other(other),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::A => TYPE_A,
            QueryType::Ptr => TYPE_PTR,
            QueryType::Soa => TYPE_SOA,
            QueryType::Other(other) => other,
        }
    }
}

/// Response codes used in answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    NoError = 0,
    NxDomain = 3,
    NotImp = 4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Labels exactly as received, case and all.
    pub name: Vec<Label>,
    pub qtype: QueryType,
    pub qclass: u16,
}

/// A decoded inbound query. Only the first question is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub id: u16,
    pub flags: u16,
    pub question: Question,
}

impl Query {
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags & MASK_OPCODE) >> 11) as u8
    }

    pub fn recursion_desired(&self) -> bool {
        self.flags & FLAG_RD != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub name: Vec<Label>,
    pub ttl: u32,
    pub ip: Ipv4Addr,
}

/// An outbound answer. Zero records means a name-error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub id: u16,
    pub recursion_desired: bool,
    pub rcode: ResponseCode,
    pub question: Question,
    pub records: Vec<AddressRecord>,
}

impl Answer {
    /// Build the answer to `query`; the response code follows from whether
    /// any records are present.
    pub fn new(query: &Query, records: Vec<AddressRecord>) -> Self {
        let rcode = if records.is_empty() {
            ResponseCode::NxDomain
        } else {
            ResponseCode::NoError
        };
        Self {
            id: query.id,
            recursion_desired: query.recursion_desired(),
            rcode,
            question: query.question.clone(),
            records,
        }
    }

    /// A record-less answer carrying an explicit response code.
    pub fn with_rcode(query: &Query, rcode: ResponseCode) -> Self {
        Self {
            rcode,
            ..Self::new(query, Vec::new())
        }
    }

    /// Encode the answer in wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = FLAG_QR | FLAG_AA | self.rcode as u16;
        if self.recursion_desired {
            flags |= FLAG_RD;
        }

        let mut out = Vec::with_capacity(512);
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&flags.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(self.records.len() as u16).to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]); // NSCOUNT, ARCOUNT

        encode_labels(&self.question.name, &mut out);
        out.extend_from_slice(&u16::from(self.question.qtype).to_be_bytes());
        out.extend_from_slice(&self.question.qclass.to_be_bytes());

        for record in &self.records {
            encode_labels(&record.name, &mut out);
            out.extend_from_slice(&TYPE_A.to_be_bytes());
            out.extend_from_slice(&CLASS_IN.to_be_bytes());
            out.extend_from_slice(&record.ttl.to_be_bytes());
            out.extend_from_slice(&4u16.to_be_bytes());
            out.extend_from_slice(&record.ip.octets());
        }
        out
    }
}

fn be_u16(data: &[u8], pos: usize) -> Result<u16, DecodeError> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DecodeError::Truncated)
}

fn be_u32(data: &[u8], pos: usize) -> Result<u32, DecodeError> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(DecodeError::Truncated)
}

/// Decode an inbound query datagram.
///
/// Only the header and the first question are read. Anything after it is
/// ignored without validation.
///
/// # Arguments
/// * `data` - The raw datagram.
///
/// # Returns
/// The decoded `Query` or the reason it could not be decoded.
pub fn decode_query(data: &[u8]) -> Result<Query, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated);
    }
    let id = be_u16(data, 0)?;
    let flags = be_u16(data, 2)?;
    if be_u16(data, 4)? == 0 {
        return Err(DecodeError::NoQuestion);
    }

    let (name, pos) = read_labels(data, HEADER_LEN)?;
    let qtype = be_u16(data, pos)?;
    let qclass = be_u16(data, pos + 2)?;

    Ok(Query {
        id,
        flags,
        question: Question {
            name,
            qtype: qtype.into(),
            qclass,
        },
    })
}

/// Build a recursive query for `name`, as sent to an upstream resolver.
pub fn encode_query<S: AsRef<[u8]>>(id: u16, name: &[S], qtype: QueryType) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&id.to_be_bytes());
    out.extend_from_slice(&FLAG_RD.to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    encode_labels(name, &mut out);
    out.extend_from_slice(&u16::from(qtype).to_be_bytes());
    out.extend_from_slice(&CLASS_IN.to_be_bytes());
    out
}

/// The parts of a resource record the match engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Ptr(String),
    Soa { mname: String, rname: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: u16,
    pub ttl: u32,
    pub data: RecordData,
}

/// A decoded upstream response. The additional section is not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: u16,
    pub flags: u16,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
}

impl Response {
    pub fn is_response(&self) -> bool {
        self.flags & FLAG_QR != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TC != 0
    }

    /// All records from the answer and authority sections.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.answers.iter().chain(self.authorities.iter())
    }
}

fn decode_records(data: &[u8], mut pos: usize, count: u16) -> Result<(Vec<Record>, usize), DecodeError> {
    // counts come from the peer; grow as records actually parse
    let mut records = Vec::new();
    for _ in 0..count {
        let (name, after_name) = read_name(data, pos)?;
        let rtype = be_u16(data, after_name)?;
        let ttl = be_u32(data, after_name + 4)?;
        let rd_len = be_u16(data, after_name + 8)? as usize;
        let rdata_start = after_name + 10;
        let rdata_end = rdata_start + rd_len;
        if rdata_end > data.len() {
            return Err(DecodeError::Truncated);
        }

        let record_data = match rtype {
            TYPE_PTR => RecordData::Ptr(read_name(data, rdata_start)?.0),
            TYPE_SOA => {
                let (mname, after_mname) = read_name(data, rdata_start)?;
                let (rname, _) = read_name(data, after_mname)?;
                RecordData::Soa { mname, rname }
            }
            _ => RecordData::Other,
        };

        records.push(Record {
            name,
            rtype,
            ttl,
            data: record_data,
        });
        pos = rdata_end;
    }
    Ok((records, pos))
}

/// Decode a response from an upstream resolver. Names may be compressed.
pub fn decode_response(data: &[u8]) -> Result<Response, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated);
    }
    let id = be_u16(data, 0)?;
    let flags = be_u16(data, 2)?;
    let qd_count = be_u16(data, 4)?;
    let an_count = be_u16(data, 6)?;
    let ns_count = be_u16(data, 8)?;

    let mut pos = HEADER_LEN;
    for _ in 0..qd_count {
        let (_, after_name) = read_name(data, pos)?;
        pos = after_name + 4;
    }
    if pos > data.len() {
        return Err(DecodeError::Truncated);
    }

    let (answers, pos) = decode_records(data, pos, an_count)?;
    let (authorities, _) = decode_records(data, pos, ns_count)?;

    Ok(Response {
        id,
        flags,
        answers,
        authorities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::split_domain;

    fn query_bytes(id: u16, name: &str, qtype: u16) -> Vec<u8> {
        encode_query(id, &split_domain(name), QueryType::from(qtype))
    }

    #[test]
    fn decodes_a_query() {
        let data = query_bytes(0xBEEF, "192.168.0.1.ip.example.com", TYPE_A);
        let query = decode_query(&data).unwrap();
        assert_eq!(query.id, 0xBEEF);
        assert!(query.recursion_desired());
        assert!(!query.is_response());
        assert_eq!(query.opcode(), 0);
        let expected: Vec<Label> = split_domain("192.168.0.1.ip.example.com")
            .into_iter()
            .map(String::into_bytes)
            .collect();
        assert_eq!(query.question.name, expected);
        assert_eq!(query.question.qtype, QueryType::A);
        assert_eq!(query.question.qclass, CLASS_IN);
    }

    #[test]
    fn maps_question_types() {
        for (raw, expected) in [
            (TYPE_A, QueryType::A),
            (TYPE_PTR, QueryType::Ptr),
            (TYPE_SOA, QueryType::Soa),
            (28, QueryType::Other(28)),
        ] {
            let query = decode_query(&query_bytes(1, "x.example", raw)).unwrap();
            assert_eq!(query.question.qtype, expected);
        }
    }

    #[test]
    fn ignores_trailing_sections() {
        let mut data = query_bytes(7, "a.example", TYPE_A);
        data[11] = 1; // ARCOUNT
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF]); // garbage additional record
        assert!(decode_query(&data).is_ok());
    }

    #[test]
    fn rejects_malformed_queries() {
        assert_eq!(decode_query(&[0; 5]), Err(DecodeError::Truncated));

        let mut no_question = query_bytes(1, "a.example", TYPE_A);
        no_question[5] = 0;
        assert_eq!(decode_query(&no_question), Err(DecodeError::NoQuestion));

        let full = query_bytes(1, "a.example", TYPE_A);
        for cut in HEADER_LEN..full.len() {
            assert!(decode_query(&full[..cut]).is_err(), "cut at {cut}");
        }

        let mut compressed = full[..HEADER_LEN].to_vec();
        compressed.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1]);
        assert_eq!(decode_query(&compressed), Err(DecodeError::CompressionPointer));
    }

    #[test]
    fn round_trip_echoes_id_and_question() {
        let data = query_bytes(0x1234, "MiXeD.Case.Example.com", TYPE_A);
        let query = decode_query(&data).unwrap();
        let answer = Answer::new(
            &query,
            vec![AddressRecord {
                name: query.question.name.clone(),
                ttl: 0,
                ip: Ipv4Addr::new(10, 1, 2, 3),
            }],
        );
        let encoded = answer.encode();

        assert_eq!(&encoded[0..2], &data[0..2]);
        // question section echoed byte for byte
        let question = &data[HEADER_LEN..];
        assert_eq!(&encoded[HEADER_LEN..HEADER_LEN + question.len()], question);

        let reparsed = decode_query(&encoded).unwrap();
        assert_eq!(reparsed.id, query.id);
        assert_eq!(reparsed.question, query.question);
        assert!(reparsed.is_response());
    }

    #[test]
    fn echoes_non_utf8_labels() {
        let name: Vec<Label> = vec![vec![0xFF, 0xFE], b"Ip".to_vec(), b"example".to_vec()];
        let data = encode_query(0x0102, &name, QueryType::A);
        let query = decode_query(&data).unwrap();
        assert_eq!(query.question.name, name);

        let encoded = Answer::new(&query, Vec::new()).encode();
        assert_eq!(&encoded[HEADER_LEN..], &data[HEADER_LEN..]);
    }

    #[test]
    fn encodes_address_record() {
        let query = decode_query(&query_bytes(9, "a.b", TYPE_A)).unwrap();
        let encoded = Answer::new(
            &query,
            vec![AddressRecord {
                name: query.question.name.clone(),
                ttl: 0,
                ip: Ipv4Addr::new(192, 168, 0, 1),
            }],
        )
        .encode();

        let flags = u16::from_be_bytes([encoded[2], encoded[3]]);
        assert_eq!(flags & FLAG_QR, FLAG_QR);
        assert_eq!(flags & FLAG_AA, FLAG_AA);
        assert_eq!(flags & MASK_RCODE, ResponseCode::NoError as u16);
        assert_eq!(&encoded[4..12], &[0, 1, 0, 1, 0, 0, 0, 0]);

        let question_end = HEADER_LEN + 5 + 4; // "\x01a\x01b\x00" + type/class
        let rr = &encoded[question_end..];
        assert_eq!(
            rr,
            &[1, b'a', 1, b'b', 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 4, 192, 168, 0, 1]
        );
    }

    #[test]
    fn empty_answer_is_nxdomain() {
        let query = decode_query(&query_bytes(9, "a.b", 28)).unwrap();
        let encoded = Answer::new(&query, Vec::new()).encode();
        let flags = u16::from_be_bytes([encoded[2], encoded[3]]);
        assert_eq!(flags & MASK_RCODE, ResponseCode::NxDomain as u16);
        assert_eq!(&encoded[6..8], &[0, 0]);
        assert_eq!(encoded.len(), HEADER_LEN + 5 + 4);
    }

    #[test]
    fn decodes_compressed_upstream_response() {
        let name = split_domain("1.2.0.192.in-addr.arpa");
        let mut data = encode_query(0x4242, &name, QueryType::Ptr);
        data[2] |= 0x80; // QR
        data[7] = 1; // ANCOUNT
        data[9] = 1; // NSCOUNT

        // answer: PTR pointing at "host.example"
        data.extend_from_slice(&[0xC0, 0x0C]);
        data.extend_from_slice(&[0, 12, 0, 1, 0, 0, 0x0E, 0x10]);
        let mut ptr = Vec::new();
        encode_labels(&["host", "example"], &mut ptr);
        data.extend_from_slice(&(ptr.len() as u16).to_be_bytes());
        let ptr_offset = data.len();
        data.extend_from_slice(&ptr);

        // authority: SOA whose mname reuses "example" from the PTR target
        data.extend_from_slice(&[0xC0, 0x0C]);
        data.extend_from_slice(&[0, 6, 0, 1, 0, 0, 0, 60]);
        let mut soa = vec![2, b'n', b's', 0xC0, (ptr_offset + 5) as u8];
        encode_labels(&["admin", "example"], &mut soa);
        soa.extend_from_slice(&[0; 20]);
        data.extend_from_slice(&(soa.len() as u16).to_be_bytes());
        data.extend_from_slice(&soa);

        let response = decode_response(&data).unwrap();
        assert_eq!(response.id, 0x4242);
        assert!(response.is_response());
        assert_eq!(response.answers[0].data, RecordData::Ptr("host.example".into()));
        assert_eq!(response.answers[0].name, "1.2.0.192.in-addr.arpa");
        assert_eq!(
            response.authorities[0].data,
            RecordData::Soa {
                mname: "ns.example".into(),
                rname: "admin.example".into()
            }
        );
        assert_eq!(response.records().count(), 2);
    }

    #[test]
    fn rejects_truncated_upstream_rdata() {
        let mut data = encode_query(1, &split_domain("x.arpa"), QueryType::Ptr);
        data[7] = 1;
        data.extend_from_slice(&[0xC0, 0x0C, 0, 12, 0, 1, 0, 0, 0, 0, 0, 40, 1]);
        assert_eq!(decode_response(&data), Err(DecodeError::Truncated));
    }

    #[test]
    fn oversized_record_counts_fail_cleanly() {
        let mut data = encode_query(1, &split_domain("x.arpa"), QueryType::Ptr);
        data[2] |= 0x80;
        data[6] = 0xFF; // ANCOUNT 65535 with nothing behind it
        data[7] = 0xFF;
        data[8] = 0xFF;
        data[9] = 0xFF;
        assert_eq!(decode_response(&data), Err(DecodeError::Truncated));
    }
}
