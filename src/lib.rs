//! DNS Switcheroo Library
//!
//! Minimal authoritative DNS responders for security testing. A target IPv4
//! address is encoded into, or selected for, a subdomain so that filters that
//! only look at IP addresses can be tested. Three strategies share the same
//! wire codec and UDP loop: arbitrary-ip, switcheroo and targeted switcheroo.

pub mod arbitrary_ip;
pub mod config;
pub mod dns;
pub mod errors;
pub mod handlers;
pub mod switcheroo;
pub mod targeted;
pub mod upstream;
pub mod utils;

// Re-export commonly used items
pub use config::ServerConfig;
pub use errors::{DecodeError, DnsError};
pub use handlers::{Responder, Strategy};
