//! Configuration for the DNS responders.
//!
//! Settings come from the command line, with every flag also readable from
//! an environment variable. They are validated once into a `ServerConfig`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::errors::DnsError;
use crate::switcheroo::IpList;
use crate::targeted::{MappingEntry, MappingTable};
use crate::upstream::Upstream;
use crate::utils::split_domain;

/// Default TTL for answers, in seconds. Zero keeps resolvers from caching.
pub const DEFAULT_TTL: u32 = 0;

/// Maximum size of inbound DNS datagrams.
pub const MAX_PACKET_SIZE: usize = 4096;

#[derive(Parser, Debug)]
#[command(name = "dns-switcheroo")]
#[command(about = "DNS responders that encode target IPs into subdomains", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode the queried subdomain itself into an address.
    ArbitraryIp {
        #[command(flatten)]
        common: CommonArgs,

        /// Read octets right to left, so 1.0.168.192.<base> answers 192.168.0.1.
        #[arg(long, env = "DNS_REVERSE")]
        reverse: bool,
    },

    /// Hand out the listed addresses in order, one per new requester.
    Switcheroo {
        #[command(flatten)]
        common: CommonArgs,

        /// Repeatable. The first requester of a subdomain gets the first IP,
        /// the second the second, and so on; the last IP is reused after that.
        #[arg(long = "ip", required = true, env = "DNS_IPS", value_delimiter = ',')]
        ips: Vec<Ipv4Addr>,
    },

    /// Answer based on the requester's reverse DNS (PTR and SOA).
    TargetedSwitcheroo {
        #[command(flatten)]
        common: CommonArgs,

        /// Repeatable, in precedence order: SUBSTRING,IP. Several mappings may
        /// be given in one value separated by ';'.
        #[arg(long = "ip-mapping", env = "DNS_IP_MAPPINGS", value_delimiter = ';')]
        ip_mappings: Vec<String>,

        /// Address returned when no mapping matches.
        #[arg(long, env = "DNS_FALLBACK_IP")]
        fallback_ip: Ipv4Addr,

        /// Resolver used for reverse lookups.
        #[arg(long, default_value = "1.1.1.1", env = "DNS_PUBLIC_SERVER")]
        public_dns_server: IpAddr,

        #[arg(long, default_value_t = 53, env = "DNS_PUBLIC_SERVER_PORT")]
        public_dns_server_port: u16,

        /// Per-query upstream timeout in milliseconds.
        #[arg(long, default_value_t = 2000, env = "DNS_UPSTREAM_TIMEOUT_MS")]
        upstream_timeout_ms: u64,
    },
}

/// Flags shared by every strategy.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Domain the special subdomains live under, e.g. ip.example.com.
    #[arg(long, env = "DNS_BASE_DOMAIN")]
    pub base_domain: String,

    #[arg(long, default_value = "0.0.0.0", env = "DNS_LISTEN_HOST")]
    pub listen_host: IpAddr,

    #[arg(long, default_value_t = 53, env = "DNS_LISTEN_PORT")]
    pub listen_port: u16,

    /// TTL of answers in seconds.
    #[arg(long, default_value_t = DEFAULT_TTL, env = "DNS_TTL")]
    pub ttl: u32,
}

/// Strategy-specific settings.
#[derive(Debug, Clone)]
pub enum StrategyConfig {
    ArbitraryIp { reverse: bool },
    Switcheroo { ips: IpList },
    TargetedSwitcheroo {
        mappings: MappingTable,
        fallback: Ipv4Addr,
        upstream: Upstream,
    },
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the DNS server to.
    pub bind_addr: SocketAddr,

    /// Labels of the base domain, in order.
    pub base_domain: Vec<String>,

    /// TTL put on every answer.
    pub ttl: u32,

    /// Maximum size of inbound datagrams.
    pub max_packet_size: usize,

    pub strategy: StrategyConfig,
}

impl ServerConfig {
    /// Validate parsed command line arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed command line.
    ///
    /// # Returns
    /// A `Result` containing either the `ServerConfig` or a `DnsError`.
    pub fn from_cli(cli: Cli) -> Result<Self, DnsError> {
        let (common, strategy) = match cli.command {
            Command::ArbitraryIp { common, reverse } => (common, StrategyConfig::ArbitraryIp { reverse }),
            Command::Switcheroo { common, ips } => (
                common,
                StrategyConfig::Switcheroo {
                    ips: IpList::new(ips)?,
                },
            ),
            Command::TargetedSwitcheroo {
                common,
                ip_mappings,
                fallback_ip,
                public_dns_server,
                public_dns_server_port,
                upstream_timeout_ms,
            } => {
                let entries = ip_mappings
                    .iter()
                    .map(|m| m.parse::<MappingEntry>())
                    .collect::<Result<Vec<_>, _>>()?;
                let upstream = Upstream::new(
                    SocketAddr::new(public_dns_server, public_dns_server_port),
                    Duration::from_millis(upstream_timeout_ms),
                );
                (
                    common,
                    StrategyConfig::TargetedSwitcheroo {
                        mappings: MappingTable::new(entries),
                        fallback: fallback_ip,
                        upstream,
                    },
                )
            }
        };

        Ok(Self {
            bind_addr: SocketAddr::new(common.listen_host, common.listen_port),
            base_domain: parse_base_domain(&common.base_domain)?,
            ttl: common.ttl,
            max_packet_size: MAX_PACKET_SIZE,
            strategy,
        })
    }
}

/// Split and check the configured base domain.
pub fn parse_base_domain(domain: &str) -> Result<Vec<String>, DnsError> {
    let labels = split_domain(domain);
    if labels.is_empty() {
        return Err(DnsError::Config("base domain must not be empty".into()));
    }
    if let Some(bad) = labels.iter().find(|l| l.is_empty() || l.len() > 63) {
        return Err(DnsError::Config(format!(
            "base domain {domain:?} has an invalid label {bad:?}"
        )));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Result<ServerConfig, DnsError> {
        let mut argv = vec!["dns-switcheroo"];
        argv.extend_from_slice(args);
        ServerConfig::from_cli(Cli::try_parse_from(argv).unwrap())
    }

    #[test]
    fn arbitrary_ip_defaults() {
        let config = config(&["arbitrary-ip", "--base-domain", "ip.Example.com."]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:53".parse().unwrap());
        assert_eq!(config.base_domain, vec!["ip", "Example", "com"]);
        assert_eq!(config.ttl, DEFAULT_TTL);
        assert!(matches!(config.strategy, StrategyConfig::ArbitraryIp { reverse: false }));
    }

    #[test]
    fn switcheroo_keeps_ip_order() {
        let config = config(&[
            "switcheroo",
            "--base-domain",
            "sw.example.com",
            "--listen-host",
            "127.0.0.1",
            "--listen-port",
            "5353",
            "--ip",
            "10.0.0.2",
            "--ip",
            "10.0.0.1",
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:5353".parse().unwrap());
        match config.strategy {
            StrategyConfig::Switcheroo { ips } => assert_eq!(
                ips.as_slice(),
                &[Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)]
            ),
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn switcheroo_requires_an_ip() {
        assert!(Cli::try_parse_from(["dns-switcheroo", "switcheroo", "--base-domain", "x.com"]).is_err());
    }

    #[test]
    fn targeted_switcheroo_mappings() {
        let config = config(&[
            "targeted-switcheroo",
            "--base-domain",
            "t.example.com",
            "--ip-mapping",
            "corp,10.1.1.1",
            "--ip-mapping",
            "lab,10.2.2.2",
            "--fallback-ip",
            "10.9.9.9",
            "--public-dns-server",
            "127.0.0.1",
            "--public-dns-server-port",
            "5300",
        ])
        .unwrap();
        match config.strategy {
            StrategyConfig::TargetedSwitcheroo {
                mappings,
                fallback,
                upstream,
            } => {
                let patterns: Vec<&str> = mappings.entries().iter().map(|e| e.pattern.as_str()).collect();
                assert_eq!(patterns, vec!["corp", "lab"]);
                assert_eq!(fallback, Ipv4Addr::new(10, 9, 9, 9));
                assert_eq!(upstream.addr, "127.0.0.1:5300".parse().unwrap());
                assert_eq!(upstream.timeout, Duration::from_millis(2000));
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn ip_mappings_split_on_semicolons() {
        let config = config(&[
            "targeted-switcheroo",
            "--base-domain",
            "t.example.com",
            "--ip-mapping",
            "a,b,10.1.1.1;lab,10.2.2.2",
            "--fallback-ip",
            "10.9.9.9",
        ])
        .unwrap();
        let StrategyConfig::TargetedSwitcheroo { mappings, .. } = config.strategy else {
            panic!("expected targeted switcheroo");
        };
        let parsed: Vec<String> = mappings.entries().iter().map(ToString::to_string).collect();
        assert_eq!(parsed, vec!["a,b,10.1.1.1", "lab,10.2.2.2"]);
    }

    #[test]
    fn ip_mappings_from_environment() {
        std::env::set_var("DNS_IP_MAPPINGS", "corp,10.1.1.1;lab,10.2.2.2");
        let cli = Cli::try_parse_from([
            "dns-switcheroo",
            "targeted-switcheroo",
            "--base-domain",
            "t.example.com",
            "--fallback-ip",
            "10.9.9.9",
        ]);
        std::env::remove_var("DNS_IP_MAPPINGS");

        match cli.unwrap().command {
            Command::TargetedSwitcheroo { ip_mappings, .. } => {
                assert_eq!(ip_mappings, vec!["corp,10.1.1.1", "lab,10.2.2.2"])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_mapping() {
        let result = config(&[
            "targeted-switcheroo",
            "--base-domain",
            "t.example.com",
            "--ip-mapping",
            "corp",
            "--fallback-ip",
            "10.9.9.9",
        ]);
        assert!(matches!(result, Err(DnsError::Config(_))));
    }

    #[test]
    fn rejects_bad_base_domain() {
        assert!(matches!(parse_base_domain(""), Err(DnsError::Config(_))));
        assert!(matches!(parse_base_domain("."), Err(DnsError::Config(_))));
        assert!(matches!(parse_base_domain("a..b"), Err(DnsError::Config(_))));
        assert_eq!(parse_base_domain("A.b").unwrap(), vec!["A", "b"]);
    }
}
