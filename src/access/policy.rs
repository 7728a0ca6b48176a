use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::ConfigError;

/// A CIDR range such as `10.0.0.0/8`. A bare address is a single-host network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn v4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn v6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpNetwork {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = s.trim();
        let invalid = |reason: &str| ConfigError::InvalidNetwork {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (addr_part, prefix_part) = match entry.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (entry, None),
        };

        let addr: IpAddr = addr_part
            .parse()
            .map_err(|_| invalid("not an IP address"))?;
        let max_prefix = if addr.is_ipv4() { 32 } else { 128 };

        let prefix = match prefix_part {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max_prefix)
                .ok_or_else(|| invalid("invalid prefix length"))?,
            None => max_prefix,
        };

        let host_bits_set = match addr {
            IpAddr::V4(v4) => u32::from(v4) & !v4_mask(prefix) != 0,
            IpAddr::V6(v6) => u128::from(v6) & !v6_mask(prefix) != 0,
        };
        if host_bits_set {
            return Err(invalid("has host bits set"));
        }

        Ok(Self { addr, prefix })
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Static allow-lists consulted by the access gate. Nothing is allowed by default.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    pub allowed_hosts: Vec<String>,
    pub allowed_networks: Vec<IpNetwork>,
}

impl AccessPolicy {
    /// Build a policy from raw config entries. Malformed networks are logged and skipped.
    pub fn from_config(hosts: &[String], networks: &[String]) -> Self {
        let allowed_networks = networks
            .iter()
            .filter_map(|entry| match entry.parse::<IpNetwork>() {
                Ok(network) => Some(network),
                Err(e) => {
                    tracing::error!("{}", e);
                    None
                }
            })
            .collect();

        Self {
            allowed_hosts: hosts.iter().map(|h| h.trim().to_string()).collect(),
            allowed_networks,
        }
    }

    pub fn allows_host(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|allowed| allowed == host)
    }

    pub fn allows_ip(&self, ip: IpAddr) -> bool {
        self.allowed_networks.iter().any(|net| net.contains(ip))
    }

    pub fn describe_networks(&self) -> String {
        let nets: Vec<String> = self.allowed_networks.iter().map(|n| n.to_string()).collect();
        format!("[{}]", nets.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_cidr_and_bare_addresses() {
        let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
        assert_eq!(net.to_string(), "10.0.0.0/8");

        let host: IpNetwork = "127.0.0.1".parse().unwrap();
        assert_eq!(host.to_string(), "127.0.0.1/32");

        let v6: IpNetwork = "fd00::/8".parse().unwrap();
        assert!(v6.contains(ip("fd12::1")));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!("not-a-net".parse::<IpNetwork>().is_err());
        assert!("10.0.0.0/33".parse::<IpNetwork>().is_err());
        assert!("10.0.0.0/abc".parse::<IpNetwork>().is_err());
        assert!("10.0.0.1/8".parse::<IpNetwork>().is_err());
    }

    #[test]
    fn containment_respects_prefix() {
        let net: IpNetwork = "192.168.1.0/24".parse().unwrap();
        assert!(net.contains(ip("192.168.1.200")));
        assert!(!net.contains(ip("192.168.2.1")));
        assert!(!net.contains(ip("::1")));

        let everything: IpNetwork = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(ip("8.8.8.8")));
    }

    #[test]
    fn mapped_ipv6_client_matches_ipv4_network() {
        let net: IpNetwork = "127.0.0.1/32".parse().unwrap();
        assert!(net.contains(ip("::ffff:127.0.0.1")));
    }

    #[test]
    fn malformed_config_entries_are_skipped() {
        let policy = AccessPolicy::from_config(
            &["localhost".to_string()],
            &[
                "127.0.0.1/32".to_string(),
                "garbage".to_string(),
                "10.0.0.0/8".to_string(),
            ],
        );
        assert_eq!(policy.allowed_networks.len(), 2);
        assert_eq!(policy.describe_networks(), "[127.0.0.1/32, 10.0.0.0/8]");
        assert!(policy.allows_ip(ip("10.1.2.3")));
    }

    #[test]
    fn empty_policy_denies_everything() {
        let policy = AccessPolicy::default();
        assert!(!policy.allows_host("localhost"));
        assert!(!policy.allows_ip(ip("127.0.0.1")));
    }
}
