use std::net::IpAddr;
use std::sync::Arc;

use crate::error::AccessError;

use super::policy::AccessPolicy;

/// What the gate needs to know about an inbound request.
#[derive(Debug, Clone, Copy)]
pub struct ClientRequest<'a> {
    /// Raw `Host` header, possibly with a port.
    pub host: Option<&'a str>,
    /// Source address as reported by the transport.
    pub client_addr: &'a str,
}

/// One admission stage. Returning an error is terminal for the request.
pub trait AccessFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, request: &ClientRequest<'_>) -> Result<(), AccessError>;
}

/// Rejects requests whose `Host` header is not an exact allow-list entry.
pub struct HostFilter {
    policy: Arc<AccessPolicy>,
}

impl HostFilter {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }
}

impl AccessFilter for HostFilter {
    fn name(&self) -> &'static str {
        "host"
    }

    fn check(&self, request: &ClientRequest<'_>) -> Result<(), AccessError> {
        let raw = request.host.unwrap_or("");
        let host = strip_port(raw);
        if self.policy.allows_host(host) {
            Ok(())
        } else {
            tracing::warn!("Rejected request with host header: {:?}", raw);
            Err(AccessError::HostNotAllowed {
                host: raw.to_string(),
            })
        }
    }
}

/// Rejects clients outside the allowed networks.
pub struct IpFilter {
    policy: Arc<AccessPolicy>,
}

impl IpFilter {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }
}

impl AccessFilter for IpFilter {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn check(&self, request: &ClientRequest<'_>) -> Result<(), AccessError> {
        let addr = request.client_addr;
        tracing::debug!("Request from IP: {}", addr);

        let ip: IpAddr = addr.trim().parse().map_err(|_| {
            tracing::error!("Invalid IP address: {}", addr);
            AccessError::InvalidClient {
                addr: addr.to_string(),
            }
        })?;

        if self.policy.allows_ip(ip) {
            Ok(())
        } else {
            tracing::warn!("Access denied for IP: {}", addr);
            Err(AccessError::AccessDenied {
                ip: addr.to_string(),
                allowed: self.policy.describe_networks(),
            })
        }
    }
}

/// Ordered chain of filters; a request must pass every stage.
pub struct AccessGate {
    stages: Vec<Box<dyn AccessFilter>>,
}

impl AccessGate {
    pub fn new(stages: Vec<Box<dyn AccessFilter>>) -> Self {
        Self { stages }
    }

    /// Host check followed by source-IP check.
    pub fn from_policy(policy: AccessPolicy) -> Self {
        let policy = Arc::new(policy);
        Self::new(vec![
            Box::new(HostFilter::new(Arc::clone(&policy))),
            Box::new(IpFilter::new(policy)),
        ])
    }

    pub fn check(&self, request: &ClientRequest<'_>) -> Result<(), AccessError> {
        for stage in &self.stages {
            if let Err(e) = stage.check(request) {
                tracing::debug!("Request rejected by {} filter", stage.name());
                return Err(e);
            }
        }
        Ok(())
    }
}

/// `example.com:8000` -> `example.com`, `[::1]:8000` -> `::1`.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        // A bare IPv6 literal has more than one colon and no port.
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn gate(hosts: &[&str], ips: &[&str]) -> AccessGate {
        let hosts: Vec<String> = hosts.iter().map(|s| s.to_string()).collect();
        let ips: Vec<String> = ips.iter().map(|s| s.to_string()).collect();
        AccessGate::from_policy(AccessPolicy::from_config(&hosts, &ips))
    }

    fn request<'a>(host: &'a str, addr: &'a str) -> ClientRequest<'a> {
        ClientRequest {
            host: Some(host),
            client_addr: addr,
        }
    }

    #[test]
    fn ip_outside_allow_list_is_denied() {
        let gate = gate(&["localhost"], &["127.0.0.1/32"]);
        let err = gate.check(&request("localhost", "10.0.0.5")).unwrap_err();
        assert!(matches!(err, AccessError::AccessDenied { ref ip, .. } if ip == "10.0.0.5"));
    }

    #[test]
    fn unparsable_address_is_invalid_client() {
        let gate = gate(&["localhost"], &["127.0.0.1/32"]);
        let err = gate.check(&request("localhost", "not-an-ip")).unwrap_err();
        assert_eq!(
            err,
            AccessError::InvalidClient {
                addr: "not-an-ip".to_string()
            }
        );
    }

    #[test]
    fn ip_inside_network_is_admitted() {
        let gate = gate(&["localhost"], &["10.0.0.0/8"]);
        assert!(gate.check(&request("localhost:8000", "10.20.30.40")).is_ok());
    }

    #[test]
    fn host_check_runs_before_ip_check() {
        let gate = gate(&["api.example.com"], &["127.0.0.1/32"]);
        let err = gate.check(&request("evil.example.com", "not-an-ip")).unwrap_err();
        assert!(matches!(err, AccessError::HostNotAllowed { .. }));

        let missing = ClientRequest {
            host: None,
            client_addr: "127.0.0.1",
        };
        assert!(matches!(
            gate.check(&missing),
            Err(AccessError::HostNotAllowed { .. })
        ));
    }

    #[test]
    fn host_match_is_exact() {
        let gate = gate(&["example.com"], &["0.0.0.0/0"]);
        assert!(gate.check(&request("example.com", "1.2.3.4")).is_ok());
        assert!(gate.check(&request("sub.example.com", "1.2.3.4")).is_err());
    }

    #[test]
    fn strip_port_handles_ipv6() {
        assert_eq!(strip_port("[::1]:8000"), "::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("localhost"), "localhost");
        assert_eq!(strip_port("127.0.0.1:80"), "127.0.0.1");
    }

    struct CountingFilter(Arc<AtomicUsize>);

    impl AccessFilter for CountingFilter {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _request: &ClientRequest<'_>) -> Result<(), AccessError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn rejection_stops_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = Arc::new(AccessPolicy::default());
        let gate = AccessGate::new(vec![
            Box::new(HostFilter::new(policy)),
            Box::new(CountingFilter(Arc::clone(&calls))),
        ]);

        assert!(gate.check(&request("localhost", "127.0.0.1")).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
