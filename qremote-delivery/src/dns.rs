//! DNS lookups needed for a delivery.
//!
//! Three questions are asked of DNS: the mail exchangers of a domain, the
//! addresses of a host, and the names of a local address (for HELO). They sit
//! behind the [`Lookup`] trait so deliveries can run against an in-memory
//! [`StaticLookup`]. There is no fallback to A/AAAA here; the address
//! expander decides what a failed MX lookup means.

use std::{
    collections::HashMap,
    net::IpAddr,
    time::Duration,
};

use async_trait::async_trait;
use hickory_resolver::{
    TokioResolver, config::ResolverOpts, name_server::TokioConnectionProvider,
};
use qremote_common::tracing::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur during DNS resolution.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The domain has no MX records.
    #[error("No mail servers found for domain: {0}")]
    NoMailServers(String),

    /// The host has no A or AAAA records.
    #[error("No addresses found for host: {0}")]
    NoAddresses(String),

    /// The address has no PTR records.
    #[error("No names found for address: {0}")]
    NoNames(IpAddr),

    /// DNS query failed due to network or resolver issues.
    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] hickory_resolver::ResolveError),

    /// Domain does not exist (NXDOMAIN).
    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),
}

/// Configuration for DNS resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    /// DNS query timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per query before giving up (default: 2)
    #[serde(default = "default_attempts")]
    pub attempts: usize,
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_attempts() -> usize {
    2
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            attempts: default_attempts(),
        }
    }
}

/// Represents a mail server target with its priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServer {
    /// The hostname of the mail server, without the trailing dot.
    pub host: String,
    /// MX priority (lower value = higher priority).
    pub priority: u16,
    /// Port number (default: 25).
    pub port: u16,
}

impl MailServer {
    /// Creates a new mail server entry.
    #[must_use]
    pub const fn new(host: String, priority: u16, port: u16) -> Self {
        Self {
            host,
            priority,
            port,
        }
    }
}

/// The DNS questions a delivery asks.
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Mail exchangers for `domain`, most preferred first.
    async fn mail_exchangers(&self, domain: &str) -> Result<Vec<MailServer>, DnsError>;

    /// Forward addresses of `host`.
    async fn host_addresses(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;

    /// Names of `ip`, without trailing dots.
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, DnsError>;
}

fn strip_root(name: &str) -> String {
    name.strip_suffix('.').unwrap_or(name).to_string()
}

/// The system resolver.
#[derive(Debug)]
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    /// Creates a new DNS resolver with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new() -> Result<Self, DnsError> {
        Self::with_dns_config(&DnsConfig::default())
    }

    /// Creates a new DNS resolver with custom DNS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver cannot be initialized.
    pub fn with_dns_config(dns_config: &DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(dns_config.timeout_secs);
        opts.attempts = dns_config.attempts;

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self { resolver })
    }
}

#[async_trait]
impl Lookup for DnsResolver {
    async fn mail_exchangers(&self, domain: &str) -> Result<Vec<MailServer>, DnsError> {
        debug!("Resolving mail exchangers for domain: {domain}");

        let lookup = match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup,
            Err(err) if err.is_nx_domain() => {
                return Err(DnsError::DomainNotFound(domain.to_string()));
            }
            Err(err) if err.is_no_records_found() => {
                return Err(DnsError::NoMailServers(domain.to_string()));
            }
            Err(err) => {
                warn!("MX lookup failed for {domain}: {err}");
                return Err(DnsError::LookupFailed(err));
            }
        };

        let mut servers: Vec<MailServer> = lookup
            .iter()
            .map(|mx| {
                let host = strip_root(&mx.exchange().to_utf8());
                let priority = mx.preference();
                debug!("Found MX record: {host} (priority: {priority})");
                MailServer::new(host, priority, 25)
            })
            .collect();

        if servers.is_empty() {
            return Err(DnsError::NoMailServers(domain.to_string()));
        }

        // Stable, so equal preferences keep the order DNS returned them in
        servers.sort_by_key(|s| s.priority);
        Ok(servers)
    }

    async fn host_addresses(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let addresses: Vec<IpAddr> = match self.resolver.lookup_ip(host).await {
            Ok(lookup) => lookup.iter().collect(),
            Err(err) if err.is_nx_domain() => {
                return Err(DnsError::DomainNotFound(host.to_string()));
            }
            Err(err) if err.is_no_records_found() => Vec::new(),
            Err(err) => return Err(DnsError::LookupFailed(err)),
        };

        if addresses.is_empty() {
            Err(DnsError::NoAddresses(host.to_string()))
        } else {
            debug!("Resolved {host} to {} address(es)", addresses.len());
            Ok(addresses)
        }
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        let names: Vec<String> = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup.iter().map(|ptr| strip_root(&ptr.0.to_utf8())).collect(),
            Err(err) if err.is_no_records_found() || err.is_nx_domain() => Vec::new(),
            Err(err) => return Err(DnsError::LookupFailed(err)),
        };

        if names.is_empty() {
            Err(DnsError::NoNames(ip))
        } else {
            Ok(names)
        }
    }
}

/// Fixed answers, for running deliveries without a network.
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    exchangers: HashMap<String, Vec<MailServer>>,
    hosts: HashMap<String, Vec<IpAddr>>,
    names: HashMap<IpAddr, Vec<String>>,
}

impl StaticLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer MX queries for `domain` with `(preference, host)` pairs.
    #[must_use]
    pub fn with_mx(mut self, domain: &str, exchangers: &[(u16, &str)]) -> Self {
        let mut servers: Vec<MailServer> = exchangers
            .iter()
            .map(|(priority, host)| MailServer::new(strip_root(host), *priority, 25))
            .collect();
        servers.sort_by_key(|s| s.priority);

        self.exchangers.insert(domain.to_lowercase(), servers);
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: &str, addresses: &[IpAddr]) -> Self {
        self.hosts.insert(host.to_lowercase(), addresses.to_vec());
        self
    }

    #[must_use]
    pub fn with_reverse(mut self, ip: IpAddr, name: &str) -> Self {
        self.names.entry(ip).or_default().push(strip_root(name));
        self
    }
}

#[async_trait]
impl Lookup for StaticLookup {
    async fn mail_exchangers(&self, domain: &str) -> Result<Vec<MailServer>, DnsError> {
        self.exchangers
            .get(&domain.to_lowercase())
            .filter(|servers| !servers.is_empty())
            .cloned()
            .ok_or_else(|| DnsError::NoMailServers(domain.to_string()))
    }

    async fn host_addresses(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        self.hosts
            .get(&host.to_lowercase())
            .filter(|addresses| !addresses.is_empty())
            .cloned()
            .ok_or_else(|| DnsError::NoAddresses(host.to_string()))
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, DnsError> {
        self.names.get(&ip).cloned().ok_or(DnsError::NoNames(ip))
    }
}
