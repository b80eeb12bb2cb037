//! Turning address specs into ordered connection candidates.
//!
//! A spec is one of:
//!
//! - `mx` (or nothing): the mail exchangers of the query host,
//! - `a&b&c`: failover, tried in the order written; an `mx` token expands
//!   in place,
//! - `a|b|c`: round-robin, tried in a random order drawn per delivery,
//! - a single `host[:port]`.
//!
//! `&` takes precedence: a spec is only split on `|` when it has no `&`.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use qremote_common::{error::ControlError, tracing::debug};
use rand::Rng;

use crate::{
    deadline::{Deadline, Expired},
    dns::Lookup,
    error::{DeliveryError, PermanentError},
};

/// Port used when a spec does not name one.
pub const SMTP_PORT: u16 = 25;

const MX_TOKEN: &str = "mx";

/// A remote endpoint to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCandidate {
    /// The name the endpoint was configured or found under.
    pub host: String,
    pub addr: SocketAddr,
}

impl fmt::Display for RemoteCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// A local source address to connect from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCandidate {
    pub token: String,
    /// The address to bind, when the token is or resolves to one.
    pub ip: Option<IpAddr>,
}

impl fmt::Display for LocalCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            Some(ip) => write!(f, "{ip}"),
            None => f.write_str(&self.token),
        }
    }
}

/// The shape of an address spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec<'a> {
    Mx,
    Failover(Vec<&'a str>),
    RoundRobin(Vec<&'a str>),
    Single(&'a str),
}

impl<'a> AddressSpec<'a> {
    #[must_use]
    pub fn parse(spec: &'a str) -> Self {
        let spec = spec.trim();

        if spec.is_empty() || spec.eq_ignore_ascii_case(MX_TOKEN) {
            Self::Mx
        } else if spec.contains('&') {
            Self::Failover(tokens(spec, '&'))
        } else if spec.contains('|') {
            Self::RoundRobin(tokens(spec, '|'))
        } else {
            Self::Single(spec)
        }
    }
}

fn tokens(spec: &str, separator: char) -> Vec<&str> {
    spec.split(separator)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Split `host[:port]`, `[v6]:port` or a bare IP into host and port.
///
/// # Errors
///
/// Returns `ControlError::InvalidAddress` when the port is not a number.
pub fn split_host_port(token: &str) -> Result<(&str, u16), ControlError> {
    let invalid = || ControlError::InvalidAddress(token.to_string());

    if let Some(rest) = token.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        return match after {
            "" => Ok((host, SMTP_PORT)),
            port => port
                .strip_prefix(':')
                .and_then(|port| port.parse().ok())
                .map(|port| (host, port))
                .ok_or_else(invalid),
        };
    }

    // A bare IPv6 address is full of colons but carries no port
    if token.parse::<IpAddr>().is_ok() {
        return Ok((token, SMTP_PORT));
    }

    match token.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => port
            .parse()
            .map(|port| (host, port))
            .map_err(|_| invalid()),
        Some(_) => Err(invalid()),
        None => Ok((token, SMTP_PORT)),
    }
}

/// Reorder `items` by repeatedly drawing one of the remaining items at random.
pub fn draw_order<T, R: Rng + ?Sized>(mut items: Vec<T>, rng: &mut R) -> Vec<T> {
    let mut order = Vec::with_capacity(items.len());
    while !items.is_empty() {
        let index = rng.random_range(0..items.len());
        order.push(items.remove(index));
    }
    order
}

/// Expands address specs, resolving names as it goes.
pub struct Expander<'a> {
    lookup: &'a dyn Lookup,
    deadline: &'a Deadline,
}

impl<'a> Expander<'a> {
    #[must_use]
    pub const fn new(lookup: &'a dyn Lookup, deadline: &'a Deadline) -> Self {
        Self { lookup, deadline }
    }

    /// Remote candidates for `spec`, in the order they should be tried.
    ///
    /// Mail exchangers without an address are skipped, as long as something
    /// else is left to try.
    ///
    /// # Errors
    ///
    /// Fails permanently when a named host does not resolve or no mail
    /// exchanger does, and temporarily when the deadline passes.
    pub async fn remote<R: Rng + ?Sized>(
        &self,
        spec: &str,
        query_host: &str,
        rng: &mut R,
    ) -> Result<Vec<RemoteCandidate>, DeliveryError> {
        match AddressSpec::parse(spec) {
            AddressSpec::Mx => self.mail_exchangers(query_host).await,
            AddressSpec::Failover(tokens) => {
                let mut candidates = Vec::with_capacity(tokens.len());
                let mut unreachable = None;
                for token in tokens {
                    if !token.eq_ignore_ascii_case(MX_TOKEN) {
                        candidates.push(self.resolve_remote(token).await?);
                        continue;
                    }

                    // The other tokens may still get the message through
                    match self.mail_exchangers(query_host).await {
                        Ok(exchangers) => candidates.extend(exchangers),
                        Err(err @ DeliveryError::Permanent(_)) => {
                            debug!(query_host, %err, "Skipping mail exchangers in failover list");
                            unreachable = unreachable.or(Some(err));
                        }
                        Err(err) => return Err(err),
                    }
                }

                match unreachable {
                    Some(err) if candidates.is_empty() => Err(err),
                    _ => Ok(candidates),
                }
            }
            AddressSpec::RoundRobin(tokens) => {
                let mut candidates = Vec::with_capacity(tokens.len());
                for token in draw_order(tokens, rng) {
                    candidates.push(self.resolve_remote(token).await?);
                }
                Ok(candidates)
            }
            AddressSpec::Single(token) => Ok(vec![self.resolve_remote(token).await?]),
        }
    }

    /// Local candidates for `spec`, in the order they should be tried.
    ///
    /// Tokens that do not resolve are kept as they are.
    ///
    /// # Errors
    ///
    /// Fails only when the deadline passes.
    pub async fn local<R: Rng + ?Sized>(
        &self,
        spec: &str,
        rng: &mut R,
    ) -> Result<Vec<LocalCandidate>, DeliveryError> {
        let tokens = match AddressSpec::parse(spec) {
            AddressSpec::Failover(tokens) => tokens,
            AddressSpec::RoundRobin(tokens) => draw_order(tokens, rng),
            AddressSpec::Single(token) => vec![token],
            AddressSpec::Mx => vec![spec.trim()],
        };

        let mut candidates = Vec::with_capacity(tokens.len());
        for token in tokens {
            candidates.push(self.resolve_local(token).await?);
        }
        Ok(candidates)
    }

    /// The single local candidate named by `control/defaultoutgoingip`.
    ///
    /// # Errors
    ///
    /// Fails only when the deadline passes.
    pub async fn default_local(&self, line: &str) -> Result<Vec<LocalCandidate>, DeliveryError> {
        Ok(vec![self.resolve_local(line.trim()).await?])
    }

    async fn mail_exchangers(&self, query_host: &str) -> Result<Vec<RemoteCandidate>, DeliveryError> {
        let servers = match self
            .deadline
            .run("MX lookup", self.lookup.mail_exchangers(query_host))
            .await?
        {
            Ok(servers) if !servers.is_empty() => servers,
            Ok(_) => {
                debug!(query_host, "No mail exchangers, delivering to the host itself");
                return self.mx_fallback(query_host).await;
            }
            Err(err) => {
                debug!(query_host, %err, "MX lookup failed, delivering to the host itself");
                return self.mx_fallback(query_host).await;
            }
        };

        let mut candidates = Vec::with_capacity(servers.len());
        let mut unresolved = None;
        for server in servers {
            let Some(ip) = self.address_of(&server.host).await? else {
                debug!(host = %server.host, "Skipping mail exchanger without an address");
                unresolved = unresolved.or(Some(server.host));
                continue;
            };

            candidates.push(RemoteCandidate {
                addr: SocketAddr::new(ip, server.port),
                host: server.host,
            });
        }

        match unresolved {
            Some(host) if candidates.is_empty() => {
                Err(PermanentError::ResolveHostFailed(host).into())
            }
            _ => Ok(candidates),
        }
    }

    async fn mx_fallback(&self, query_host: &str) -> Result<Vec<RemoteCandidate>, DeliveryError> {
        let ip = self
            .address_of(query_host)
            .await?
            .ok_or_else(|| PermanentError::NoMailExchanger(query_host.to_string()))?;

        Ok(vec![RemoteCandidate {
            host: query_host.to_string(),
            addr: SocketAddr::new(ip, SMTP_PORT),
        }])
    }

    async fn resolve_remote(&self, token: &str) -> Result<RemoteCandidate, DeliveryError> {
        let (host, port) = split_host_port(token)?;
        let ip = self
            .address_of(host)
            .await?
            .ok_or_else(|| PermanentError::ResolveHostFailed(host.to_string()))?;

        Ok(RemoteCandidate {
            host: host.to_string(),
            addr: SocketAddr::new(ip, port),
        })
    }

    async fn resolve_local(&self, token: &str) -> Result<LocalCandidate, DeliveryError> {
        let host = token
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(token);

        Ok(LocalCandidate {
            token: token.to_string(),
            ip: self.address_of(host).await?,
        })
    }

    /// The first address of `host`, or `None` when it does not resolve.
    async fn address_of(&self, host: &str) -> Result<Option<IpAddr>, Expired> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Some(ip));
        }

        let addresses = self
            .deadline
            .run("DNS lookup", self.lookup.host_addresses(host))
            .await?;

        Ok(match addresses {
            Ok(addresses) => addresses.into_iter().next(),
            Err(err) => {
                debug!(host, %err, "Host did not resolve");
                None
            }
        })
    }
}
