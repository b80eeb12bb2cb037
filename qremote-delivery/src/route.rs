//! Choosing where a message goes.
//!
//! A route is picked from three control files, first match wins:
//!
//! 1. `control/routemap` maps `(sender host, destination)` to a route name,
//! 2. `control/routes` gives that name its local and remote addresses and
//!    credentials,
//! 3. `control/smtproutes` names a relay per destination.
//!
//! With no match the route is the implicit `default`, delivering to the
//! destination's mail exchangers.

use std::net::IpAddr;

use qremote_common::{
    control::{ControlFile, ControlSource},
    error::ControlError,
    tracing::debug,
};
use qremote_smtp::client::Credentials;

/// Name of the implicit route. A route table may not use it.
pub const DEFAULT_ROUTE: &str = "default";

/// Name of routes found in `control/smtproutes`.
pub const SMTPROUTES_ROUTE: &str = "smtproutes";

/// Matches any sender host or destination in `control/routemap`.
const WILDCARD: &str = "*";

/// Where and how to deliver one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    /// Remote address spec; empty means the mail exchangers of `query_host`.
    pub remote_spec: String,
    /// Local address spec; empty means `control/defaultoutgoingip`.
    pub local_spec: String,
    pub username: String,
    pub password: String,
    /// The host whose MX records are used when the remote spec asks for them.
    pub query_host: String,
}

impl Route {
    fn default_for(destination: &str) -> Self {
        Self {
            name: DEFAULT_ROUTE.to_string(),
            remote_spec: String::new(),
            local_spec: String::new(),
            username: String::new(),
            password: String::new(),
            query_host: destination.to_string(),
        }
    }

    /// Credentials to authenticate with, when both parts are set.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        (!self.username.is_empty() && !self.password.is_empty())
            .then(|| Credentials::new(self.username.clone(), self.password.clone()))
    }

    #[must_use]
    pub fn uses_mx(&self) -> bool {
        self.remote_spec.is_empty() || self.remote_spec.eq_ignore_ascii_case("mx")
    }
}

/// `senderHost;destination;routeName`
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteMapEntry {
    sender: String,
    destination: String,
    route: String,
}

impl RouteMapEntry {
    fn matches(&self, sender_host: &str, destination: &str) -> bool {
        let pattern_matches =
            |pattern: &str, value: &str| pattern == WILDCARD || pattern.eq_ignore_ascii_case(value);

        pattern_matches(&self.sender, sender_host) && pattern_matches(&self.destination, destination)
    }
}

/// `name;localAddr;remoteAddr;user;pass`
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteEntry {
    name: String,
    local: String,
    remote: String,
    username: String,
    password: String,
}

/// `destination:relay[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct SmtpRouteEntry {
    destination: String,
    relay: String,
    port: Option<String>,
}

fn split_fields<'a>(
    file: ControlFile,
    line: &'a str,
    separator: char,
    expected: usize,
) -> Result<Vec<&'a str>, ControlError> {
    let fields: Vec<&str> = line.split(separator).collect();
    if fields.len() == expected {
        Ok(fields)
    } else {
        Err(ControlError::Malformed {
            file: file.path(),
            record: line.to_string(),
            expected,
            found: fields.len(),
        })
    }
}

fn parse_route_map(lines: &[String]) -> Result<Vec<RouteMapEntry>, ControlError> {
    lines
        .iter()
        .map(|line| {
            let fields = split_fields(ControlFile::RouteMap, line, ';', 3)?;
            Ok(RouteMapEntry {
                sender: fields[0].to_string(),
                destination: fields[1].to_string(),
                route: fields[2].to_string(),
            })
        })
        .collect()
}

fn parse_routes(lines: &[String]) -> Result<Vec<RouteEntry>, ControlError> {
    lines
        .iter()
        .map(|line| {
            let fields = split_fields(ControlFile::Routes, line, ';', 5)?;
            if fields[0] == DEFAULT_ROUTE {
                return Err(ControlError::ReservedRouteName(ControlFile::Routes.path()));
            }

            Ok(RouteEntry {
                name: fields[0].to_string(),
                local: fields[1].to_string(),
                remote: fields[2].to_string(),
                username: fields[3].to_string(),
                password: fields[4].to_string(),
            })
        })
        .collect()
}

fn parse_smtproutes(lines: &[String]) -> Result<Vec<SmtpRouteEntry>, ControlError> {
    lines
        .iter()
        .map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            match fields.as_slice() {
                [destination, relay] => Ok(SmtpRouteEntry {
                    destination: (*destination).to_string(),
                    relay: (*relay).to_string(),
                    port: None,
                }),
                [destination, relay, port] => Ok(SmtpRouteEntry {
                    destination: (*destination).to_string(),
                    relay: (*relay).to_string(),
                    port: Some((*port).to_string()).filter(|port| !port.is_empty()),
                }),
                _ => Err(ControlError::Malformed {
                    file: ControlFile::SmtpRoutes.path(),
                    record: line.clone(),
                    expected: 2,
                    found: fields.len(),
                }),
            }
        })
        .collect()
}

/// Render an IP destination as an address spec on port 25.
fn ip_spec(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(ip) => format!("{ip}:25"),
        IpAddr::V6(ip) => format!("[{ip}]:25"),
    }
}

/// Reads the routing control files to pick a [`Route`].
pub struct RouteResolver<'a> {
    control: &'a dyn ControlSource,
}

impl<'a> RouteResolver<'a> {
    #[must_use]
    pub const fn new(control: &'a dyn ControlSource) -> Self {
        Self { control }
    }

    /// Pick the route for mail from `sender_host` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if a routing control file is missing or holds a
    /// malformed record.
    pub fn resolve(&self, sender_host: &str, destination: &str) -> Result<Route, ControlError> {
        let literal = destination
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(destination);

        if let Ok(ip) = literal.parse::<IpAddr>() {
            debug!(%ip, "Destination is an IP address");
            return Ok(Route {
                name: destination.to_string(),
                remote_spec: ip_spec(ip),
                ..Route::default_for(destination)
            });
        }

        let mut route = Route::default_for(destination);

        let route_map = parse_route_map(&self.control.lines(ControlFile::RouteMap)?)?;
        if let Some(entry) = route_map
            .iter()
            .find(|entry| entry.matches(sender_host, destination))
        {
            debug!(route = %entry.route, sender_host, destination, "Route map matched");
            route.name.clone_from(&entry.route);
        }

        let routes = parse_routes(&self.control.lines(ControlFile::Routes)?)?;
        if let Some(entry) = routes.iter().find(|entry| entry.name == route.name)
            && !entry.remote.is_empty()
        {
            return Ok(Route {
                name: entry.name.clone(),
                remote_spec: entry.remote.clone(),
                local_spec: entry.local.clone(),
                username: entry.username.clone(),
                password: entry.password.clone(),
                query_host: destination.to_string(),
            });
        }

        let smtproutes = parse_smtproutes(&self.control.lines(ControlFile::SmtpRoutes)?)?;
        if let Some(entry) = smtproutes
            .iter()
            .find(|entry| entry.destination.eq_ignore_ascii_case(destination) && !entry.relay.is_empty())
        {
            debug!(relay = %entry.relay, destination, "smtproutes matched");
            return Ok(Route {
                name: SMTPROUTES_ROUTE.to_string(),
                remote_spec: format!("{}:{}", entry.relay, entry.port.as_deref().unwrap_or("25")),
                ..Route::default_for(destination)
            });
        }

        // A route map hit without a usable route table entry still delivers
        // through the mail exchangers
        route.name = DEFAULT_ROUTE.to_string();
        Ok(route)
    }
}
