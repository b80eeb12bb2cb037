//! Service extensions advertised in an EHLO reply.

use super::response::Response;

/// A single advertised extension, e.g. `AUTH PLAIN CRAM-MD5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Upper-cased extension keyword.
    pub keyword: String,
    pub params: Vec<String>,
}

impl Capability {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let first = words.next()?;

        // Some servers still advertise the pre-standard `AUTH=LOGIN PLAIN` form
        let (keyword, inline) = first
            .split_once('=')
            .map_or((first, None), |(keyword, param)| (keyword, Some(param)));

        let params = inline
            .into_iter()
            .filter(|param| !param.is_empty())
            .chain(words)
            .map(str::to_string)
            .collect();

        Some(Self {
            keyword: keyword.to_ascii_uppercase(),
            params,
        })
    }
}

/// The extensions a server advertised. Empty after a HELO.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    entries: Vec<Capability>,
}

impl Capabilities {
    /// Read the extensions out of an EHLO reply.
    ///
    /// The first line of the reply is the server's greeting and is skipped.
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        Self {
            entries: response
                .lines
                .iter()
                .skip(1)
                .filter_map(|line| Capability::parse(line))
                .collect(),
        }
    }

    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    #[must_use]
    pub fn get(&self, keyword: &str) -> Option<&Capability> {
        self.entries
            .iter()
            .find(|entry| entry.keyword.eq_ignore_ascii_case(keyword))
    }

    /// Every SASL mechanism named across the advertised AUTH lines.
    pub fn auth_mechanisms(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|entry| entry.keyword == "AUTH")
            .flat_map(|entry| entry.params.iter().map(String::as_str))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
