//! Error types for the qremote-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised while reading or validating control files.
///
/// Every variant is an operator-fixable configuration problem, so callers
/// report all of them as temporary failures.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The file could not be read, including when it does not exist.
    #[error("Unable to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file that must carry a value has no usable lines.
    #[error("{0} has no usable lines")]
    Empty(&'static str),

    /// A record did not split into the expected number of fields.
    #[error("Malformed record in {file}: '{record}' has {found} fields, expected {expected}")]
    Malformed {
        file: &'static str,
        record: String,
        expected: usize,
        found: usize,
    },

    /// A route table declared the name reserved for the implicit route.
    #[error("Name 'default' for route is forbidden in {0}")]
    ReservedRouteName(&'static str),

    /// A configured address token carries a port that is not a number.
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
}
