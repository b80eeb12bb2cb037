//! Flat control files.
//!
//! Control files are plain text, one record per line. Lines starting with `#`
//! or a space are comments, empty lines are skipped and a trailing `\r` is
//! dropped. Files are read fresh on every request; nothing is cached.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::error::ControlError;

/// The control root used when nothing else is configured.
pub const DEFAULT_ROOT: &str = "/var/qmail";

/// The control files consulted during a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFile {
    /// This host's name, used as the HELO fallback.
    Me,
    /// Source address used when a route names no local address.
    DefaultOutgoingIp,
    /// `name;localAddr;remoteAddr;user;pass`
    Routes,
    /// `senderHost;destination;routeName`
    RouteMap,
    /// `destination:relay[:port]`
    SmtpRoutes,
}

impl ControlFile {
    /// Path of the file relative to the control root.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Me => "control/me",
            Self::DefaultOutgoingIp => "control/defaultoutgoingip",
            Self::Routes => "control/routes",
            Self::RouteMap => "control/routemap",
            Self::SmtpRoutes => "control/smtproutes",
        }
    }
}

/// Keep only the meaningful lines of a control file.
#[must_use]
pub fn filter_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(' '))
        .map(str::to_string)
        .collect()
}

/// Somewhere control records can be read from.
pub trait ControlSource: Send + Sync {
    /// The filtered lines of `file`, in file order.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read.
    fn lines(&self, file: ControlFile) -> Result<Vec<String>, ControlError>;

    /// The first meaningful line of `file`, trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or has no usable line.
    fn first_line(&self, file: ControlFile) -> Result<String, ControlError> {
        self.lines(file)?
            .into_iter()
            .map(|line| line.trim().to_string())
            .find(|line| !line.is_empty())
            .ok_or(ControlError::Empty(file.path()))
    }
}

/// Control files on disk, below a control root.
#[derive(Debug, Clone)]
pub struct ControlFiles {
    root: PathBuf,
}

impl ControlFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ControlFiles {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl ControlSource for ControlFiles {
    fn lines(&self, file: ControlFile) -> Result<Vec<String>, ControlError> {
        let path = self.root.join(file.path());
        let content =
            fs::read_to_string(&path).map_err(|source| ControlError::Unreadable { path, source })?;

        Ok(filter_lines(&content))
    }
}

/// In-memory control files.
///
/// Files that were never set behave like missing files on disk. The number of
/// reads is tracked so callers can check that no configuration was consulted.
#[derive(Debug, Default)]
pub struct StaticControl {
    files: HashMap<ControlFile, String>,
    reads: AtomicUsize,
}

impl StaticControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, file: ControlFile, content: impl Into<String>) -> Self {
        self.files.insert(file, content.into());
        self
    }

    /// How many times any file has been read.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl ControlSource for StaticControl {
    fn lines(&self, file: ControlFile) -> Result<Vec<String>, ControlError> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        self.files
            .get(&file)
            .map(|content| filter_lines(content))
            .ok_or_else(|| ControlError::Unreadable {
                path: PathBuf::from(file.path()),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })
    }
}
