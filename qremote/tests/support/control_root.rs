//! A throwaway qmail control directory
#![allow(dead_code)]

use std::{fs, path::Path};

use tempfile::TempDir;

pub const HELO_NAME: &str = "me.example.net";

pub struct ControlRoot {
    dir: TempDir,
}

impl ControlRoot {
    /// A root with `control/me` and `control/defaultoutgoingip` in place.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("control")).unwrap();

        Self { dir }
            .with("me", &format!("{HELO_NAME}\n"))
            .with("defaultoutgoingip", "127.0.0.1\n")
            .with("routemap", "")
            .with("routes", "")
            .with("smtproutes", "")
    }

    /// Write `control/<name>`.
    pub fn with(self, name: &str, content: &str) -> Self {
        fs::write(self.dir.path().join("control").join(name), content).unwrap();
        self
    }

    /// Remove `control/<name>`.
    pub fn without(self, name: &str) -> Self {
        fs::remove_file(self.dir.path().join("control").join(name)).unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
