//! Workspace layout
//!
//! ```text
//! {root}/
//!   skills/          installed bundles, one directory per bundle name
//!   memory/          agent notes
//!   assets/          media used by the persona
//!   IDENTITY.md      identity documents (first write wins)
//!   SOUL.md
//!   USER.md
//!   runtime.yaml     runtime configuration for the host agent
//!   .deya/           installer state: installed.yaml, cache/, run/, logs/
//! ```

use std::path::{Path, PathBuf};

pub mod documents;
pub mod materializer;

/// Directories every workspace must have
pub const SKELETON: [&str; 3] = ["skills", "memory", "assets"];

/// Private directory for installer state
const STATE_DIR: &str = ".deya";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    /// Where a bundle named `name` is installed
    pub fn bundle_dir(&self, name: &str) -> PathBuf {
        self.skills_dir().join(name)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn installed_file(&self) -> PathBuf {
        self.state_dir().join("installed.yaml")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir().join("cache")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.state_dir().join("run")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir().join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ws = Workspace::new("/srv/agent");
        assert_eq!(ws.skills_dir(), PathBuf::from("/srv/agent/skills"));
        assert_eq!(ws.bundle_dir("web-hunter"), PathBuf::from("/srv/agent/skills/web-hunter"));
        assert_eq!(ws.installed_file(), PathBuf::from("/srv/agent/.deya/installed.yaml"));
        assert_eq!(ws.cache_dir(), PathBuf::from("/srv/agent/.deya/cache"));
    }
}
