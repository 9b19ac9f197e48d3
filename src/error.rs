//! Error taxonomy for install runs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving, extracting, and materializing bundles.
///
/// Only [`InstallError::PrerequisiteMissing`] and [`InstallError::WorkspaceWriteFailed`] end a
/// run; everything else is recorded against a single bundle.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("prerequisite '{binary}' not found on PATH")]
    PrerequisiteMissing { binary: String },

    #[error("bundle '{name}' not found ({searched})")]
    BundleNotFound { name: String, searched: String },

    #[error("fetch of {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("bundle archive {archive} has an invalid manifest: {reason}")]
    InvalidManifest { archive: PathBuf, reason: String },

    #[error("failed to extract {archive}: {source}")]
    ExtractionFailed {
        archive: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("dependency install for '{name}' failed: {reason}")]
    DependencyInstallFailed { name: String, reason: String },

    #[error("cannot write workspace path {path}: {source}")]
    WorkspaceWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            InstallError::PrerequisiteMissing { .. } | InstallError::WorkspaceWriteFailed { .. }
        )
    }

    pub(crate) fn extraction(archive: impl Into<PathBuf>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        InstallError::ExtractionFailed {
            archive: archive.into(),
            source: source.into(),
        }
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallError::WorkspaceWriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// Result type for install operations
pub type Result<T> = std::result::Result<T, InstallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstallError::PrerequisiteMissing {
            binary: "openclaw".to_string(),
        };
        assert_eq!(err.to_string(), "prerequisite 'openclaw' not found on PATH");

        let err = InstallError::BundleNotFound {
            name: "beta".to_string(),
            searched: "no local source, no remote url".to_string(),
        };
        assert_eq!(err.to_string(), "bundle 'beta' not found (no local source, no remote url)");
    }

    #[test]
    fn test_fatality() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(InstallError::workspace("/ws", io).is_fatal());
        assert!(
            InstallError::PrerequisiteMissing {
                binary: "python3".to_string()
            }
            .is_fatal()
        );
        assert!(
            !InstallError::BundleNotFound {
                name: "x".to_string(),
                searched: String::new()
            }
            .is_fatal()
        );
        assert!(!InstallError::extraction("/a.tar.gz", "truncated").is_fatal());
        assert!(
            !InstallError::DependencyInstallFailed {
                name: "x".to_string(),
                reason: "exit 1".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_extraction_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated gzip");
        let err = InstallError::extraction("/a.tar.gz", io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "truncated gzip");
    }
}
