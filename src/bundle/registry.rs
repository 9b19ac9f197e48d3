//! Bundle resolution
//!
//! Resolves a [`BundleRef`] to an archive on disk: first the local source directory,
//! then one attempt against the remote base URL. Remote downloads are cached in the
//! workspace so the extractor always works from a local file.

use lazy_regex::regex_captures;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::archive;
use super::manifest::BundleManifest;
use super::{
    Bundle, BundleRef, BundleSource, archive_file_name, compare_versions, is_valid_version, version_from_file_name,
};
use crate::config::Config;
use crate::error::{InstallError, Result};
use crate::workspace::Workspace;

/// Largest archive accepted from the remote source
const MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;

/// Remote index listing the latest version of each bundle
const REMOTE_INDEX: &str = "index.yaml";

/// Retrieves bytes from a URL
pub trait Fetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher with a fixed global timeout
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_failed = |reason: String| InstallError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        log::debug!("GET {}", url);
        let mut response = self.agent.get(url).call().map_err(|e| fetch_failed(e.to_string()))?;

        response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_BYTES)
            .read_to_vec()
            .map_err(|e| fetch_failed(e.to_string()))
    }
}

/// Remote `index.yaml`: a `name: version` map, either at the top level or under `bundles:`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteIndex {
    Nested { bundles: HashMap<String, String> },
    Flat(HashMap<String, String>),
}

impl RemoteIndex {
    fn into_versions(self) -> HashMap<String, String> {
        match self {
            RemoteIndex::Nested { bundles } => bundles,
            RemoteIndex::Flat(versions) => versions,
        }
    }
}

/// An archive sitting in the local source directory
#[derive(Debug, Clone)]
pub struct AvailableArchive {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

/// Resolves bundle references to archives
pub struct Registry<F: Fetcher = HttpFetcher> {
    local_dir: Option<PathBuf>,
    base_url: Option<String>,
    cache_dir: PathBuf,
    fetcher: F,
}

impl Registry<HttpFetcher> {
    pub fn from_config(config: &Config, workspace: &Workspace) -> Self {
        Registry::new(
            config.source.local.as_deref().map(Config::expand_path),
            config.source.url.clone(),
            workspace.cache_dir(),
            HttpFetcher::new(Duration::from_secs(config.source.timeout_secs)),
        )
    }
}

impl<F: Fetcher> Registry<F> {
    pub fn new(local_dir: Option<PathBuf>, base_url: Option<String>, cache_dir: PathBuf, fetcher: F) -> Self {
        Self {
            local_dir,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            cache_dir,
            fetcher,
        }
    }

    /// Resolve a reference to a bundle with a validated manifest
    pub fn resolve(&self, bundle_ref: &BundleRef) -> Result<Bundle> {
        let mut searched = Vec::new();

        match &self.local_dir {
            Some(dir) => match find_local(dir, bundle_ref) {
                Some((version, path)) => {
                    log::info!("Resolved {} v{} locally: {}", bundle_ref.name, version, path.display());
                    return load(&bundle_ref.name, version, BundleSource::Local { path });
                }
                None => searched.push(format!("not in {}", dir.display())),
            },
            None => searched.push("no local source".to_string()),
        }

        match &self.base_url {
            Some(base_url) => match self.fetch_remote(base_url, bundle_ref) {
                Ok((version, source)) => {
                    log::info!("Fetched {} v{} from {}", bundle_ref.name, version, source);
                    return load(&bundle_ref.name, version, source);
                }
                Err(e) => {
                    log::warn!("Remote lookup for {} failed: {}", bundle_ref, e);
                    searched.push(format!("remote: {}", e));
                }
            },
            None => searched.push("no remote url".to_string()),
        }

        Err(InstallError::BundleNotFound {
            name: bundle_ref.name.clone(),
            searched: searched.join("; "),
        })
    }

    /// Archives in the local source directory, sorted by name then version
    pub fn available(&self) -> Vec<AvailableArchive> {
        let Some(dir) = &self.local_dir else {
            return Vec::new();
        };

        let mut found: Vec<AvailableArchive> = local_archives(dir)
            .filter_map(|(file_name, path)| {
                let (_, name, version) =
                    regex_captures!(r"^(.+)-v(\d+(?:\.\d+)*(?:-[0-9A-Za-z.-]+)?)\.(?:tar\.gz|tgz)$", &file_name)?;
                Some(AvailableArchive {
                    name: name.to_string(),
                    version: version.to_string(),
                    path,
                })
            })
            .collect();

        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| compare_versions(&a.version, &b.version)));
        found
    }

    fn fetch_remote(&self, base_url: &str, bundle_ref: &BundleRef) -> Result<(String, BundleSource)> {
        let version = match &bundle_ref.version {
            Some(v) => v.clone(),
            None => self.latest_remote_version(base_url, &bundle_ref.name)?,
        };

        let file_name = archive_file_name(&bundle_ref.name, &version);
        let url = format!("{}/{}", base_url, file_name);
        let bytes = self.fetcher.get(&url)?;

        let path = self.cache_dir.join(&file_name);
        write_cached(&self.cache_dir, &path, &bytes).map_err(|e| InstallError::FetchFailed {
            url: url.clone(),
            reason: format!("cannot cache download: {}", e),
        })?;

        Ok((version, BundleSource::Remote { url, path }))
    }

    fn latest_remote_version(&self, base_url: &str, name: &str) -> Result<String> {
        let url = format!("{}/{}", base_url, REMOTE_INDEX);
        let bytes = self.fetcher.get(&url)?;
        let index: RemoteIndex = serde_yaml::from_slice(&bytes).map_err(|e| InstallError::FetchFailed {
            url: url.clone(),
            reason: format!("invalid index: {}", e),
        })?;

        let version = index
            .into_versions()
            .remove(name)
            .ok_or_else(|| InstallError::FetchFailed {
                url: url.clone(),
                reason: format!("'{}' is not listed", name),
            })?;

        if !is_valid_version(&version) {
            return Err(InstallError::FetchFailed {
                url,
                reason: format!("invalid version '{}' listed for '{}'", version, name),
            });
        }
        Ok(version)
    }
}

fn local_archives(dir: &Path) -> impl Iterator<Item = (String, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => Some(entries),
        Err(e) => {
            log::warn!("Cannot read local source {}: {}", dir.display(), e);
            None
        }
    };

    entries
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| (e.file_name().to_string_lossy().to_string(), e.path()))
}

/// Find `{name}-v{version}` in `dir`; without a pinned version the highest wins
fn find_local(dir: &Path, bundle_ref: &BundleRef) -> Option<(String, PathBuf)> {
    local_archives(dir)
        .filter_map(|(file_name, path)| {
            version_from_file_name(&bundle_ref.name, &file_name).map(|version| (version, path))
        })
        .filter(|(version, _)| bundle_ref.version.as_ref().is_none_or(|wanted| wanted == version))
        .max_by(|(a, _), (b, _)| compare_versions(a, b))
}

fn write_cached(cache_dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(cache_dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(cache_dir)?;
    temp.write_all(bytes)?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read the archive's manifest and payload listing into a [`Bundle`]
fn load(name: &str, version: String, source: BundleSource) -> Result<Bundle> {
    let archive_path = source.archive_path().to_path_buf();

    let contents =
        archive::inspect(&archive_path).map_err(|e| InstallError::extraction(&archive_path, format!("{:#}", e)))?;

    log::debug!(
        "{}: archive root '{}', {} payload entries",
        archive_path.display(),
        contents.root,
        contents.payload.len()
    );

    let raw = contents.manifest.ok_or_else(|| InstallError::InvalidManifest {
        archive: archive_path.clone(),
        reason: "no SKILL.md at the archive root".to_string(),
    })?;

    let manifest = BundleManifest::from_str(&raw)
        .map_err(|e| InstallError::InvalidManifest {
            archive: archive_path.clone(),
            reason: format!("{:#}", e),
        })?
        .with_detected_dependencies(&contents.payload);

    if let Some(ref declared) = manifest.version
        && compare_versions(declared, &version) != std::cmp::Ordering::Equal
    {
        log::warn!(
            "{}: manifest declares version {} but archive is v{}; using v{}",
            name,
            declared,
            version,
            version
        );
    }

    Ok(Bundle {
        name: name.to_string(),
        version,
        source,
        manifest,
        payload: contents.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::archive::tests::write_archive;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Serves canned responses and records every URL requested
    #[derive(Default)]
    struct FakeFetcher {
        responses: HashMap<String, Vec<u8>>,
        requested: RefCell<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.requested.borrow_mut().push(url.to_string());
            self.responses.get(url).cloned().ok_or_else(|| InstallError::FetchFailed {
                url: url.to_string(),
                reason: "http status: 404".to_string(),
            })
        }
    }

    fn skill(name: &str) -> String {
        format!("---\nname: {}\ndescription: test bundle\ntriggers:\n  - do {}\n---\n# {}\n", name, name, name)
    }

    fn make_archive(dir: &Path, name: &str, version: &str) -> PathBuf {
        let path = dir.join(archive_file_name(name, version));
        let manifest = skill(name);
        let manifest_entry = format!("{}/SKILL.md", name);
        let requirements_entry = format!("{}/requirements.txt", name);
        write_archive(
            &path,
            &[
                (manifest_entry.as_str(), Some(manifest.as_str())),
                (requirements_entry.as_str(), Some("requests\n")),
            ],
        );
        path
    }

    #[test]
    fn test_resolve_local_picks_highest_version() {
        let temp = TempDir::new().unwrap();
        make_archive(temp.path(), "alpha", "1.2.0");
        make_archive(temp.path(), "alpha", "1.10.0");
        make_archive(temp.path(), "alpha-extra", "9.0.0");

        let registry = Registry::new(
            Some(temp.path().to_path_buf()),
            None,
            temp.path().join("cache"),
            FakeFetcher::default(),
        );
        let bundle = registry.resolve(&"alpha".parse().unwrap()).unwrap();

        assert_eq!(bundle.name, "alpha");
        assert_eq!(bundle.version, "1.10.0");
        assert!(matches!(bundle.source, BundleSource::Local { .. }));
        assert_eq!(bundle.manifest.triggers, vec!["do alpha"]);
        assert!(bundle.has_dependency_declaration());
    }

    #[test]
    fn test_resolve_local_pinned_version() {
        let temp = TempDir::new().unwrap();
        make_archive(temp.path(), "alpha", "1.2.0");
        make_archive(temp.path(), "alpha", "1.10.0");

        let registry = Registry::new(
            Some(temp.path().to_path_buf()),
            None,
            temp.path().join("cache"),
            FakeFetcher::default(),
        );
        let bundle = registry.resolve(&"alpha@1.2.0".parse().unwrap()).unwrap();
        assert_eq!(bundle.version, "1.2.0");
    }

    #[test]
    fn test_resolve_remote_with_index() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let archive = make_archive(&staging, "beta", "0.3.0");

        let mut fetcher = FakeFetcher::default();
        fetcher.responses.insert(
            "https://bundles.example.com/index.yaml".to_string(),
            b"bundles:\n  beta: 0.3.0\n".to_vec(),
        );
        fetcher.responses.insert(
            "https://bundles.example.com/beta-v0.3.0.tar.gz".to_string(),
            fs::read(&archive).unwrap(),
        );

        let cache = temp.path().join("cache");
        let registry = Registry::new(None, Some("https://bundles.example.com/".to_string()), cache.clone(), fetcher);
        let bundle = registry.resolve(&"beta".parse().unwrap()).unwrap();

        assert_eq!(bundle.version, "0.3.0");
        assert_eq!(bundle.archive_path(), cache.join("beta-v0.3.0.tar.gz"));
        assert!(cache.join("beta-v0.3.0.tar.gz").is_file());
    }

    #[test]
    fn test_resolve_remote_with_flat_index() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let archive = make_archive(&staging, "beta", "1.0.0");

        let mut fetcher = FakeFetcher::default();
        fetcher.responses.insert(
            "https://bundles.example.com/index.yaml".to_string(),
            b"alpha: 2.1.0\nbeta: 1.0.0\n".to_vec(),
        );
        fetcher.responses.insert(
            "https://bundles.example.com/beta-v1.0.0.tar.gz".to_string(),
            fs::read(&archive).unwrap(),
        );

        let registry = Registry::new(
            None,
            Some("https://bundles.example.com".to_string()),
            temp.path().join("cache"),
            fetcher,
        );
        let bundle = registry.resolve(&"beta".parse().unwrap()).unwrap();
        assert_eq!(bundle.version, "1.0.0");
    }

    #[test]
    fn test_invalid_index_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut fetcher = FakeFetcher::default();
        fetcher.responses.insert(
            "https://bundles.example.com/index.yaml".to_string(),
            b"bundles:\n  beta: latest\n".to_vec(),
        );

        let registry = Registry::new(
            None,
            Some("https://bundles.example.com".to_string()),
            temp.path().join("cache"),
            fetcher,
        );

        let err = registry
            .latest_remote_version("https://bundles.example.com", "beta")
            .unwrap_err();
        assert!(matches!(err, InstallError::FetchFailed { ref reason, .. } if reason.contains("latest")));

        assert!(registry.resolve(&"beta".parse().unwrap()).is_err());
        assert_eq!(
            *registry.fetcher.requested.borrow(),
            vec![
                "https://bundles.example.com/index.yaml".to_string(),
                "https://bundles.example.com/index.yaml".to_string(),
            ]
        );
        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn test_local_miss_falls_back_to_single_remote_attempt() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::new(
            Some(temp.path().to_path_buf()),
            Some("https://bundles.example.com".to_string()),
            temp.path().join("cache"),
            FakeFetcher::default(),
        );

        let err = registry.resolve(&"beta@1.0.0".parse().unwrap()).unwrap_err();
        assert!(matches!(err, InstallError::BundleNotFound { ref name, .. } if name == "beta"));
        assert_eq!(
            *registry.fetcher.requested.borrow(),
            vec!["https://bundles.example.com/beta-v1.0.0.tar.gz".to_string()]
        );
    }

    #[test]
    fn test_no_sources_is_not_found() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::new(None, None, temp.path().join("cache"), FakeFetcher::default());
        let err = registry.resolve(&"alpha".parse().unwrap()).unwrap_err();
        assert!(err.to_string().contains("no local source; no remote url"));
    }

    #[test]
    fn test_archive_without_manifest_is_invalid() {
        let temp = TempDir::new().unwrap();
        write_archive(
            &temp.path().join("gamma-v1.0.0.tar.gz"),
            &[("gamma/README.md", Some("# no manifest\n"))],
        );

        let registry = Registry::new(
            Some(temp.path().to_path_buf()),
            None,
            temp.path().join("cache"),
            FakeFetcher::default(),
        );
        let err = registry.resolve(&"gamma".parse().unwrap()).unwrap_err();
        assert!(matches!(err, InstallError::InvalidManifest { .. }));
    }

    #[test]
    fn test_available_lists_local_archives() {
        let temp = TempDir::new().unwrap();
        make_archive(temp.path(), "beta", "0.1.0");
        make_archive(temp.path(), "alpha", "2.0.0");
        make_archive(temp.path(), "alpha", "1.0.0");
        fs::write(temp.path().join("notes.txt"), "ignore me").unwrap();

        let registry = Registry::new(
            Some(temp.path().to_path_buf()),
            None,
            temp.path().join("cache"),
            FakeFetcher::default(),
        );
        let available: Vec<_> = registry
            .available()
            .into_iter()
            .map(|a| format!("{}@{}", a.name, a.version))
            .collect();
        assert_eq!(available, vec!["alpha@1.0.0", "alpha@2.0.0", "beta@0.1.0"]);
    }
}
