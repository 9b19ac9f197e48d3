//! Workspace materialization
//!
//! Ensures the directory skeleton exists and writes each default document only when it is
//! absent. Documents are written to a temp file and linked into place without clobbering,
//! so an existing document is never touched and a new one never appears half-written.

use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use super::documents::{self, Document};
use super::{SKELETON, Workspace};
use crate::config::Config;
use crate::error::{InstallError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Created,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathOutcome {
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializeReport {
    pub directories: Vec<PathOutcome>,
    pub documents: Vec<PathOutcome>,
    pub runtime_config: PathOutcome,
}

impl MaterializeReport {
    pub fn created_count(&self) -> usize {
        self.directories
            .iter()
            .chain(&self.documents)
            .chain(std::iter::once(&self.runtime_config))
            .filter(|p| p.outcome == Outcome::Created)
            .count()
    }
}

pub struct Materializer {
    workspace: Workspace,
    documents: Vec<Document>,
    runtime_config: Document,
}

impl Materializer {
    pub fn new(workspace: Workspace, documents: Vec<Document>, runtime_config: Document) -> Self {
        Self {
            workspace,
            documents,
            runtime_config,
        }
    }

    pub fn from_config(config: &Config, workspace: &Workspace) -> eyre::Result<Self> {
        Ok(Self::new(
            workspace.clone(),
            documents::identity_documents(&config.instance),
            documents::runtime_config(config, workspace)?,
        ))
    }

    /// Ensure the skeleton and default documents exist.
    ///
    /// Any failure here is a [`InstallError::WorkspaceWriteFailed`].
    pub fn materialize(&self) -> Result<MaterializeReport> {
        let root = self.workspace.root();
        fs::create_dir_all(root).map_err(|e| InstallError::workspace(root, e))?;

        let directories = SKELETON
            .iter()
            .map(|dir| -> Result<PathOutcome> {
                let outcome = ensure_dir(&root.join(dir))?;
                Ok(PathOutcome {
                    name: format!("{}/", dir),
                    outcome,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let documents = self
            .documents
            .iter()
            .map(|doc| self.write_document(doc))
            .collect::<Result<Vec<_>>>()?;

        let runtime_config = self.write_document(&self.runtime_config)?;

        Ok(MaterializeReport {
            directories,
            documents,
            runtime_config,
        })
    }

    fn write_document(&self, doc: &Document) -> Result<PathOutcome> {
        let outcome = write_once(self.workspace.root(), doc.name, &doc.content)?;
        log::debug!("{}: {:?}", doc.name, outcome);
        Ok(PathOutcome {
            name: doc.name.to_string(),
            outcome,
        })
    }
}

fn ensure_dir(path: &Path) -> Result<Outcome> {
    if path.is_dir() {
        return Ok(Outcome::Unchanged);
    }
    fs::create_dir_all(path).map_err(|e| InstallError::workspace(path, e))?;
    Ok(Outcome::Created)
}

/// Write `content` to `dir/name` unless that path already exists
fn write_once(dir: &Path, name: &str, content: &str) -> Result<Outcome> {
    let path = dir.join(name);
    if path.symlink_metadata().is_ok() {
        return Ok(Outcome::Unchanged);
    }

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| InstallError::workspace(&path, e))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| InstallError::workspace(&path, e))?;

    match temp.persist_noclobber(&path) {
        Ok(_) => Ok(Outcome::Created),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(Outcome::Unchanged),
        Err(e) => Err(InstallError::workspace(&path, e.error)),
    }
}
