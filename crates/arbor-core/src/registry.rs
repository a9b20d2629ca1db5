//! The user's registered repositories, persisted as a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read repository registry at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("repository registry at {path} is not valid JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write repository registry at {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A registered repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub path: PathBuf,
    /// Last component of `path`.
    pub name: String,
}

impl Repository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id: Uuid::new_v4(),
            path,
            name,
        }
    }
}

/// Ordered list of repositories backed by a file.
#[derive(Debug)]
pub struct RepositoryRegistry {
    file: PathBuf,
    repositories: Vec<Repository>,
}

impl RepositoryRegistry {
    /// Load the registry from `file`. A missing file is an empty registry.
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let file = file.into();
        let repositories = match std::fs::read_to_string(&file) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| RegistryError::Parse {
                path: file.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(RegistryError::Read {
                    path: file.clone(),
                    source,
                });
            }
        };
        Ok(Self { file, repositories })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Repositories in the order they were added.
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Register `path`. Returns `None` if it is already registered.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> Option<&Repository> {
        let path = path.into();
        if self.repositories.iter().any(|r| r.path == path) {
            return None;
        }
        self.repositories.push(Repository::new(path));
        self.repositories.last()
    }

    /// Unregister by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.repositories.len();
        self.repositories.retain(|r| r.id != id);
        self.repositories.len() != before
    }

    /// Look up by id, name, or path.
    pub fn find(&self, key: &str) -> Option<&Repository> {
        if let Ok(id) = Uuid::parse_str(key) {
            return self.repositories.iter().find(|r| r.id == id);
        }
        self.repositories
            .iter()
            .find(|r| r.name == key)
            .or_else(|| self.repositories.iter().find(|r| r.path == Path::new(key)))
    }

    /// Write the registry back to its file, replacing it atomically.
    pub fn save(&self) -> Result<(), RegistryError> {
        let write_err = |source| RegistryError::Write {
            path: self.file.clone(),
            source,
        };
        let contents = serde_json::to_string_pretty(&self.repositories)
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        write_atomic(&self.file, contents.as_bytes()).map_err(write_err)
    }
}

/// Write `contents` to a sibling temp file and rename it over `path`,
/// creating parent directories as needed.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
