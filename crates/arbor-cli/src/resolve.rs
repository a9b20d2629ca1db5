//! Repository argument resolution.
//!
//! Commands take a `<repo>` argument that may be a registry id, a registered
//! repository's name, or a path to a repository on disk (registered or not).

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use arbor_core::registry::RepositoryRegistry;

/// Resolve `input` to a repository path.
///
/// Registry entries win over paths. Anything that is not registered is
/// accepted if it names an existing directory; git decides whether it is
/// really a repository.
pub fn resolve_repo(registry: &RepositoryRegistry, input: &str) -> Result<PathBuf> {
    if let Some(repo) = registry.find(input) {
        return Ok(repo.path.clone());
    }

    let path = Path::new(input);
    if path.is_dir() {
        return Ok(absolute(path));
    }

    bail!(
        "unknown repository {input:?}: not a registered id or name, and not a directory.\n\
         Run `arbor repo add <path>` to register it."
    )
}

/// Absolute form of `path`, canonicalized when possible.
pub fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn registered_name_resolves_to_its_path() {
        let tmp = TempDir::new().unwrap();
        let mut registry = RepositoryRegistry::load(tmp.path().join("repos.json")).unwrap();
        registry.add("/src/widget");

        assert_eq!(
            resolve_repo(&registry, "widget").unwrap(),
            PathBuf::from("/src/widget")
        );
    }

    #[test]
    fn unregistered_directory_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let registry = RepositoryRegistry::load(tmp.path().join("repos.json")).unwrap();
        let dir = tmp.path().join("checkout");
        std::fs::create_dir(&dir).unwrap();

        assert_eq!(
            resolve_repo(&registry, dir.to_str().unwrap()).unwrap(),
            dir.canonicalize().unwrap()
        );
    }

    #[test]
    fn unknown_input_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let registry = RepositoryRegistry::load(tmp.path().join("repos.json")).unwrap();

        let err = resolve_repo(&registry, "nowhere").unwrap_err();
        assert!(err.to_string().contains("arbor repo add"));
    }
}
