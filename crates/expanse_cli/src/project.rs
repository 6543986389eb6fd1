//! Project discovery and storage opening shared by all commands.

use std::path::{Path, PathBuf};

use expanse_cache::{ExpansionStorage, FsBlobStore};
use expanse_config::{ExpanseConfig, CONFIG_FILE_NAME};

use crate::GlobalArgs;

/// An opened project: its configuration and its expansion storage.
pub struct Project {
    /// Configuration, defaulted when no `expanse.toml` exists.
    pub config: ExpanseConfig,
    /// Storage over the project's store directory.
    pub storage: ExpansionStorage<FsBlobStore>,
}

impl Project {
    /// Resolves the project directory, loads its configuration and opens the
    /// store.
    pub fn open(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let project_dir = resolve_project_dir(global)?;
        let config = expanse_config::load_config_or_default(&project_dir)?;
        let store_dir = store_dir(&project_dir, &config, global.store.as_deref());
        tracing::debug!(store = %store_dir.display(), "opening expansion store");
        let storage = ExpansionStorage::new(FsBlobStore::new(&store_dir), config.cache.capacity);
        Ok(Self { config, storage })
    }
}

/// Determines the project directory from `--config` or the current directory.
///
/// `--config` may name either the directory or its `expanse.toml`.
pub fn resolve_project_dir(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match global.config {
        Some(ref config_path) => {
            let p = PathBuf::from(config_path);
            if p.is_file() || p.file_name().is_some_and(|n| n == CONFIG_FILE_NAME) {
                Ok(p.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from(".")))
            } else {
                Ok(p)
            }
        }
        None => Ok(std::env::current_dir()?),
    }
}

/// The store directory: `--store` if given, else `store.dir` relative to the
/// project directory.
pub fn store_dir(project_dir: &Path, config: &ExpanseConfig, flag: Option<&str>) -> PathBuf {
    match flag {
        Some(dir) => PathBuf::from(dir),
        None => project_dir.join(&config.store.dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(config: Option<&str>) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config: config.map(str::to_string),
            store: None,
        }
    }

    #[test]
    fn config_directory_is_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        assert_eq!(resolve_project_dir(&global(Some(path))).unwrap(), dir.path());
    }

    #[test]
    fn config_file_resolves_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&file, "").unwrap();
        let resolved = resolve_project_dir(&global(file.to_str())).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn bare_config_name_is_current_dir() {
        let resolved = resolve_project_dir(&global(Some(CONFIG_FILE_NAME))).unwrap();
        assert_eq!(resolved, PathBuf::from("."));
    }

    #[test]
    fn store_flag_overrides_config() {
        let config = ExpanseConfig::default();
        assert_eq!(
            store_dir(Path::new("/proj"), &config, Some("/elsewhere")),
            PathBuf::from("/elsewhere")
        );
        assert_eq!(
            store_dir(Path::new("/proj"), &config, None),
            PathBuf::from("/proj/.expanse")
        );
    }

    #[test]
    fn open_reads_capacity_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[cache]\ncapacity = 2\n").unwrap();
        let project = Project::open(&global(dir.path().to_str())).unwrap();
        assert_eq!(project.config.cache.capacity, 2);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[cache]\ncapacity = 0\n").unwrap();
        assert!(Project::open(&global(dir.path().to_str())).is_err());
    }
}
