use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories_next::{BaseDirs, ProjectDirs};

pub const ENV_CONFIG_DIR: &str = "FUNHOUSE_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "FUNHOUSE_DATA_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Funhouse";
const APPLICATION: &str = "funhouse";

const CONFIG_FILE: &str = "funhouse.toml";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    /// Platform directories, each replaceable by a non-empty environment
    /// variable.
    pub fn discover() -> Result<Self> {
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;
        Ok(Self::with_overrides(&project_dirs, |name| env::var_os(name)))
    }

    fn with_overrides<F>(project_dirs: &ProjectDirs, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let dir = |name: &str, default: &Path| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .map_or_else(|| default.to_path_buf(), PathBuf::from)
        };
        Self {
            config_dir: dir(ENV_CONFIG_DIR, project_dirs.config_dir()),
            data_dir: dir(ENV_DATA_DIR, project_dirs.data_dir()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Directories searched for custom effects before `effects.custom_dirs`.
    pub fn effect_user_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.config_dir.join("effects"),
            self.data_dir.join("effects"),
        ]
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.data_dir.join("captures")
    }
}

#[cfg(test)]
impl AppPaths {
    pub fn from_raw(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            data_dir,
        }
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
