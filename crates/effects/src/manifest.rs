//! On-disk effect definitions. An effect directory holds an `effect.toml`
//! manifest next to the fragment source it references:
//!
//! ```toml
//! id = "glow"
//! name = "Glow"
//! source = "glow.frag"
//!
//! [parameters]
//! strength = 0.5
//! ```
//!
//! `load_effect_dir` turns such a directory into an [`EffectDescriptor`];
//! `load_effect_dirs` does the same for every child of a custom-effects root.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{is_valid_parameter_name, EffectDescriptor, MAX_PARAMETERS};

pub const MANIFEST_FILE: &str = "effect.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found at {0}")]
    Missing(PathBuf),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("manifest validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EffectManifest {
    pub id: String,
    pub name: String,
    pub source: PathBuf,
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

impl EffectManifest {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.id.trim().is_empty() {
            issues.push("effect id must not be blank".to_string());
        }
        if self.name.trim().is_empty() {
            issues.push("effect name must not be blank".to_string());
        }
        if self.source.as_os_str().is_empty() {
            issues.push("effect source path must not be blank".to_string());
        } else if self.source.is_absolute() {
            issues.push(format!(
                "source '{}' must be relative to the effect directory",
                self.source.display()
            ));
        }
        if self.parameters.len() > MAX_PARAMETERS {
            issues.push(format!(
                "{} parameters declared; at most {MAX_PARAMETERS} are supported",
                self.parameters.len()
            ));
        }
        for (name, value) in &self.parameters {
            if !is_valid_parameter_name(name) {
                issues.push(format!("parameter '{name}' is not a valid name"));
            }
            if !value.is_finite() || !(0.0..=1.0).contains(value) {
                issues.push(format!("parameter '{name}' default {value} is outside [0, 1]"));
            }
        }
        issues
    }
}

/// Reads `effect.toml` under `root`, validates it, and loads the shader text.
pub fn load_effect_dir(root: impl AsRef<Path>) -> Result<EffectDescriptor, ManifestError> {
    let root = root.as_ref();
    let manifest_path = root.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(ManifestError::Missing(manifest_path));
    }

    let raw = fs::read_to_string(&manifest_path)?;
    let manifest: EffectManifest = toml::from_str(&raw)?;
    let issues = manifest.validate();
    if !issues.is_empty() {
        return Err(ManifestError::Validation(issues));
    }

    let source_path = root.join(&manifest.source);
    if !source_path.exists() {
        return Err(ManifestError::Validation(vec![format!(
            "missing shader source: {}",
            source_path.display()
        )]));
    }
    let source = fs::read_to_string(&source_path)?;

    Ok(EffectDescriptor::new(manifest.id, manifest.name, source).with_parameters(manifest.parameters))
}

/// Loads every child directory of `root` that carries a manifest. Directories
/// without `effect.toml` are skipped; broken ones are reported individually.
pub fn load_effect_dirs(
    root: impl AsRef<Path>,
) -> Result<Vec<(PathBuf, Result<EffectDescriptor, ManifestError>)>, ManifestError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root.as_ref())?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).exists())
        .collect();
    dirs.sort();

    Ok(dirs
        .into_iter()
        .map(|dir| {
            let loaded = load_effect_dir(&dir);
            (dir, loaded)
        })
        .collect())
}
