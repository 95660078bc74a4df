//! Effect definitions shared by the renderer and the CLI: descriptors, the
//! ordered catalog, the normalized-to-physical parameter mapper, the shipped
//! GLSL effects, and loading of `effect.toml` directories.
mod builtin;
mod catalog;
mod descriptor;
mod error;
mod manifest;
mod mapper;

pub use builtin::{builtin_effects, passthrough, PASSTHROUGH_SOURCE};
pub use catalog::EffectCatalog;
pub use descriptor::{is_valid_parameter_name, uniform_name, EffectDescriptor, MAX_PARAMETERS};
pub use error::{CatalogError, ValidationError};
pub use manifest::{load_effect_dir, load_effect_dirs, EffectManifest, ManifestError, MANIFEST_FILE};
pub use mapper::{map_parameter, range_for, ParameterRange};
