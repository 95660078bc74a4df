use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPattern {
    #[default]
    Bars,
    Checker,
    Gradient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl CaptureFormat {
    pub fn extension(self) -> &'static str {
        match self {
            CaptureFormat::Png => "png",
            CaptureFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub version: u32,
    #[serde(default)]
    pub renderer: RendererSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub effects: EffectSettings,
    /// Normalized parameter presets keyed by effect id.
    #[serde(default)]
    pub parameters: BTreeMap<String, BTreeMap<String, f32>>,
    #[serde(default)]
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub width: u32,
    pub height: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub refresh_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub capture_timeout: Duration,
    pub vsync: bool,
    pub power: PowerSetting,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            refresh_interval: Duration::from_millis(16),
            capture_timeout: Duration::from_secs(1),
            vsync: true,
            power: PowerSetting::default(),
        }
    }
}

/// Synthetic camera used by `preview` and `render` when no image is given.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub pattern: CameraPattern,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            pattern: CameraPattern::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub initial: Option<String>,
    /// Directories scanned for `effect.toml` effect folders.
    pub custom_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub directory: Option<PathBuf>,
    pub format: CaptureFormat,
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            directory: None,
            format: CaptureFormat::default(),
            jpeg_quality: 90,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            renderer: RendererSettings::default(),
            camera: CameraSettings::default(),
            effects: EffectSettings::default(),
            parameters: BTreeMap::new(),
            capture: CaptureSettings::default(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: Settings = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Preset for `effect`, if one is configured.
    pub fn preset(&self, effect: &str) -> Option<&BTreeMap<String, f32>> {
        self.parameters.get(effect)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let renderer = &self.renderer;
        if renderer.width == 0 || renderer.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "renderer size must be positive, got {}x{}",
                renderer.width, renderer.height
            )));
        }
        if renderer.refresh_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "renderer.refresh_interval must be greater than zero".into(),
            ));
        }
        if renderer.capture_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "renderer.capture_timeout must be greater than zero".into(),
            ));
        }

        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera size must be positive, got {}x{}",
                camera.width, camera.height
            )));
        }
        if !(camera.fps.is_finite() && camera.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fps must be > 0, got {}",
                camera.fps
            )));
        }

        if let Some(initial) = &self.effects.initial {
            if initial.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "effects.initial may not be empty".into(),
                ));
            }
        }

        for (effect, values) in &self.parameters {
            for (name, value) in values {
                if !(0.0..=1.0).contains(value) {
                    return Err(ConfigError::Invalid(format!(
                        "parameters.{effect}.{name} = {value} is outside [0, 1]"
                    )));
                }
            }
        }

        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "capture.jpeg_quality must be within 1-100, got {}",
                self.capture.jpeg_quality
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[renderer]
width = 800
height = 600
refresh_interval = "8ms"
capture_timeout = "2s"
vsync = false
power = "high"

[camera]
fps = 24
pattern = "checker"

[effects]
initial = "wave"
custom_dirs = ["~/effects", "/opt/funhouse/effects"]

[parameters.wave]
strength = 0.4
frequency = 1.0

[capture]
directory = "/tmp/captures"
format = "jpg"
jpeg_quality = 75
"#;

    #[test]
    fn parses_sample_config() {
        let settings = Settings::from_toml_str(SAMPLE).expect("parse settings");
        assert_eq!(settings.renderer.width, 800);
        assert_eq!(settings.renderer.refresh_interval, Duration::from_millis(8));
        assert_eq!(settings.renderer.capture_timeout, Duration::from_secs(2));
        assert!(!settings.renderer.vsync);
        assert_eq!(settings.renderer.power, PowerSetting::High);
        assert_eq!(settings.camera.fps, 24.0);
        assert_eq!(settings.camera.width, 640);
        assert_eq!(settings.camera.pattern, CameraPattern::Checker);
        assert_eq!(settings.effects.initial.as_deref(), Some("wave"));
        assert_eq!(settings.effects.custom_dirs.len(), 2);
        assert_eq!(settings.preset("wave").and_then(|p| p.get("strength")), Some(&0.4));
        assert_eq!(settings.capture.format, CaptureFormat::Jpeg);
        assert_eq!(settings.capture.jpeg_quality, 75);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let settings = Settings::from_toml_str("version = 1").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.renderer.refresh_interval, Duration::from_millis(16));
        assert_eq!(settings.capture.format.extension(), "png");
    }

    #[test]
    fn numeric_durations_are_seconds() {
        let settings =
            Settings::from_toml_str("version = 1\n[renderer]\ncapture_timeout = 3\n").unwrap();
        assert_eq!(settings.renderer.capture_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = Settings::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for config in [
            "version = 1\n[renderer]\nwidth = 0\n",
            "version = 1\n[renderer]\ncapture_timeout = \"0s\"\n",
            "version = 1\n[camera]\nfps = 0\n",
            "version = 1\n[parameters.wave]\nstrength = 1.5\n",
            "version = 1\n[capture]\njpeg_quality = 0\n",
        ] {
            let err = Settings::from_toml_str(config).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{config}");
        }
    }

    #[test]
    fn rejects_malformed_durations() {
        let err =
            Settings::from_toml_str("version = 1\n[renderer]\nrefresh_interval = \"soon\"\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("funhouse.toml");
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Read { .. })
        ));

        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Settings::load(&path).unwrap().renderer.height, 600);
    }
}
