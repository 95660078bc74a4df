use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use settings::CameraPattern;

#[derive(Parser, Debug)]
#[command(
    name = "funhouse",
    author,
    version,
    about = "Funhouse-mirror effects over camera frames",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Settings file; defaults to `funhouse.toml` in the user config directory.
    #[arg(long, global = true, env = "FUNHOUSE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every effect in the catalog, including custom effect directories.
    Effects,
    /// Validate an effect directory or a bare `.frag` file.
    Check(CheckArgs),
    /// Render one frame offscreen and write it to disk.
    Render(RenderArgs),
    /// Open a preview window fed by a synthetic camera or a still image.
    Preview(PreviewArgs),
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Directory containing `effect.toml`, or a fragment shader file.
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Source image; a synthetic pattern is used when omitted.
    #[arg(long, value_name = "IMAGE", conflicts_with = "pattern")]
    pub input: Option<PathBuf>,

    /// Synthetic camera pattern to render when no input image is given.
    #[arg(long, value_enum, value_name = "PATTERN")]
    pub pattern: Option<PatternArg>,

    /// Effect id; defaults to `effects.initial` or the first catalog entry.
    #[arg(long, value_name = "ID")]
    pub effect: Option<String>,

    /// Normalized parameter override, repeatable (e.g. `--param strength=0.8`).
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, f32)>,

    /// Effect time in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Output path; the format follows the extension (`.png`, `.jpg`, `.jpeg`).
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Output width; defaults to the input image width.
    #[arg(long, value_name = "PIXELS")]
    pub width: Option<u32>,

    /// Output height; defaults to the input image height.
    #[arg(long, value_name = "PIXELS")]
    pub height: Option<u32>,
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Show a still image instead of the synthetic camera.
    #[arg(long, value_name = "IMAGE", conflicts_with = "pattern")]
    pub input: Option<PathBuf>,

    #[arg(long, value_enum, value_name = "PATTERN")]
    pub pattern: Option<PatternArg>,

    /// Effect to start with.
    #[arg(long, value_name = "ID")]
    pub effect: Option<String>,

    /// Override the synthetic camera frame rate.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Directory captures are written to.
    #[arg(long, value_name = "DIR")]
    pub capture_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PatternArg {
    Bars,
    Checker,
    Gradient,
}

impl From<PatternArg> for CameraPattern {
    fn from(value: PatternArg) -> Self {
        match value {
            PatternArg::Bars => CameraPattern::Bars,
            PatternArg::Checker => CameraPattern::Checker,
            PatternArg::Gradient => CameraPattern::Gradient,
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

fn parse_param(value: &str) -> Result<(String, f32), String> {
    let (name, raw) = value
        .split_once('=')
        .ok_or_else(|| "expected NAME=VALUE".to_string())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("parameter name may not be empty".into());
    }
    let parsed = raw
        .trim()
        .parse::<f32>()
        .map_err(|_| format!("invalid value for '{name}': {raw}"))?;
    if !parsed.is_finite() {
        return Err(format!("value for '{name}' must be finite"));
    }
    Ok((name.to_string(), parsed))
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height".to_string())?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameter_overrides() {
        assert_eq!(
            parse_param("strength=0.75").unwrap(),
            ("strength".to_string(), 0.75)
        );
        assert_eq!(
            parse_param(" speed = 1 ").unwrap(),
            ("speed".to_string(), 1.0)
        );
        assert!(parse_param("strength").is_err());
        assert!(parse_param("=0.5").is_err());
        assert!(parse_param("strength=lots").is_err());
        assert!(parse_param("strength=NaN").is_err());
    }

    #[test]
    fn parses_window_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size("640X480").unwrap(), (640, 480));
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("wide").is_err());
    }

    #[test]
    fn render_accepts_repeated_params() {
        let cli = Cli::try_parse_from([
            "funhouse",
            "render",
            "--effect",
            "wave",
            "--param",
            "strength=0.2",
            "--param",
            "speed=0.9",
            "--output",
            "out.png",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.params.len(), 2);
        assert_eq!(args.effect.as_deref(), Some("wave"));
    }

    #[test]
    fn input_and_pattern_conflict() {
        let result = Cli::try_parse_from([
            "funhouse",
            "render",
            "--input",
            "a.png",
            "--pattern",
            "bars",
            "--output",
            "out.png",
        ]);
        assert!(result.is_err());
    }
}
