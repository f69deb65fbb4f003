// config.rs — 运行时配置 (JSON)
//
// Lookup order:
// 1) --config <path>
// 2) <exe_dir>/room_illusion.json
// 3) ./room_illusion.json
// 4) built-in defaults
//
// Every field is optional; missing ones fall back to `Default`.

use crate::room::RoomLook;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "room_illusion.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Resampling used when placing the source into atlas cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl Default for ResampleFilter {
    fn default() -> Self {
        ResampleFilter::Triangle
    }
}

impl From<ResampleFilter> for FilterType {
    fn from(f: ResampleFilter) -> Self {
        match f {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub look: RoomLook,
    /// Decoded files are downscaled so their long edge stays under this. 0 = off.
    pub max_long_edge: u32,
    pub resample: ResampleFilter,
    /// Clear colour behind the room (linear RGB).
    pub background: [f32; 3],
    pub vsync: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            look: RoomLook::default(),
            max_long_edge: 960,
            resample: ResampleFilter::default(),
            background: [0.0, 0.0, 0.0],
            vsync: true,
        }
    }
}

impl AppConfig {
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let fixed = config.look.sanitize();
        if !fixed.is_empty() {
            log::warn!("{}: out-of-range look fields reset to defaults: {}", path.display(), fixed.join(", "));
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    /// Explicit path must exist; discovered paths are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }
        match find_config_file() {
            Some(p) => {
                log::info!("using config {}", p.display());
                Self::load_from(&p)
            }
            None => Ok(Self::default()),
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join(CONFIG_FILE_NAME);
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from(CONFIG_FILE_NAME);
    p.exists().then_some(p)
}

/// Command line: `[--lang <code>] [--config <path>] [image]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub lang: Option<String>,
    pub config: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

impl CliArgs {
    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut out = Self::default();
        let mut it = args.into_iter();
        while let Some(a) = it.next() {
            match a.as_str() {
                "--lang" => out.lang = it.next(),
                "--config" => out.config = it.next().map(PathBuf::from),
                s if s.starts_with("--") => log::warn!("ignoring unknown option {}", s),
                _ => out.image = Some(PathBuf::from(a)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg = AppConfig::from_json(
            r#"{ "look": { "depth_factor": 2.0 }, "resample": "lanczos3" }"#,
            Path::new("test.json"),
        )
        .unwrap();
        assert_eq!(cfg.look.depth_factor, 2.0);
        assert_eq!(cfg.look.height_factor, 1.25);
        assert_eq!(cfg.resample, ResampleFilter::Lanczos3);
        assert_eq!(cfg.max_long_edge, 960);
        assert!(cfg.vsync);
    }

    #[test]
    fn test_out_of_range_look_is_reset() {
        let cfg = AppConfig::from_json(
            r#"{ "look": { "fov_y_degrees": 0.0, "height_factor": -1.0, "depth_factor": 2.0, "near": 10.0, "far": 5.0 } }"#,
            Path::new("test.json"),
        )
        .unwrap();
        let d = RoomLook::default();
        assert_eq!(cfg.look.fov_y_degrees, d.fov_y_degrees);
        assert_eq!(cfg.look.height_factor, d.height_factor);
        assert_eq!((cfg.look.near, cfg.look.far), (d.near, d.far));
        // in-range fields are kept
        assert_eq!(cfg.look.depth_factor, 2.0);
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let err = AppConfig::from_json("{ not json", Path::new("bad.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_missing_explicit_config_is_read_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/room.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_cli_args() {
        let args = ["--lang", "sk", "photo.jpg", "--config", "cfg.json"]
            .iter()
            .map(|s| s.to_string());
        let cli = CliArgs::parse(args);
        assert_eq!(cli.lang.as_deref(), Some("sk"));
        assert_eq!(cli.config, Some(PathBuf::from("cfg.json")));
        assert_eq!(cli.image, Some(PathBuf::from("photo.jpg")));
    }
}
