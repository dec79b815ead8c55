//! Configuration resolution: CLI arguments override the config file, which
//! overrides built-in defaults. The config file is looked up at an explicit
//! `--config` path, then `./config.toml`, then the user config directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::{CandidateMode, CliArgs, OcrBinding};
use crate::overlay::DumpFormat;
use crate::source::Backend;
use platewatch_detect::CandidatePolicy;
use platewatch_ocr::WireFormat;
use platewatch_types::Region;

pub const DEFAULT_MIN_INTERVAL_MS: u64 = 300;
pub const DEFAULT_PRE_ENLARGE_PERCENT: u32 = 150;
pub const DEFAULT_SKEW_STEP_DEGREES: f64 = 1.0;
pub const DEFAULT_SKEW_LIMIT_DEGREES: f64 = 15.0;
pub const DEFAULT_SHARPEN_SCALE: u32 = 2;
pub const DEFAULT_JPEG_QUALITY: u8 = platewatch_ocr::DEFAULT_JPEG_QUALITY;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    cascade: Option<String>,
    ocr_binding: Option<String>,
    ocr_url: Option<String>,
    wire_format: Option<String>,
    jpeg_quality: Option<u8>,
    every_nth_frame: Option<u64>,
    min_interval_ms: Option<u64>,
    single_flight: Option<bool>,
    candidates: Option<String>,
    pre_enlarge_percent: Option<u32>,
    skew_step_degrees: Option<f64>,
    skew_limit_degrees: Option<f64>,
    sharpen_scale: Option<u32>,
    dump_dir: Option<String>,
    dump_format: Option<String>,
    roi: Option<String>,
    channel_capacity: Option<usize>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub backend: Option<Backend>,
    pub cascade: Option<PathBuf>,
    pub ocr_binding: OcrBinding,
    pub ocr_url: String,
    pub wire_format: WireFormat,
    pub jpeg_quality: u8,
    pub every_nth_frame: Option<u64>,
    pub min_interval: Option<Duration>,
    pub single_flight: bool,
    pub candidates: CandidatePolicy,
    pub pre_enlarge_percent: u32,
    pub skew_step_degrees: f64,
    pub skew_limit_degrees: f64,
    pub sharpen_scale: u32,
    pub dump_dir: Option<PathBuf>,
    pub dump_format: DumpFormat,
    pub roi: Option<Region>,
    pub channel_capacity: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for '{field}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("config file {path} does not exist")]
    NotFound { path: PathBuf },
}

pub fn resolve_settings(cli: &CliArgs) -> Result<EffectiveSettings, ConfigError> {
    let file = load_config(cli.config.as_deref())?;
    merge(cli, file)
}

fn load_config(path_override: Option<&Path>) -> Result<FileConfig, ConfigError> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return read_config(path);
    }
    if let Some(project_path) = project_config_path()
        && project_path.exists()
    {
        return read_config(&project_path);
    }
    if let Some(default_path) = default_config_path()
        && default_path.exists()
    {
        return read_config(&default_path);
    }
    Ok(FileConfig::default())
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(cli: &CliArgs, file: FileConfig) -> Result<EffectiveSettings, ConfigError> {
    let backend = match normalize_string(cli.backend.clone()).or_else(|| normalize_string(file.backend))
    {
        Some(name) => Some(Backend::from_str(&name).map_err(|_| ConfigError::InvalidValue {
            field: "backend",
            value: name,
        })?),
        None => None,
    };

    let cascade = cli
        .cascade
        .clone()
        .or_else(|| normalize_string(file.cascade).map(PathBuf::from));

    let ocr_binding = match cli.ocr_binding {
        Some(binding) => binding,
        None => match normalize_string(file.ocr_binding) {
            Some(name) => parse_ocr_binding(&name)?,
            None => OcrBinding::Remote,
        },
    };

    let ocr_url = normalize_string(cli.ocr_url.clone())
        .or_else(|| normalize_string(file.ocr_url))
        .unwrap_or_else(|| platewatch_ocr::DEFAULT_ENDPOINT.to_string());

    let wire_format = match normalize_string(cli.wire_format.clone())
        .or_else(|| normalize_string(file.wire_format))
    {
        Some(name) => WireFormat::from_str(&name).map_err(|_| ConfigError::InvalidValue {
            field: "wire_format",
            value: name,
        })?,
        None => WireFormat::default(),
    };

    let jpeg_quality = file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    if jpeg_quality == 0 || jpeg_quality > 100 {
        return Err(ConfigError::InvalidValue {
            field: "jpeg_quality",
            value: jpeg_quality.to_string(),
        });
    }

    let every_nth_frame = cli.every_nth_frame.or(file.every_nth_frame);
    if let Some(0) = every_nth_frame {
        return Err(ConfigError::InvalidValue {
            field: "every_nth_frame",
            value: "0".to_string(),
        });
    }

    let min_interval_ms = cli
        .min_interval_ms
        .or(file.min_interval_ms)
        .unwrap_or(DEFAULT_MIN_INTERVAL_MS);
    let min_interval = (min_interval_ms > 0).then(|| Duration::from_millis(min_interval_ms));

    let single_flight = if cli.allow_overlap {
        false
    } else {
        file.single_flight.unwrap_or(true)
    };

    let candidates = match cli.candidates {
        Some(CandidateMode::SingleBest) => CandidatePolicy::SingleBest,
        Some(CandidateMode::All) => CandidatePolicy::AllCandidates,
        None => match normalize_string(file.candidates) {
            Some(name) => parse_candidates(&name)?,
            None => CandidatePolicy::SingleBest,
        },
    };

    let pre_enlarge_percent = cli
        .pre_enlarge_percent
        .or(file.pre_enlarge_percent)
        .unwrap_or(DEFAULT_PRE_ENLARGE_PERCENT);

    let skew_step_degrees = file.skew_step_degrees.unwrap_or(DEFAULT_SKEW_STEP_DEGREES);
    let skew_limit_degrees = file.skew_limit_degrees.unwrap_or(DEFAULT_SKEW_LIMIT_DEGREES);
    if skew_step_degrees <= 0.0 || skew_limit_degrees < 0.0 {
        return Err(ConfigError::InvalidValue {
            field: "skew_step_degrees",
            value: format!("{skew_step_degrees}/{skew_limit_degrees}"),
        });
    }

    let sharpen_scale = file.sharpen_scale.unwrap_or(DEFAULT_SHARPEN_SCALE);
    if sharpen_scale == 0 || sharpen_scale > 8 {
        return Err(ConfigError::InvalidValue {
            field: "sharpen_scale",
            value: sharpen_scale.to_string(),
        });
    }

    let dump_dir = cli
        .dump_dir
        .clone()
        .or_else(|| normalize_string(file.dump_dir).map(PathBuf::from));
    let dump_format = match cli.dump_format {
        Some(format) => format,
        None => match normalize_string(file.dump_format) {
            Some(name) => parse_dump_format(&name)?,
            None => DumpFormat::default(),
        },
    };

    let roi = match normalize_string(cli.roi.clone()).or_else(|| normalize_string(file.roi)) {
        Some(raw) => Some(parse_roi(&raw)?),
        None => None,
    };

    let channel_capacity = file.channel_capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY);
    if channel_capacity == 0 {
        return Err(ConfigError::InvalidValue {
            field: "channel_capacity",
            value: "0".to_string(),
        });
    }

    Ok(EffectiveSettings {
        backend,
        cascade,
        ocr_binding,
        ocr_url,
        wire_format,
        jpeg_quality,
        every_nth_frame,
        min_interval,
        single_flight,
        candidates,
        pre_enlarge_percent,
        skew_step_degrees,
        skew_limit_degrees,
        sharpen_scale,
        dump_dir,
        dump_format,
        roi,
        channel_capacity,
    })
}

fn parse_ocr_binding(value: &str) -> Result<OcrBinding, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "remote" => Ok(OcrBinding::Remote),
        "stub" => Ok(OcrBinding::Stub),
        "tesseract" => Ok(OcrBinding::Tesseract),
        other => Err(ConfigError::InvalidValue {
            field: "ocr_binding",
            value: other.to_string(),
        }),
    }
}

fn parse_candidates(value: &str) -> Result<CandidatePolicy, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "single-best" | "single_best" => Ok(CandidatePolicy::SingleBest),
        "all" => Ok(CandidatePolicy::AllCandidates),
        other => Err(ConfigError::InvalidValue {
            field: "candidates",
            value: other.to_string(),
        }),
    }
}

fn parse_dump_format(value: &str) -> Result<DumpFormat, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => Ok(DumpFormat::Jpeg),
        "png" => Ok(DumpFormat::Png),
        other => Err(ConfigError::InvalidValue {
            field: "dump_format",
            value: other.to_string(),
        }),
    }
}

fn parse_roi(value: &str) -> Result<Region, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        field: "roi",
        value: value.to_string(),
    };
    let parts: Vec<u32> = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    let [x, y, w, h] = parts.as_slice() else {
        return Err(invalid());
    };
    if *w == 0 || *h == 0 {
        return Err(invalid());
    }
    Ok(Region::new(*x, *y, *w, *h))
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "platewatch", "platewatch")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join("config.toml"))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("platewatch").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let settings = merge(&cli(&[]), FileConfig::default()).unwrap();
        assert_eq!(settings.min_interval, Some(Duration::from_millis(300)));
        assert!(settings.single_flight);
        assert_eq!(settings.pre_enlarge_percent, 150);
        assert_eq!(settings.skew_limit_degrees, 15.0);
        assert_eq!(settings.sharpen_scale, 2);
        assert_eq!(settings.jpeg_quality, 70);
        assert_eq!(settings.ocr_url, "http://127.0.0.1:5000/recognize");
        assert_eq!(settings.candidates, CandidatePolicy::SingleBest);
    }

    #[test]
    fn cli_overrides_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            ocr_url = "http://box:9000/recognize"
            min_interval_ms = 500
            candidates = "all"
            "#,
        )
        .unwrap();
        let settings = merge(
            &cli(&["--ocr-url", "http://other:5000/recognize", "--candidates", "single-best"]),
            file,
        )
        .unwrap();
        assert_eq!(settings.ocr_url, "http://other:5000/recognize");
        assert_eq!(settings.candidates, CandidatePolicy::SingleBest);
        // untouched by CLI, the file wins
        assert_eq!(settings.min_interval, Some(Duration::from_millis(500)));
    }

    #[test]
    fn roi_string_parses_and_validates() {
        let settings = merge(&cli(&["--roi", "10, 20, 300, 120"]), FileConfig::default()).unwrap();
        assert_eq!(settings.roi, Some(Region::new(10, 20, 300, 120)));
        assert!(merge(&cli(&["--roi", "10,20,0,120"]), FileConfig::default()).is_err());
        assert!(merge(&cli(&["--roi", "10,20,300"]), FileConfig::default()).is_err());
    }

    #[test]
    fn invalid_enumerations_are_rejected() {
        let file: FileConfig = toml::from_str(r#"wire_format = "msgpack""#).unwrap();
        assert!(matches!(
            merge(&cli(&[]), file),
            Err(ConfigError::InvalidValue { field: "wire_format", .. })
        ));
        let file: FileConfig = toml::from_str(r#"jpeg_quality = 0"#).unwrap();
        assert!(merge(&cli(&[]), file).is_err());
    }

    #[test]
    fn allow_overlap_disables_the_in_flight_gate() {
        let settings = merge(&cli(&["--allow-overlap"]), FileConfig::default()).unwrap();
        assert!(!settings.single_flight);
    }
}
