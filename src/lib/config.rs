//! Configuration for downloads, HTTP sessions and glyph recognition.
//!
//! Configuration is read from a TOML file. Every key is optional; anything missing or malformed
//! falls back to the built-in default, so an empty file is a valid configuration.
//!
//! # Configuration Structure
//!
//! - `download` says where chapters and the cookie file live
//! - `http` holds the request headers and the politeness delays
//! - `recognition` tunes glyph rendering, the acceptance threshold and the OCR engine
//!
//! # Configuration Example
//!
//! ```toml
//! [download]
//! directory = "download"
//! cookie_file = "cookies.txt"
//!
//! [http]
//! accept_language = "zh-CN,zh;q=0.9"
//! fetch_delay_secs = 2.0
//! chapter_delay_secs = 5.0
//!
//! [recognition]
//! canvas_size = 128
//! font_scale = 0.7
//! min_distinct = 10
//! tesseract = "tesseract"
//! language = "chi_sim"
//! psm = 10
//! ```
//!
//! The cookie string itself is kept out of this file. It lives in its own plain-text file (see
//! [`load_cookies`]) so it can be pasted straight from a browser.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use toml::Value;

use crate::mapping::DEFAULT_MIN_DISTINCT;
use crate::pipeline::PipelineSettings;
use crate::raster::RasterOptions;
use crate::restore::RestoreOptions;
use crate::DeglyphError;

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "deglyphrc.toml";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9";

/// Configuration source.
/// Determines where the TOML configuration should be loaded from.
#[derive(Debug, Clone)]
pub enum ConfigSource<'a> {
    /// Use built-in defaults
    Default,
    /// Load configuration from a file path
    File(&'a str),
    /// Use a TOML string directly
    Embedded(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub cookie_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub user_agent: String,
    pub accept_language: String,
    /// Sleep after every page fetch
    pub fetch_delay: Duration,
    /// Extra sleep between chapters when walking a whole book
    pub chapter_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionConfig {
    pub canvas_size: u32,
    pub font_scale: f32,
    pub min_distinct: usize,
    /// Path or name of the tesseract binary
    pub tesseract: String,
    pub language: String,
    /// Tesseract page segmentation mode; 10 treats the image as a single character
    pub psm: u8,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeglyphConfig {
    pub download: DownloadConfig,
    pub http: HttpConfig,
    pub recognition: RecognitionConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            directory: PathBuf::from("download"),
            cookie_file: PathBuf::from("cookies.txt"),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            fetch_delay: Duration::from_secs(2),
            chapter_delay: Duration::from_secs(5),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        let raster = RasterOptions::default();
        RecognitionConfig {
            canvas_size: raster.canvas_size,
            font_scale: raster.font_scale,
            min_distinct: DEFAULT_MIN_DISTINCT,
            tesseract: "tesseract".to_string(),
            language: "chi_sim".to_string(),
            psm: 10,
        }
    }
}

impl DeglyphConfig {
    /// Pipeline knobs derived from the `[recognition]` section.
    pub fn pipeline_settings(&self, punct_replace: bool) -> PipelineSettings {
        PipelineSettings {
            raster: RasterOptions {
                canvas_size: self.recognition.canvas_size,
                font_scale: self.recognition.font_scale,
            },
            min_distinct: self.recognition.min_distinct,
            restore: RestoreOptions { punct_replace },
        }
    }
}

fn get_str(section: Option<&Value>, key: &str) -> Option<String> {
    section
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Accepts both `2` and `2.5`.
fn get_secs(section: Option<&Value>, key: &str) -> Option<Duration> {
    let value = section.and_then(|s| s.get(key))?;
    let secs = value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn get_uint(section: Option<&Value>, key: &str) -> Option<u64> {
    section
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .filter(|i| *i > 0)
        .map(|i| i as u64)
}

/// Parses a configuration string.
///
/// Invalid TOML yields the defaults; individual keys with the wrong type or an out-of-range
/// value are ignored.
///
/// # Example
/// ```rust
/// use deglyph::config::parse_config_string;
///
/// let config = parse_config_string(r#"
/// [recognition]
/// min_distinct = 12
/// language = "chi_tra"
/// "#);
/// assert_eq!(config.recognition.min_distinct, 12);
/// assert_eq!(config.recognition.language, "chi_tra");
/// assert_eq!(config.recognition.canvas_size, 128);
/// ```
pub fn parse_config_string(config_str: &str) -> DeglyphConfig {
    let config: Value = match toml::from_str(config_str) {
        Ok(v) => v,
        Err(e) => {
            warn!("Ignoring invalid configuration: {}", e);
            return DeglyphConfig::default();
        }
    };
    let defaults = DeglyphConfig::default();

    let download = config.get("download");
    let http = config.get("http");
    let recognition = config.get("recognition");

    DeglyphConfig {
        download: DownloadConfig {
            directory: get_str(download, "directory")
                .map(PathBuf::from)
                .unwrap_or(defaults.download.directory),
            cookie_file: get_str(download, "cookie_file")
                .map(PathBuf::from)
                .unwrap_or(defaults.download.cookie_file),
        },
        http: HttpConfig {
            user_agent: get_str(http, "user_agent").unwrap_or(defaults.http.user_agent),
            accept_language: get_str(http, "accept_language")
                .unwrap_or(defaults.http.accept_language),
            fetch_delay: get_secs(http, "fetch_delay_secs").unwrap_or(defaults.http.fetch_delay),
            chapter_delay: get_secs(http, "chapter_delay_secs")
                .unwrap_or(defaults.http.chapter_delay),
        },
        recognition: RecognitionConfig {
            canvas_size: get_uint(recognition, "canvas_size")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.recognition.canvas_size),
            font_scale: recognition
                .and_then(|r| r.get("font_scale"))
                .and_then(|v| v.as_float())
                .filter(|f| *f > 0.0 && *f <= 1.0)
                .map(|f| f as f32)
                .unwrap_or(defaults.recognition.font_scale),
            min_distinct: get_uint(recognition, "min_distinct")
                .map(|v| v as usize)
                .unwrap_or(defaults.recognition.min_distinct),
            tesseract: get_str(recognition, "tesseract").unwrap_or(defaults.recognition.tesseract),
            language: get_str(recognition, "language").unwrap_or(defaults.recognition.language),
            psm: get_uint(recognition, "psm")
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(defaults.recognition.psm),
        },
    }
}

/// Loads the configuration from `source`. A file that cannot be read yields the defaults.
pub fn load_config_from_source(source: ConfigSource) -> DeglyphConfig {
    match source {
        ConfigSource::Default => DeglyphConfig::default(),
        ConfigSource::File(path) => {
            let config_str = match fs::read_to_string(Path::new(path)) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Could not read config file {}: {}", path, e);
                    return DeglyphConfig::default();
                }
            };
            debug!("Loaded configuration from {}", path);
            parse_config_string(&config_str)
        }
        ConfigSource::Embedded(content) => parse_config_string(content),
    }
}

/// Looks for a configuration file when none was given explicitly.
///
/// Priority order:
/// 1. `deglyphrc.toml` in the working directory
/// 2. `deglyph/deglyphrc.toml` in the user configuration directory
pub fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("deglyph").join(DEFAULT_CONFIG_FILE))
        .filter(|p| p.exists())
}

/// Renders the default configuration as TOML.
pub fn default_config_toml() -> String {
    let c = DeglyphConfig::default();
    format!(
        r#"# deglyph configuration

[download]
# Where chapters are saved
directory = "{directory}"
# Plain-text file holding the raw browser cookie string (name=value; name2=value2)
cookie_file = "{cookie_file}"

[http]
user_agent = "{user_agent}"
accept_language = "{accept_language}"
# Seconds to sleep after each page fetch
fetch_delay_secs = {fetch_delay:.1}
# Seconds to sleep between chapters with --auto
chapter_delay_secs = {chapter_delay:.1}

[recognition]
# Square canvas each glyph is drawn on, in pixels
canvas_size = {canvas_size}
# Font size as a fraction of the canvas
font_scale = {font_scale:.1}
# A font is trusted once its glyphs resolve to this many different characters
min_distinct = {min_distinct}
tesseract = "{tesseract}"
language = "{language}"
psm = {psm}
"#,
        directory = c.download.directory.display(),
        cookie_file = c.download.cookie_file.display(),
        user_agent = c.http.user_agent,
        accept_language = c.http.accept_language,
        fetch_delay = c.http.fetch_delay.as_secs_f64(),
        chapter_delay = c.http.chapter_delay.as_secs_f64(),
        canvas_size = c.recognition.canvas_size,
        font_scale = c.recognition.font_scale,
        min_distinct = c.recognition.min_distinct,
        tesseract = c.recognition.tesseract,
        language = c.recognition.language,
        psm = c.recognition.psm,
    )
}

/// Reads the raw cookie string from `path`.
///
/// A missing file is created empty so the operator knows where to paste the cookies; both a
/// missing and an empty file are errors, and nothing should be fetched without credentials.
pub fn load_cookies(path: &Path) -> Result<String, DeglyphError> {
    let suggestion = format!(
        "Paste your browser's cookie string into {} and run again",
        path.display()
    );
    if !path.exists() {
        fs::write(path, "").map_err(|e| DeglyphError::io(e, path))?;
        return Err(DeglyphError::CredentialsError {
            path: path.display().to_string(),
            message: "Cookie file not found; an empty one has been created".to_string(),
            suggestion,
        });
    }
    let cookies = fs::read_to_string(path).map_err(|e| DeglyphError::io(e, path))?;
    let cookies = cookies.trim();
    if cookies.is_empty() {
        return Err(DeglyphError::CredentialsError {
            path: path.display().to_string(),
            message: "Cookie file is empty".to_string(),
            suggestion,
        });
    }
    Ok(cookies.to_string())
}
