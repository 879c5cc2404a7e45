//! The deglyph library recovers readable chapter text from web pages that scramble their
//! characters with an embedded anti-scraping font.
//!
//! Such pages ship a per-chapter TrueType font whose glyph for codepoint `X` actually draws some
//! unrelated character `Y`. A browser shows `Y`; anyone copying the text gets `X`. deglyph undoes
//! this by looking at the glyphs the way a reader does:
//!
//! ```text
//! +-------------+     +----------------+     +----------------+
//! |  Page       |     |  Font          |     |  Glyph         |
//! |  markup     | --> |  extractor     | --> |  rasterizer    |
//! |  @font-face |     |  base64 -> TTF |     |  128x128 bmp   |
//! +-------------+     +----------------+     +----------------+
//!                                                    |
//! +---------------+     +------------------+     +--------------+
//! | Restored      |     | Substitution     |     | OCR          |
//! | chapter text  | <-- | map (>= 10       | <-- | classifier   |
//! | + formatting  |     | distinct chars)  |     | per glyph    |
//! +---------------+     +------------------+     +--------------+
//! ```
//!
//! The pipeline itself is pure: [`restore_chapter`] turns markup into recovered text given a
//! [`ocr::GlyphClassifier`], and [`next_chapter_url`] finds the link to the following chapter.
//! Fetching pages, sleeping between requests and writing files live in [`walker`], [`fetch`]
//! and [`store`], so a single chapter or a whole book can be processed without touching the core.
//!
//! ```rust
//! use deglyph::{restore_text, RestoreOptions, SubstitutionMapBuilder};
//!
//! let mut builder = SubstitutionMapBuilder::new(3);
//! builder.record('\u{e000}', Ok(Some('我')));
//! builder.record('\u{e001}', Ok(Some('们')));
//! builder.record('\u{e002}', Ok(Some('好')));
//! let map = builder.finish().unwrap();
//!
//! let text = restore_text("广\u{e000}\u{e001}\u{e002}上", &map, RestoreOptions::default());
//! assert_eq!(text.as_deref(), Some("「我们好」"));
//! ```

pub mod config;
pub mod debug;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod fonts;
pub mod mapping;
pub mod ocr;
pub mod page;
pub mod pipeline;
pub mod raster;
pub mod restore;
pub mod store;
pub mod walker;

pub use mapping::{SubstitutionMap, SubstitutionMapBuilder};
pub use page::next_chapter_url;
pub use pipeline::{decode_substitution_map, restore_chapter, PipelineSettings, RestoredChapter};
pub use restore::{restore_text, RestoreOptions};

use std::error::Error;
use std::fmt;

/// Errors surfaced by the deobfuscation pipeline and the plumbing around it.
///
/// Most pipeline failures are deliberately *not* errors: a bad font candidate or a glyph the OCR
/// engine cannot read is logged and skipped. What remains here either stops a chapter (network)
/// or stops the program before it starts (credentials, configuration).
#[derive(Debug)]
pub enum DeglyphError {
    /// Fetching a chapter page failed
    NetworkError {
        url: String,
        message: String,
        suggestion: Option<String>,
    },
    /// An embedded font candidate could not be decoded or parsed
    FontError {
        candidate: usize,
        message: String,
    },
    /// The OCR engine failed on a glyph
    OcrError { message: String, suggestion: String },
    /// The cookie file is missing or empty
    CredentialsError {
        path: String,
        message: String,
        suggestion: String,
    },
    /// Indicates an invalid configuration
    ConfigError { message: String, suggestion: String },
    /// Indicates an I/O error
    IoError {
        message: String,
        path: String,
        suggestion: String,
    },
}

impl Error for DeglyphError {}
impl fmt::Display for DeglyphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeglyphError::NetworkError {
                url,
                message,
                suggestion,
            } => {
                write!(f, "❌ Network Error: {}", message)?;
                write!(f, "\n🌐 URL: {}", url)?;
                if let Some(hint) = suggestion {
                    write!(f, "\n💡 Suggestion: {}", hint)?;
                }
                Ok(())
            }
            DeglyphError::FontError { candidate, message } => {
                write!(f, "❌ Font Error: candidate #{} unusable", candidate)?;
                write!(f, "\n   Reason: {}", message)
            }
            DeglyphError::OcrError {
                message,
                suggestion,
            } => {
                write!(f, "❌ OCR Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            DeglyphError::CredentialsError {
                path,
                message,
                suggestion,
            } => {
                write!(f, "❌ Credentials Error: {}", message)?;
                write!(f, "\n📁 Path: {}", path)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            DeglyphError::ConfigError {
                message,
                suggestion,
            } => {
                write!(f, "❌ Configuration Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
            DeglyphError::IoError {
                message,
                path,
                suggestion,
            } => {
                write!(f, "❌ File Error: {}", message)?;
                write!(f, "\n📁 Path: {}", path)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)
            }
        }
    }
}

impl DeglyphError {
    /// Wraps an I/O failure on `path` with a generic permissions hint.
    pub fn io(err: std::io::Error, path: impl AsRef<std::path::Path>) -> Self {
        let suggestion = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                "Check that you have write permissions for this location"
            }
            std::io::ErrorKind::NotFound => "Make sure the directory exists",
            _ => "Check available disk space and the path spelling",
        };
        DeglyphError::IoError {
            message: err.to_string(),
            path: path.as_ref().display().to_string(),
            suggestion: suggestion.to_string(),
        }
    }

    /// Creates a network error for `url` without a specific hint.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        DeglyphError::NetworkError {
            url: url.into(),
            message: message.into(),
            suggestion: None,
        }
    }
}
