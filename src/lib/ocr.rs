//! The OCR side of the pipeline: something that looks at a glyph image and names the character.
//!
//! The recognizer is a black box behind [`GlyphClassifier`]. The bundled implementation shells
//! out to the `tesseract` binary; closures can stand in for it when the answers are known.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use log::trace;

use crate::config::RecognitionConfig;
use crate::raster::GlyphImage;
use crate::DeglyphError;

/// Names the character a glyph image shows.
///
/// Called once per glyph in a font, hundreds of times per chapter. `Ok(None)` means "nothing
/// recognizable"; an `Err` is a failure of the engine on this glyph only. Neither stops the
/// pipeline.
pub trait GlyphClassifier {
    fn classify(&mut self, glyph: &GlyphImage) -> Result<Option<char>, DeglyphError>;
}

impl<F> GlyphClassifier for F
where
    F: FnMut(&GlyphImage) -> Option<char>,
{
    fn classify(&mut self, glyph: &GlyphImage) -> Result<Option<char>, DeglyphError> {
        Ok(self(glyph))
    }
}

/// Runs `tesseract` in single-character mode on each glyph.
#[derive(Debug, Clone)]
pub struct TesseractClassifier {
    binary: PathBuf,
    language: String,
    psm: u8,
}

impl TesseractClassifier {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>, psm: u8) -> Self {
        TesseractClassifier {
            binary: binary.into(),
            language: language.into(),
            psm,
        }
    }

    pub fn from_config(config: &RecognitionConfig) -> Self {
        TesseractClassifier::new(&config.tesseract, &config.language, config.psm)
    }

    /// Checks that the binary can be started at all, so a missing install is reported once
    /// instead of once per glyph.
    pub fn probe(&self) -> Result<(), DeglyphError> {
        let out = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !out.status.success() {
            return Err(DeglyphError::OcrError {
                message: format!("{} --version exited with {}", self.binary.display(), out.status),
                suggestion: "Check the tesseract installation".to_string(),
            });
        }
        Ok(())
    }

    fn spawn_error(&self, e: std::io::Error) -> DeglyphError {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeglyphError::OcrError {
                message: format!("OCR engine '{}' not found", self.binary.display()),
                suggestion: format!(
                    "Install tesseract with the '{}' language data, or set [recognition] tesseract in the config",
                    self.language
                ),
            }
        } else {
            DeglyphError::OcrError {
                message: format!("failed to start '{}': {}", self.binary.display(), e),
                suggestion: "Check the tesseract installation".to_string(),
            }
        }
    }
}

impl GlyphClassifier for TesseractClassifier {
    fn classify(&mut self, glyph: &GlyphImage) -> Result<Option<char>, DeglyphError> {
        if glyph.is_blank() {
            return Ok(None);
        }

        let png = glyph.to_png().map_err(|e| DeglyphError::OcrError {
            message: format!("could not encode glyph U+{:04X}: {}", glyph.source as u32, e),
            suggestion: "This is a bug; please report it".to_string(),
        })?;

        // Removed when `input` drops, on every return path.
        let mut input = tempfile::Builder::new()
            .prefix("deglyph-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| DeglyphError::io(e, std::env::temp_dir()))?;
        input
            .write_all(&png)
            .map_err(|e| DeglyphError::io(e, input.path()))?;

        let out = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !out.status.success() {
            return Err(DeglyphError::OcrError {
                message: format!(
                    "tesseract exited with {}: {}",
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
                suggestion: format!("Check that the '{}' language data is installed", self.language),
            });
        }

        let text = String::from_utf8_lossy(&out.stdout);
        trace!("tesseract U+{:04X}: {:?}", glyph.source as u32, text);
        Ok(first_recognized_char(&text))
    }
}

/// First printable character of an OCR answer.
pub fn first_recognized_char(text: &str) -> Option<char> {
    text.chars().find(|c| !c.is_whitespace() && !c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn glyph(blank: bool) -> GlyphImage {
        let mut bitmap = GrayImage::from_pixel(16, 16, Luma([255]));
        if !blank {
            bitmap.put_pixel(8, 8, Luma([0]));
        }
        GlyphImage {
            source: '\u{e000}',
            bitmap,
        }
    }

    #[test]
    fn test_first_recognized_char_skips_noise() {
        assert_eq!(first_recognized_char("我\n"), Some('我'));
        assert_eq!(first_recognized_char("  \x0c天气"), Some('天'));
        assert_eq!(first_recognized_char("\n\x0c"), None);
        assert_eq!(first_recognized_char(""), None);
    }

    #[test]
    fn test_closures_are_classifiers() {
        let mut calls = 0;
        let mut c = |g: &GlyphImage| {
            calls += 1;
            if g.is_blank() {
                None
            } else {
                Some('口')
            }
        };
        assert_eq!(c.classify(&glyph(false)).unwrap(), Some('口'));
        assert_eq!(c.classify(&glyph(true)).unwrap(), None);
        drop(c);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_blank_glyph_skips_engine() {
        let mut t = TesseractClassifier::new("/nonexistent/tesseract", "chi_sim", 10);
        assert_eq!(t.classify(&glyph(true)).unwrap(), None);
    }

    #[test]
    fn test_missing_engine_is_an_ocr_error() {
        let mut t = TesseractClassifier::new("/nonexistent/tesseract", "chi_sim", 10);
        match t.classify(&glyph(false)) {
            Err(DeglyphError::OcrError { message, .. }) => assert!(message.contains("not found")),
            other => panic!("expected OcrError, got {:?}", other),
        }
        assert!(matches!(t.probe(), Err(DeglyphError::OcrError { .. })));
    }
}
