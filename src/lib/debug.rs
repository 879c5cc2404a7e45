//! Glyph dumps for looking at what the OCR engine is shown.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::ocr::GlyphClassifier;
use crate::raster::GlyphImage;
use crate::DeglyphError;

/// File name a glyph is dumped under, e.g. `U+E00A.png`.
pub fn glyph_file_name(glyph: &GlyphImage) -> String {
    format!("U+{:04X}.png", glyph.source as u32)
}

/// Saves a glyph bitmap as PNG into `dir`.
pub fn save_glyph(glyph: &GlyphImage, dir: &Path) -> Result<PathBuf, DeglyphError> {
    let path = dir.join(glyph_file_name(glyph));
    let png = glyph.to_png().map_err(|e| DeglyphError::IoError {
        message: format!("could not encode glyph: {}", e),
        path: path.display().to_string(),
        suggestion: "This is a bug; please report it".to_string(),
    })?;
    fs::write(&path, png).map_err(|e| DeglyphError::io(e, &path))?;
    Ok(path)
}

/// Wraps a classifier and writes every glyph it is asked about to a directory first.
///
/// Glyphs from later fonts overwrite earlier ones with the same codepoint, so the directory
/// always shows the most recent font. Failing to write a dump is logged, never fatal.
pub struct DumpingClassifier<C> {
    inner: C,
    dir: PathBuf,
}

impl<C: GlyphClassifier> DumpingClassifier<C> {
    pub fn new(inner: C, dir: impl Into<PathBuf>) -> Result<Self, DeglyphError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| DeglyphError::io(e, &dir))?;
        Ok(DumpingClassifier { inner, dir })
    }
}

impl<C: GlyphClassifier> GlyphClassifier for DumpingClassifier<C> {
    fn classify(&mut self, glyph: &GlyphImage) -> Result<Option<char>, DeglyphError> {
        match save_glyph(glyph, &self.dir) {
            Ok(path) => debug!("dumped {}", path.display()),
            Err(e) => warn!("Could not dump glyph U+{:04X}: {}", glyph.source as u32, e),
        }
        self.inner.classify(glyph)
    }
}
