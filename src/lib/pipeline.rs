//! The pure core: markup in, recovered text out.
//!
//! Nothing here touches the network or the filesystem. The OCR engine is the only collaborator,
//! passed in by the caller.

use log::{info, warn};

use crate::fonts::extract_fonts;
use crate::mapping::{SubstitutionMap, SubstitutionMapBuilder, DEFAULT_MIN_DISTINCT};
use crate::ocr::GlyphClassifier;
use crate::page::ChapterPage;
use crate::raster::{GlyphRasterizer, RasterOptions};
use crate::restore::{restore_text, RestoreOptions};

/// Everything the pipeline needs besides the page and the classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub raster: RasterOptions,
    /// Distinct recognized characters required to accept a font
    pub min_distinct: usize,
    pub restore: RestoreOptions,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            raster: RasterOptions::default(),
            min_distinct: DEFAULT_MIN_DISTINCT,
            restore: RestoreOptions::default(),
        }
    }
}

/// An accepted map and the font candidate it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFont {
    /// Encounter index of the winning candidate
    pub candidate: usize,
    pub map: SubstitutionMap,
}

/// A chapter page after the pipeline ran over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredChapter {
    pub title: String,
    /// Paragraph text as served, newline-joined
    pub raw_text: String,
    /// Recovered text, or `None` when no embedded font produced a usable map
    pub restored_text: Option<String>,
    pub font: Option<DecodedFont>,
}

impl RestoredChapter {
    pub fn is_restored(&self) -> bool {
        self.restored_text.is_some()
    }
}

/// Tries each embedded font in page order and returns the first map that passes validation.
///
/// Undecodable or unparsable candidates are skipped with a warning; candidates whose map is
/// rejected are skipped too. Later candidates are not looked at once one is accepted.
pub fn decode_substitution_map<C>(
    markup: &str,
    classifier: &mut C,
    settings: &PipelineSettings,
) -> Option<DecodedFont>
where
    C: GlyphClassifier + ?Sized,
{
    for font in extract_fonts(markup) {
        let index = font.index;
        let rasterizer = match GlyphRasterizer::new(font.data, settings.raster, index) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping font candidate #{}: {}", index, e);
                continue;
            }
        };

        let mut builder = SubstitutionMapBuilder::new(settings.min_distinct);
        for glyph in rasterizer.glyphs() {
            let outcome = classifier.classify(&glyph);
            builder.record(glyph.source, outcome);
        }

        match builder.finish() {
            Ok(map) => {
                info!(
                    "Font candidate #{} accepted: {} glyphs, {} distinct characters",
                    index,
                    map.len(),
                    map.distinct_targets()
                );
                return Some(DecodedFont {
                    candidate: index,
                    map,
                });
            }
            Err(rejected) => {
                info!("Font candidate #{} rejected: {}", index, rejected);
            }
        }
    }
    None
}

/// Recovers the readable text of one chapter page.
///
/// # Arguments
/// * `markup` - The page HTML as served
/// * `classifier` - OCR engine used to read the embedded font's glyphs
/// * `settings` - Rendering, acceptance and formatting knobs
///
/// # Returns
/// The page title, its raw text and, when a font was accepted, the restored text.
pub fn restore_chapter<C>(
    markup: &str,
    classifier: &mut C,
    settings: &PipelineSettings,
) -> RestoredChapter
where
    C: GlyphClassifier + ?Sized,
{
    let page = ChapterPage::parse(markup);
    let raw_text = page.text();
    let font = decode_substitution_map(markup, classifier, settings);
    let restored_text = font
        .as_ref()
        .and_then(|decoded| restore_text(&raw_text, &decoded.map, settings.restore));
    if restored_text.is_none() {
        warn!("No valid font found for '{}'; text left unrestored", page.title);
    }
    RestoredChapter {
        title: page.title,
        raw_text,
        restored_text,
        font,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GlyphImage;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    const FIXTURE: &[u8] = include_bytes!("../../tests/fixtures/glyphs.ttf");
    const REAL: &str = "天地玄黄宇宙洪荒日月盈昃辰宿列张";

    fn font_face(data: &[u8]) -> String {
        format!(
            "<style>@font-face {{ font-family: secret; src: url(data:font/ttf;charset=utf-8;base64,{}) }}</style>",
            BASE64.encode(data)
        )
    }

    /// Reads glyph U+E000+i as the i-th character of `alphabet`.
    fn scripted(alphabet: &'static str) -> impl FnMut(&GlyphImage) -> Option<char> {
        move |g: &GlyphImage| {
            let offset = (g.source as u32).checked_sub(0xE000)? as usize;
            alphabet.chars().nth(offset)
        }
    }

    #[test]
    fn test_no_font_leaves_text_unrestored() {
        let mut ocr = scripted(REAL);
        let chapter = restore_chapter(
            "<h1>T</h1><p>\u{e000}</p>",
            &mut ocr,
            &PipelineSettings::default(),
        );
        assert_eq!(chapter.title, "T");
        assert_eq!(chapter.raw_text, "\u{e000}");
        assert!(!chapter.is_restored());
        assert!(chapter.font.is_none());
    }

    #[test]
    fn test_accepted_font_restores_text() {
        let markup = format!(
            "{}<h1>T</h1><p>\u{e000}\u{e001}\u{e002}\u{e003}</p>",
            font_face(FIXTURE)
        );
        let mut ocr = scripted(REAL);
        let chapter = restore_chapter(&markup, &mut ocr, &PipelineSettings::default());
        assert_eq!(chapter.restored_text.as_deref(), Some("天地玄黄"));
        let font = chapter.font.unwrap();
        assert_eq!(font.candidate, 0);
        // 15 inked glyphs recognized, the space glyph is not
        assert_eq!(font.map.len(), 15);
        assert_eq!(font.map.get(' '), None);
    }

    #[test]
    fn test_unparsable_candidate_skipped_for_next() {
        let markup = format!("{}{}", font_face(b"not a font"), font_face(FIXTURE));
        let mut ocr = scripted(REAL);
        let decoded =
            decode_substitution_map(&markup, &mut ocr, &PipelineSettings::default()).unwrap();
        assert_eq!(decoded.candidate, 1);
    }

    #[test]
    fn test_undecodable_candidate_keeps_page_numbering() {
        let broken = "<style>@font-face { src: url(data:font/ttf;charset=utf-8;base64,A) }</style>";
        let markup = format!("{}{}", broken, font_face(FIXTURE));
        let mut ocr = scripted(REAL);
        let decoded =
            decode_substitution_map(&markup, &mut ocr, &PipelineSettings::default()).unwrap();
        assert_eq!(decoded.candidate, 1);
        assert_eq!(decoded.map.get('\u{e000}'), Some('天'));
    }

    #[test]
    fn test_first_accepted_candidate_wins() {
        let markup = format!("{}{}", font_face(FIXTURE), font_face(FIXTURE));
        let mut calls = 0usize;
        let mut reader = scripted(REAL);
        let mut ocr = |g: &GlyphImage| {
            calls += 1;
            reader(g)
        };
        let decoded =
            decode_substitution_map(&markup, &mut ocr, &PipelineSettings::default()).unwrap();
        assert_eq!(decoded.candidate, 0);
        // one font's worth of glyphs: 15 private-use glyphs plus the space
        assert_eq!(calls, 16);
    }

    #[test]
    fn test_low_diversity_font_rejected() {
        let markup = format!("{}<p>\u{e000}</p>", font_face(FIXTURE));
        let mut ocr = |g: &GlyphImage| {
            if g.is_blank() {
                None
            } else {
                "口日目田".chars().nth(g.source as usize % 4)
            }
        };
        let chapter = restore_chapter(&markup, &mut ocr, &PipelineSettings::default());
        assert!(!chapter.is_restored());
        assert_eq!(chapter.raw_text, "\u{e000}");
    }

    #[test]
    fn test_restoration_is_deterministic() {
        let markup = format!("{}<p>广\u{e004}\u{e005}上</p>", font_face(FIXTURE));
        let settings = PipelineSettings::default();
        let first = restore_chapter(&markup, &mut scripted(REAL), &settings);
        let second = restore_chapter(&markup, &mut scripted(REAL), &settings);
        assert_eq!(first.restored_text.as_deref(), Some("「宇宙」"));
        assert_eq!(first, second);
    }
}
