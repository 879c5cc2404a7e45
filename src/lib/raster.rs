//! Glyph rasterization: every codepoint a font maps, drawn black on white.
//!
//! The character map is read with `skrifa`, which exposes the cmap subtable directly, and the
//! outlines are drawn with `rusttype`. Both work from in-memory font data, so the embedded font
//! never has to be written to disk.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use log::debug;
use rusttype::{point, Font, Scale};
use skrifa::{FontRef, MetadataProvider};

use crate::DeglyphError;

/// Canvas and font size used when drawing glyphs for recognition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Width and height of the square canvas in pixels
    pub canvas_size: u32,
    /// Font pixel size as a fraction of `canvas_size`
    pub font_scale: f32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        RasterOptions {
            canvas_size: 128,
            font_scale: 0.7,
        }
    }
}

/// One codepoint drawn with the embedded font.
#[derive(Debug, Clone)]
pub struct GlyphImage {
    /// The (garbled) character this image was rendered from
    pub source: char,
    pub bitmap: GrayImage,
}

impl GlyphImage {
    /// True when no pixel was inked.
    pub fn is_blank(&self) -> bool {
        self.bitmap.pixels().all(|p| p.0[0] == 255)
    }

    /// Bounding box of inked pixels as `(min_x, min_y, max_x, max_y)`, inclusive.
    pub fn ink_bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in self.bitmap.enumerate_pixels() {
            if p.0[0] == 255 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        bounds
    }

    /// Encodes the bitmap as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Cursor::new(Vec::new());
        self.bitmap.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

/// Renders the glyphs of one embedded font.
///
/// The codepoint list is computed once; images are produced lazily by [`GlyphRasterizer::glyphs`],
/// which can be called again to restart from the first codepoint.
pub struct GlyphRasterizer {
    font: Font<'static>,
    codepoints: Vec<char>,
    options: RasterOptions,
}

impl GlyphRasterizer {
    /// Parses `data` and reads its character map.
    ///
    /// # Errors
    /// Returns [`DeglyphError::FontError`] when either parser rejects the data. `candidate` is
    /// only used to label the error.
    pub fn new(
        data: Vec<u8>,
        options: RasterOptions,
        candidate: usize,
    ) -> Result<Self, DeglyphError> {
        let codepoints = character_map(&data).map_err(|message| DeglyphError::FontError {
            candidate,
            message,
        })?;
        let font = Font::try_from_vec(data).ok_or_else(|| DeglyphError::FontError {
            candidate,
            message: "glyph outlines could not be loaded".to_string(),
        })?;
        debug!(
            "font candidate #{}: {} codepoints in cmap",
            candidate,
            codepoints.len()
        );
        Ok(GlyphRasterizer {
            font,
            codepoints,
            options,
        })
    }

    /// Codepoints the font claims to draw, ascending.
    pub fn codepoints(&self) -> &[char] {
        &self.codepoints
    }

    /// Lazily renders one image per codepoint.
    pub fn glyphs(&self) -> impl Iterator<Item = GlyphImage> + '_ {
        self.codepoints.iter().map(move |&c| self.render(c))
    }

    /// Draws `c` centered on a white canvas.
    ///
    /// Glyphs without ink (spaces, control characters) come back as a blank canvas.
    pub fn render(&self, c: char) -> GlyphImage {
        let size = self.options.canvas_size;
        let mut bitmap = GrayImage::from_pixel(size, size, Luma([255]));
        let scale = Scale::uniform(size as f32 * self.options.font_scale);
        let glyph = self.font.glyph(c).scaled(scale).positioned(point(0.0, 0.0));

        if let Some(bb) = glyph.pixel_bounding_box() {
            let offset_x = (size as i32 - bb.width()) / 2;
            let offset_y = (size as i32 - bb.height()) / 2;
            glyph.draw(|x, y, coverage| {
                let px = offset_x + x as i32;
                let py = offset_y + y as i32;
                if px < 0 || py < 0 || px >= size as i32 || py >= size as i32 {
                    return;
                }
                let ink = 255 - (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                let pixel = bitmap.get_pixel_mut(px as u32, py as u32);
                pixel.0[0] = pixel.0[0].min(ink);
            });
        }

        GlyphImage { source: c, bitmap }
    }
}

/// Reads the best cmap subtable. Entries pointing at `.notdef` and non-scalar values
/// (surrogates) are dropped.
fn character_map(data: &[u8]) -> Result<Vec<char>, String> {
    let font = FontRef::new(data).map_err(|e| format!("Failed to parse font: {:?}", e))?;
    let mut codepoints: Vec<char> = font
        .charmap()
        .mappings()
        .filter(|(_codepoint, glyph)| glyph.to_u32() != 0)
        .filter_map(|(codepoint, _glyph)| char::from_u32(codepoint))
        .collect();
    codepoints.sort_unstable();
    codepoints.dedup();
    Ok(codepoints)
}
