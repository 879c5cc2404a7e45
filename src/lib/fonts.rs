//! Locating the anti-scraping fonts a chapter page embeds.
//!
//! The platform inlines its fonts as `data:` URLs inside `@font-face` rules. A page may carry
//! several (a stale font from the previous chapter, a fallback), so every candidate is returned
//! in the order it appears and the caller decides which one is usable.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

static FONT_FACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"@font-face\s*\{[^}]*?src:\s*url\(data:font/ttf;charset=utf-8;base64,([A-Za-z0-9+/=]+)\)",
    )
    .expect("font-face pattern is valid")
});

/// Raw TrueType data pulled out of a page, tagged with its position among the page's fonts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFont {
    /// Zero-based encounter order within the page
    pub index: usize,
    pub data: Vec<u8>,
}

/// A candidate whose base64 payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub index: usize,
    pub message: String,
}

pub type FontCandidate = Result<EmbeddedFont, DecodeFailure>;

/// Returns every inline TrueType payload in `markup`, decoded or not, in encounter order.
pub fn extract_font_candidates(markup: &str) -> Vec<FontCandidate> {
    FONT_FACE_RE
        .captures_iter(markup)
        .enumerate()
        .map(|(index, caps)| {
            let payload = &caps[1];
            BASE64
                .decode(payload)
                .map(|data| {
                    debug!("font candidate #{}: {} bytes", index, data.len());
                    EmbeddedFont { index, data }
                })
                .map_err(|e| DecodeFailure {
                    index,
                    message: e.to_string(),
                })
        })
        .collect()
}

/// Returns the decodable fonts in `markup`, logging and skipping the malformed ones.
///
/// An empty vector means the page embeds no font at all, which the caller treats the same
/// way as "no usable font".
pub fn extract_fonts(markup: &str) -> Vec<EmbeddedFont> {
    extract_font_candidates(markup)
        .into_iter()
        .filter_map(|candidate| match candidate {
            Ok(font) => Some(font),
            Err(failure) => {
                warn!(
                    "Skipping font candidate #{}: invalid base64 ({})",
                    failure.index, failure.message
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font_face(payload: &str) -> String {
        format!(
            "@font-face {{ font-family: f; src: url(data:font/ttf;charset=utf-8;base64,{}) format('truetype'); }}",
            payload
        )
    }

    #[test]
    fn test_no_font_face_gives_empty() {
        assert!(extract_fonts("<html><p>plain</p></html>").is_empty());
        assert!(extract_font_candidates("").is_empty());
    }

    #[test]
    fn test_decodes_all_candidates_in_order() {
        let markup = format!(
            "<style>{}</style><p>x</p><style>{}</style>",
            font_face(&BASE64.encode(b"first")),
            font_face(&BASE64.encode(b"second"))
        );
        let fonts = extract_fonts(&markup);
        assert_eq!(fonts.len(), 2);
        assert_eq!(fonts[0].data, b"first");
        assert_eq!(fonts[0].index, 0);
        assert_eq!(fonts[1].data, b"second");
        assert_eq!(fonts[1].index, 1);
    }

    #[test]
    fn test_malformed_candidate_is_skipped_not_fatal() {
        // "A" alone is not a valid base64 quantum
        let markup = format!("{}{}", font_face("A"), font_face(&BASE64.encode(b"ok")));
        let candidates = extract_font_candidates(&markup);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].is_err());

        let fonts = extract_fonts(&markup);
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].index, 1);
        assert_eq!(fonts[0].data, b"ok");
    }

    #[test]
    fn test_other_properties_before_src_are_tolerated() {
        let markup = format!(
            "@font-face\n{{\n  font-family: 'x';\n  font-display: block;\n  src:   url(data:font/ttf;charset=utf-8;base64,{});\n}}",
            BASE64.encode(b"font")
        );
        let fonts = extract_fonts(&markup);
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].data, b"font");
    }

    #[test]
    fn test_non_ttf_data_urls_are_ignored() {
        let markup = "@font-face { src: url(data:font/woff2;base64,AAAA) }";
        assert!(extract_font_candidates(markup).is_empty());
    }
}
