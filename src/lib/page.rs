//! Reading a chapter page: its title, its (scrambled) paragraphs and the link to the next chapter.

use log::debug;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;

/// Title used when a page has no `<h1>`.
pub const UNTITLED: &str = "未找到标题";

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("h1 selector is valid"));
static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("p selector is valid"));

/// The text content of a chapter page, still in its scrambled form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPage {
    pub title: String,
    pub paragraphs: Vec<String>,
}

impl ChapterPage {
    pub fn parse(markup: &str) -> Self {
        let doc = Html::parse_document(markup);
        let title = doc
            .select(&TITLE_SELECTOR)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let paragraphs: Vec<String> = doc
            .select(&PARAGRAPH_SELECTOR)
            .map(|el| el.text().collect::<String>())
            .collect();
        debug!("page '{}': {} paragraphs", title, paragraphs.len());
        ChapterPage { title, paragraphs }
    }

    /// Paragraph texts joined by newlines, the form chapters are saved in.
    pub fn text(&self) -> String {
        self.paragraphs.join("\n")
    }
}

/// The only part of the `next_section` payload we care about. Other fields are ignored.
#[derive(Debug, Deserialize)]
struct NextSection {
    #[serde(default)]
    url: Option<String>,
}

/// Finds the URL of the following chapter in the page's embedded state.
///
/// Pages carry a JSON blob with an entry like
/// `"next_section":{"id":"123","title":"...","url":"https://..."}`. Each occurrence of the key is
/// tried in turn; the first one whose object holds an `http(s)` URL wins. A missing key, a `null`
/// value (last chapter) or an object without `url` all mean "no next chapter".
pub fn next_chapter_url(markup: &str) -> Option<String> {
    const KEY: &str = "\"next_section\"";
    let mut rest = markup;
    while let Some(pos) = rest.find(KEY) {
        rest = &rest[pos + KEY.len()..];
        if let Some(url) = parse_next_section(rest) {
            debug!("next chapter: {}", url);
            return Some(url);
        }
    }
    None
}

fn parse_next_section(after_key: &str) -> Option<String> {
    let value = after_key.trim_start().strip_prefix(':')?.trim_start();
    let section = serde_json::Deserializer::from_str(value)
        .into_iter::<NextSection>()
        .next()?
        .ok()?;
    section
        .url
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_title_and_paragraphs() {
        let page = ChapterPage::parse(
            "<html><body><h1> 第一章 </h1><p>甲<b>乙</b></p><p>丙</p></body></html>",
        );
        assert_eq!(page.title, "第一章");
        assert_eq!(page.paragraphs, vec!["甲乙", "丙"]);
        assert_eq!(page.text(), "甲乙\n丙");
    }

    #[test]
    fn test_missing_title_uses_placeholder() {
        let page = ChapterPage::parse("<p>only text</p>");
        assert_eq!(page.title, UNTITLED);
        assert_eq!(page.text(), "only text");
    }

    #[test]
    fn test_first_h1_wins() {
        let page = ChapterPage::parse("<h1>A</h1><h1>B</h1>");
        assert_eq!(page.title, "A");
        assert!(page.paragraphs.is_empty());
        assert_eq!(page.text(), "");
    }

    #[test]
    fn test_next_url_with_unrelated_fields() {
        let markup = r#"<script>window.__STATE__={"section":{"id":1},"next_section":{"id":"2","title":"Two","extra":{"a":[1,2]},"url":"https://example.com/s/2"},"x":3}</script>"#;
        assert_eq!(
            next_chapter_url(markup).as_deref(),
            Some("https://example.com/s/2")
        );
    }

    #[test]
    fn test_next_url_unescapes_json() {
        let markup = r#""next_section" : {"url":"https:\/\/example.com\/s\/3"}"#;
        assert_eq!(
            next_chapter_url(markup).as_deref(),
            Some("https://example.com/s/3")
        );
    }

    #[test]
    fn test_null_or_missing_next_section() {
        assert_eq!(next_chapter_url(r#"{"next_section":null}"#), None);
        assert_eq!(next_chapter_url(r#"{"next_section":{"id":"9"}}"#), None);
        assert_eq!(next_chapter_url("<html></html>"), None);
    }

    #[test]
    fn test_non_http_url_rejected() {
        assert_eq!(
            next_chapter_url(r#"{"next_section":{"url":"/relative/path"}}"#),
            None
        );
    }

    #[test]
    fn test_later_occurrence_used_when_first_is_empty() {
        let markup = r#"{"next_section":null} ... {"next_section":{"url":"http://e.com/4"}}"#;
        assert_eq!(next_chapter_url(markup).as_deref(), Some("http://e.com/4"));
    }
}
