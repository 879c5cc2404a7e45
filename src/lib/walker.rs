//! Walking a book chapter by chapter.
//!
//! The walker owns the side effects: it fetches pages through a [`PageSource`], writes files
//! through a [`ChapterStore`] and sleeps between chapters. Everything in between is the pure
//! pipeline.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::ocr::GlyphClassifier;
use crate::page::{next_chapter_url, ChapterPage};
use crate::pipeline::{decode_substitution_map, PipelineSettings};
use crate::restore::restore_text;
use crate::store::ChapterStore;
use crate::DeglyphError;

/// Where chapter markup comes from.
pub trait PageSource {
    fn fetch(&mut self, url: &str) -> Result<String, DeglyphError>;
}

impl<S: PageSource + ?Sized> PageSource for &mut S {
    fn fetch(&mut self, url: &str) -> Result<String, DeglyphError> {
        (**self).fetch(url)
    }
}

/// What happened to one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutcome {
    /// 1-based position in the walk
    pub index: usize,
    pub title: String,
    /// The scrambled text file. Deleted once the chapter is restored.
    pub raw_path: PathBuf,
    pub restored_path: Option<PathBuf>,
    pub next_url: Option<String>,
}

impl ChapterOutcome {
    pub fn is_restored(&self) -> bool {
        self.restored_path.is_some()
    }
}

#[derive(Debug)]
pub enum StopReason {
    /// Only one chapter was requested
    SingleChapter,
    /// The last processed page had no link to a following chapter
    NoNextChapter,
    /// Fetching or saving a chapter failed
    Failed { url: String, error: DeglyphError },
}

#[derive(Debug)]
pub struct WalkSummary {
    pub chapters: Vec<ChapterOutcome>,
    pub stopped: StopReason,
}

impl WalkSummary {
    pub fn restored_count(&self) -> usize {
        self.chapters.iter().filter(|c| c.is_restored()).count()
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.stopped, StopReason::Failed { .. })
    }
}

pub struct ChapterWalker<S, C> {
    source: S,
    classifier: C,
    store: ChapterStore,
    settings: PipelineSettings,
    chapter_delay: Duration,
}

impl<S, C> ChapterWalker<S, C>
where
    S: PageSource,
    C: GlyphClassifier,
{
    pub fn new(source: S, classifier: C, store: ChapterStore, settings: PipelineSettings) -> Self {
        ChapterWalker {
            source,
            classifier,
            store,
            settings,
            chapter_delay: Duration::ZERO,
        }
    }

    /// Pause between chapters when walking a whole book.
    pub fn with_chapter_delay(mut self, delay: Duration) -> Self {
        self.chapter_delay = delay;
        self
    }

    /// Fetches, saves and restores one chapter.
    ///
    /// The raw text is on disk before recognition starts. A chapter without an acceptable font
    /// is not an error; it keeps its raw file and `restored_path` is `None`.
    pub fn process_chapter(
        &mut self,
        url: &str,
        index: usize,
    ) -> Result<ChapterOutcome, DeglyphError> {
        info!("Chapter {}: fetching {}", index, url);
        let markup = self.source.fetch(url)?;

        let page = ChapterPage::parse(&markup);
        let raw_text = page.text();
        let raw_path = self.store.save_raw(&page.title, &raw_text)?;

        let restored_text = decode_substitution_map(&markup, &mut self.classifier, &self.settings)
            .and_then(|decoded| restore_text(&raw_text, &decoded.map, self.settings.restore));
        let restored_path = match restored_text {
            Some(text) => Some(
                self.store
                    .commit_restored(&raw_path, index, &page.title, &text)?,
            ),
            None => {
                warn!(
                    "Chapter {} '{}': no valid font found, raw text kept",
                    index, page.title
                );
                None
            }
        };

        Ok(ChapterOutcome {
            index,
            title: page.title,
            raw_path,
            restored_path,
            next_url: next_chapter_url(&markup),
        })
    }

    /// Processes `start_url` and, with `auto`, every chapter after it.
    ///
    /// The walk stops at the first chapter that cannot be fetched or saved. Chapters left
    /// unrestored do not stop it.
    pub fn walk(&mut self, start_url: &str, auto: bool) -> WalkSummary {
        let mut chapters = Vec::new();
        let mut url = start_url.to_string();
        let mut index = 1;

        let stopped = loop {
            let outcome = match self.process_chapter(&url, index) {
                Ok(outcome) => outcome,
                Err(error) => {
                    error!("Chapter {} failed: {}", index, error);
                    break StopReason::Failed { url, error };
                }
            };
            let next = outcome.next_url.clone();
            chapters.push(outcome);

            if !auto {
                break StopReason::SingleChapter;
            }
            match next {
                Some(next) => {
                    if !self.chapter_delay.is_zero() {
                        thread::sleep(self.chapter_delay);
                    }
                    url = next;
                    index += 1;
                }
                None => {
                    info!("No next chapter after chapter {}", index);
                    break StopReason::NoNextChapter;
                }
            }
        };

        WalkSummary { chapters, stopped }
    }
}
