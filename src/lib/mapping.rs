//! Turning per-glyph OCR guesses into a substitution map, and deciding whether to trust it.
//!
//! A font that really is the chapter's anti-scraping font resolves to dozens of different
//! characters. The wrong font, or a font the OCR engine cannot read, collapses onto a handful of
//! guesses, so maps are judged by how many *distinct* characters they resolve to.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use log::{debug, info};

use crate::DeglyphError;

/// Distinct resolved characters a map needs before it is trusted.
pub const DEFAULT_MIN_DISTINCT: usize = 10;

/// An accepted mapping from garbled character to real character, in cmap order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionMap {
    entries: IndexMap<char, char>,
}

impl SubstitutionMap {
    pub fn get(&self, source: char) -> Option<char> {
        self.entries.get(&source).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of different characters the map resolves to.
    pub fn distinct_targets(&self) -> usize {
        self.entries.values().collect::<HashSet<_>>().len()
    }

    /// Entries in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = (char, char)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}

/// Why a candidate map was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMap {
    pub distinct: usize,
    pub required: usize,
    pub recognized: usize,
    pub failed: usize,
}

impl fmt::Display for RejectedMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "only {} distinct characters recognized (need {}); {} glyphs mapped, {} failed",
            self.distinct, self.required, self.recognized, self.failed
        )
    }
}

/// Collects classifier results for one font.
#[derive(Debug, Clone)]
pub struct SubstitutionMapBuilder {
    entries: IndexMap<char, char>,
    failed: Vec<char>,
    min_distinct: usize,
}

impl Default for SubstitutionMapBuilder {
    fn default() -> Self {
        SubstitutionMapBuilder::new(DEFAULT_MIN_DISTINCT)
    }
}

impl SubstitutionMapBuilder {
    pub fn new(min_distinct: usize) -> Self {
        SubstitutionMapBuilder {
            entries: IndexMap::new(),
            failed: Vec::new(),
            min_distinct,
        }
    }

    /// Records the classifier's answer for `source`.
    ///
    /// `Ok(None)` and `Err(_)` both count as a failed glyph; neither stops the build.
    pub fn record(&mut self, source: char, outcome: Result<Option<char>, DeglyphError>) {
        match outcome {
            Ok(Some(target)) => {
                debug!("U+{:04X} -> {}", source as u32, target);
                self.entries.insert(source, target);
            }
            Ok(None) => {
                debug!("U+{:04X} not recognized", source as u32);
                self.failed.push(source);
            }
            Err(e) => {
                debug!("U+{:04X} recognition failed: {}", source as u32, e);
                self.failed.push(source);
            }
        }
    }

    /// Glyphs that could not be classified so far.
    pub fn failed(&self) -> &[char] {
        &self.failed
    }

    pub fn distinct_targets(&self) -> usize {
        self.entries.values().collect::<HashSet<_>>().len()
    }

    /// Validates the collected map.
    ///
    /// # Returns
    /// * `Ok(SubstitutionMap)` when at least `min_distinct` different characters were recognized
    /// * `Err(RejectedMap)` otherwise
    pub fn finish(self) -> Result<SubstitutionMap, RejectedMap> {
        if self.failed.is_empty() {
            info!("All glyphs recognized");
        } else {
            info!("Unrecognized glyphs: {}", self.failed.len());
        }
        info!("Substitution map size: {}", self.entries.len());

        let distinct = self.distinct_targets();
        if distinct >= self.min_distinct {
            Ok(SubstitutionMap {
                entries: self.entries,
            })
        } else {
            Err(RejectedMap {
                distinct,
                required: self.min_distinct,
                recognized: self.entries.len(),
                failed: self.failed.len(),
            })
        }
    }
}

impl FromIterator<(char, char)> for SubstitutionMap {
    /// Builds a map without validation, for callers that already trust their entries.
    fn from_iter<I: IntoIterator<Item = (char, char)>>(iter: I) -> Self {
        SubstitutionMap {
            entries: iter.into_iter().collect(),
        }
    }
}
