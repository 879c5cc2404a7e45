//! Applying a substitution map to chapter text, then the fixed formatting fixes.
//!
//! Substitution is done in one pass with a regex alternation over all keys. Replacing keys one
//! at a time would re-substitute characters that an earlier replacement produced whenever a
//! mapped value is also a key; a single scan never looks at its own output. The alternation is
//! leftmost-first: at a given position the earliest-listed key (cmap order) wins. Keys are single
//! characters, so two keys never compete for the same start position.
//!
//! After substitution, the platform's dialogue markers are rewritten. Scrambled chapters wrap
//! spoken lines in `广 … 上` instead of quotation marks; these become `「 … 」`.

use std::borrow::Cow;

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};

use crate::mapping::SubstitutionMap;

/// Opening dialogue marker as it appears after substitution.
pub const DIALOGUE_OPEN: char = '广';
/// Closing dialogue marker as it appears after substitution.
pub const DIALOGUE_CLOSE: char = '上';

static DIALOGUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("{}(.*?){}", DIALOGUE_OPEN, DIALOGUE_CLOSE))
        .expect("dialogue pattern is valid")
});

/// Knobs for the formatting pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Rewrite every `o` as `。` and every `I` as `！`.
    ///
    /// OCR tends to read the CJK full stop as a small `o` and the exclamation mark as `I`.
    /// The rewrite is blind: genuine Latin `o` and `I` in the text are replaced too.
    pub punct_replace: bool,
}

/// Compiled-size budget for the key alternation.
pub const SUBSTITUTION_SIZE_LIMIT: usize = 64 * (1 << 20);

/// Replaces every occurrence of a map key in `text` with its value, in a single scan.
///
/// Returns `None` when the key alternation cannot be compiled; the text is then not restorable
/// with this map.
pub fn apply_substitutions(text: &str, map: &SubstitutionMap) -> Option<String> {
    apply_substitutions_within(text, map, SUBSTITUTION_SIZE_LIMIT)
}

fn apply_substitutions_within(
    text: &str,
    map: &SubstitutionMap,
    size_limit: usize,
) -> Option<String> {
    if map.is_empty() {
        return Some(text.to_string());
    }
    let pattern = map
        .iter()
        .map(|(source, _)| regex::escape(&source.to_string()))
        .collect::<Vec<_>>()
        .join("|");
    let re = match RegexBuilder::new(&pattern).size_limit(size_limit).build() {
        Ok(re) => re,
        Err(e) => {
            warn!("Could not compile substitution pattern: {}", e);
            return None;
        }
    };
    let replaced = re.replace_all(text, |caps: &Captures| {
        caps[0]
            .chars()
            .next()
            .and_then(|c| map.get(c))
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    Some(replaced.into_owned())
}

/// Rewrites `广…上` spans into `「…」` (shortest span, single line), then optionally applies
/// the `o`/`I` punctuation heuristic.
pub fn convert_dialogue(text: &str, options: RestoreOptions) -> String {
    let converted: Cow<str> = DIALOGUE_RE.replace_all(text, "「${1}」");
    if options.punct_replace {
        converted.replace('o', "。").replace('I', "！")
    } else {
        converted.into_owned()
    }
}

/// Substitution followed by formatting. `None` when substitution failed.
pub fn restore_text(
    text: &str,
    map: &SubstitutionMap,
    options: RestoreOptions,
) -> Option<String> {
    apply_substitutions(text, map).map(|substituted| convert_dialogue(&substituted, options))
}
