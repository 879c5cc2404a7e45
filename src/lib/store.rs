//! The download directory.
//!
//! Each chapter first lands as `{title}.txt` holding the scrambled text. When a font is accepted
//! the restored text is written as `第{N}节{title}.txt` and the raw file is removed, so at rest
//! a chapter has exactly one file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::DeglyphError;

/// Characters that are not allowed in file names on at least one common platform.
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Makes a chapter title usable as a file name.
///
/// Reserved characters and control characters become `_`. A title that sanitizes to nothing
/// (or to `.`/`..`) becomes `_`.
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Name of the restored file for chapter `index` (1-based).
pub fn restored_file_name(index: usize, title: &str) -> String {
    format!("第{}节{}.txt", index, sanitize_file_name(title))
}

pub fn raw_file_name(title: &str) -> String {
    format!("{}.txt", sanitize_file_name(title))
}

#[derive(Debug, Clone)]
pub struct ChapterStore {
    dir: PathBuf,
}

impl ChapterStore {
    /// Opens the download directory, creating it if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DeglyphError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| DeglyphError::io(e, &dir))?;
        debug!("Download directory: {}", dir.display());
        Ok(ChapterStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Saves the scrambled text of a chapter as `{title}.txt`.
    pub fn save_raw(&self, title: &str, text: &str) -> Result<PathBuf, DeglyphError> {
        let path = self.dir.join(raw_file_name(title));
        fs::write(&path, text).map_err(|e| DeglyphError::io(e, &path))?;
        info!("Saved raw text to {}", path.display());
        Ok(path)
    }

    /// Writes the restored text and deletes the raw file.
    ///
    /// The restored file is written to a temporary file in the same directory and renamed into
    /// place, so an interrupted run never leaves a half-written `第{N}节` file next to the raw one.
    pub fn commit_restored(
        &self,
        raw_path: &Path,
        index: usize,
        title: &str,
        content: &str,
    ) -> Result<PathBuf, DeglyphError> {
        let path = self.dir.join(restored_file_name(index, title));

        let mut tmp = tempfile::Builder::new()
            .prefix(".deglyph-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(|e| DeglyphError::io(e, &self.dir))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| DeglyphError::io(e, tmp.path()))?;
        tmp.persist(&path)
            .map_err(|e| DeglyphError::io(e.error, &path))?;

        if raw_path != path && raw_path.exists() {
            fs::remove_file(raw_path).map_err(|e| DeglyphError::io(e, raw_path))?;
        }
        info!("Saved restored text to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("第一章 开始"), "第一章 开始");
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_file_name("tab\there"), "tab_here");
        assert_eq!(sanitize_file_name("  "), "_");
        assert_eq!(sanitize_file_name(".."), "_");
    }

    #[test]
    fn test_file_names() {
        assert_eq!(raw_file_name("Chapter One"), "Chapter One.txt");
        assert_eq!(restored_file_name(3, "Chapter One"), "第3节Chapter One.txt");
        assert_eq!(restored_file_name(1, "A/B"), "第1节A_B.txt");
    }

    #[test]
    fn test_new_creates_directory() {
        let root = tempdir().unwrap();
        let dir = root.path().join("nested").join("download");
        let store = ChapterStore::new(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn test_commit_replaces_raw_file() {
        let root = tempdir().unwrap();
        let store = ChapterStore::new(root.path()).unwrap();
        let raw = store.save_raw("Chapter One", "\u{e000}\u{e001}").unwrap();
        assert_eq!(fs::read_to_string(&raw).unwrap(), "\u{e000}\u{e001}");

        let restored = store.commit_restored(&raw, 1, "Chapter One", "天地").unwrap();
        assert_eq!(restored, root.path().join("第1节Chapter One.txt"));
        assert_eq!(fs::read_to_string(&restored).unwrap(), "天地");
        assert!(!raw.exists());

        // only the restored file is left behind
        let names: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["第1节Chapter One.txt".to_string()]);
    }

    #[test]
    fn test_commit_overwrites_previous_run() {
        let root = tempdir().unwrap();
        let store = ChapterStore::new(root.path()).unwrap();
        let raw = store.save_raw("T", "x").unwrap();
        store.commit_restored(&raw, 2, "T", "old").unwrap();
        let raw = store.save_raw("T", "x").unwrap();
        let restored = store.commit_restored(&raw, 2, "T", "new").unwrap();
        assert_eq!(fs::read_to_string(restored).unwrap(), "new");
    }
}
