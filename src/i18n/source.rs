//! Where translation text comes from.
//!
//! The store never reads files or talks to the network itself; it asks a
//! [`LanguageSource`] for the raw `key=value` text of a language and,
//! optionally, an incremental patch in the same format.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{AlmanacError, Result};

/// File name suffix for translation files.
pub const LANGUAGE_FILE_SUFFIX: &str = ".i18n";

/// Supplier of raw translation text.
pub trait LanguageSource: Send + Sync {
    /// Full table text for `language`.
    ///
    /// Returns [`AlmanacError::LanguageNotFound`] if the language is unknown.
    fn load_base(&self, language: &str) -> Result<String>;

    /// Patch text for `language`, if one is published.
    fn load_patch(&self, _language: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// In-memory source, for tests and embedded tables.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    base: HashMap<String, String>,
    patches: HashMap<String, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the full text of `language`.
    pub fn language(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.base.insert(language.into(), text.into());
        self
    }

    /// Register a patch for `language`.
    pub fn patch(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.patches.insert(language.into(), text.into());
        self
    }
}

impl LanguageSource for StaticSource {
    fn load_base(&self, language: &str) -> Result<String> {
        self.base
            .get(language)
            .cloned()
            .ok_or_else(|| AlmanacError::LanguageNotFound(language.to_string()))
    }

    fn load_patch(&self, language: &str) -> Result<Option<String>> {
        Ok(self.patches.get(language).cloned())
    }
}

/// Language files on disk.
///
/// Layout under `root`:
///
/// - `master_<lang>.i18n`: full table
/// - `patch/<lang>_<tag>.i18n`: patch, where `tag` is the publication
///   date (`yy-MM-dd`) the caller is checking for
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    patch_tag: Option<String>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patch_tag: None,
        }
    }

    /// Look for patches published under `tag`, e.g. `"25-03-08"`.
    pub fn patch_tag(mut self, tag: impl Into<String>) -> Self {
        self.patch_tag = Some(tag.into());
        self
    }

    /// Path of the full table for `language`.
    pub fn base_path(&self, language: &str) -> PathBuf {
        self.root
            .join(format!("master_{language}{LANGUAGE_FILE_SUFFIX}"))
    }

    /// Path of the patch for `language`, if a tag is set.
    pub fn patch_path(&self, language: &str) -> Option<PathBuf> {
        let tag = self.patch_tag.as_ref()?;
        Some(
            self.root
                .join("patch")
                .join(format!("{language}_{tag}{LANGUAGE_FILE_SUFFIX}")),
        )
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl LanguageSource for DirectorySource {
    fn load_base(&self, language: &str) -> Result<String> {
        read_optional(&self.base_path(language))?
            .ok_or_else(|| AlmanacError::LanguageNotFound(language.to_string()))
    }

    fn load_patch(&self, language: &str) -> Result<Option<String>> {
        match self.patch_path(language) {
            Some(path) => read_optional(&path),
            None => Ok(None),
        }
    }
}
