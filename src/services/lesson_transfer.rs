use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lesson::{LessonRecord, WordList, WordListError};
use crate::services::lesson_store::StoredLesson;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("unsupported export version {0}")]
    UnsupportedVersion(u32),
    #[error("export file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("export contains no lesson words")]
    NoWords,
    #[error(transparent)]
    Words(#[from] WordListError),
    #[error("share links are not configured (PUBLIC_APP_URL)")]
    ShareNotConfigured,
}

/// Portable lesson file. Older saves carry `date` instead of `exportedAt` and
/// no `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonExport {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(alias = "date", default = "Utc::now")]
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    /// Newline-separated word list.
    #[serde(default)]
    pub words: String,
    pub lesson_data: LessonRecord,
}

fn default_version() -> u32 {
    EXPORT_VERSION
}

impl LessonExport {
    pub fn from_stored(stored: &StoredLesson) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            name: stored.title.clone(),
            words: stored.words.clone(),
            lesson_data: stored.lesson.clone(),
        }
    }

    pub fn file_name(&self, lesson_id: &str) -> String {
        format!("lesson-{lesson_id}.json")
    }

    /// Word list to save the lesson under. Falls back to the lesson's own
    /// entries when the export carries no raw word text.
    pub fn word_list(&self) -> Result<WordList, TransferError> {
        if !self.words.trim().is_empty() {
            return Ok(WordList::parse(&self.words)?);
        }
        if self.lesson_data.words.is_empty() {
            return Err(TransferError::NoWords);
        }
        Ok(WordList::from_words(
            self.lesson_data.words.iter().map(|entry| entry.word.as_str()),
        )?)
    }
}

pub fn parse_export(raw: &str) -> Result<LessonExport, TransferError> {
    let export: LessonExport = serde_json::from_str(raw)?;
    if export.version != EXPORT_VERSION {
        return Err(TransferError::UnsupportedVersion(export.version));
    }
    Ok(export)
}

pub fn share_url(public_app_url: Option<&str>, lesson_id: &str) -> Result<String, TransferError> {
    let base = public_app_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(TransferError::ShareNotConfigured)?;
    let separator = if base.contains('?') { '&' } else { '?' };
    Ok(format!(
        "{}{}lesson={}",
        base,
        separator,
        urlencoding::encode(lesson_id)
    ))
}
