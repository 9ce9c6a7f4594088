use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lesson::{LessonRecord, WordList};
use crate::services::blob_storage::{
    decode_data_uri, distractor_image_key, is_data_uri, word_image_key, BlobError, BlobStorage,
};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lesson not found: {0}")]
    NotFound(String),
    #[error("word index {index} out of range (lesson has {len} words)")]
    InvalidIndex { index: usize, len: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("stored lesson is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLesson {
    pub lesson_id: String,
    pub title: String,
    /// Newline-separated word list as entered.
    pub words: String,
    pub lesson: LessonRecord,
    pub view_count: i64,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub lesson_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub view_count: i64,
    pub archived: bool,
}

/// SQLite-backed lesson library. Inline images are moved to blob storage on write.
#[derive(Clone)]
pub struct LessonStore {
    pool: SqlitePool,
    blobs: Arc<dyn BlobStorage>,
}

impl LessonStore {
    pub fn new(pool: SqlitePool, blobs: Arc<dyn BlobStorage>) -> Self {
        Self { pool, blobs }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upserts on the lesson id derived from the word list. View count and
    /// archive state survive a re-save.
    pub async fn save(&self, words: &WordList, mut lesson: LessonRecord) -> Result<StoredLesson, StoreError> {
        let lesson_id = words.lesson_id();
        if lesson_id.is_empty() {
            return Err(StoreError::InvalidInput("word list produces an empty lesson id".into()));
        }

        self.persist_images(&lesson_id, &mut lesson).await?;
        let data = serde_json::to_string(&lesson)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO "lessons" ("lesson_id", "title", "words", "lesson_data", "created_at", "updated_at")
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT ("lesson_id") DO UPDATE SET
                "title" = excluded."title",
                "words" = excluded."words",
                "lesson_data" = excluded."lesson_data",
                "updated_at" = excluded."updated_at"
            "#,
        )
        .bind(&lesson_id)
        .bind(words.title())
        .bind(words.to_text())
        .bind(&data)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(lesson_id = %lesson_id, "lesson saved");
        self.require(&lesson_id).await
    }

    /// Fetches a lesson for viewing and bumps its view count.
    pub async fn get(&self, lesson_id: &str) -> Result<StoredLesson, StoreError> {
        let result = sqlx::query(
            r#"UPDATE "lessons" SET "view_count" = "view_count" + 1 WHERE "lesson_id" = ?"#,
        )
        .bind(lesson_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(lesson_id.to_string()));
        }
        self.require(lesson_id).await
    }

    /// Fetches without touching the view count.
    pub async fn find(&self, lesson_id: &str) -> Result<Option<StoredLesson>, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM "lessons" WHERE "lesson_id" = ?"#)
            .bind(lesson_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| map_lesson(&r)).transpose()
    }

    async fn require(&self, lesson_id: &str) -> Result<StoredLesson, StoreError> {
        self.find(lesson_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(lesson_id.to_string()))
    }

    pub async fn list_recent(&self, limit: Option<i64>, include_archived: bool) -> Result<Vec<LessonSummary>, StoreError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let sql = if include_archived {
            r#"SELECT "lesson_id", "title", "created_at", "view_count", "archived"
               FROM "lessons" ORDER BY "created_at" DESC LIMIT ?"#
        } else {
            r#"SELECT "lesson_id", "title", "created_at", "view_count", "archived"
               FROM "lessons" WHERE "archived" = 0 ORDER BY "created_at" DESC LIMIT ?"#
        };

        let rows = sqlx::query(sql).bind(limit).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(LessonSummary {
                    lesson_id: row.try_get("lesson_id")?,
                    title: row.try_get("title")?,
                    created_at: row.try_get("created_at")?,
                    view_count: row.try_get("view_count")?,
                    archived: row.try_get::<i64, _>("archived")? != 0,
                })
            })
            .collect()
    }

    pub async fn archive(&self, lesson_id: &str) -> Result<StoredLesson, StoreError> {
        self.set_archived(lesson_id, true).await
    }

    pub async fn unarchive(&self, lesson_id: &str) -> Result<StoredLesson, StoreError> {
        self.set_archived(lesson_id, false).await
    }

    async fn set_archived(&self, lesson_id: &str, archived: bool) -> Result<StoredLesson, StoreError> {
        let now = Utc::now();
        let archived_at = archived.then_some(now);
        let result = sqlx::query(
            r#"UPDATE "lessons" SET "archived" = ?, "archived_at" = ?, "updated_at" = ? WHERE "lesson_id" = ?"#,
        )
        .bind(archived as i64)
        .bind(archived_at)
        .bind(now)
        .bind(lesson_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(lesson_id.to_string()));
        }
        debug!(lesson_id, archived, "archive state changed");
        self.require(lesson_id).await
    }

    /// Removes the lesson's images, then the row.
    pub async fn delete(&self, lesson_id: &str) -> Result<(), StoreError> {
        self.require(lesson_id).await?;

        match self.blobs.delete_prefix(lesson_id).await {
            Ok(removed) => debug!(lesson_id, removed, "lesson images removed"),
            Err(e) => warn!(lesson_id, error = %e, "failed to remove lesson images"),
        }

        sqlx::query(r#"DELETE FROM "lessons" WHERE "lesson_id" = ?"#)
            .bind(lesson_id)
            .execute(&self.pool)
            .await?;
        info!(lesson_id, "lesson deleted");
        Ok(())
    }

    /// Replaces one word's image. Accepts a data URI (uploaded) or a URL.
    pub async fn update_word_image(&self, lesson_id: &str, index: usize, image: &str) -> Result<StoredLesson, StoreError> {
        let image = image.trim();
        let url = if is_data_uri(image) {
            let payload = decode_data_uri(image)?;
            let key = word_image_key(lesson_id, index, payload.extension());
            self.blobs.put(&key, &payload.mime_type, payload.bytes).await?
        } else if image.starts_with("https://") || image.starts_with("http://") || image.starts_with('/') {
            image.to_string()
        } else {
            return Err(StoreError::InvalidInput("image must be a URL or data URI".into()));
        };

        let mut stored = self.require(lesson_id).await?;
        let len = stored.lesson.words.len();
        let entry = stored
            .lesson
            .words
            .get_mut(index)
            .ok_or(StoreError::InvalidIndex { index, len })?;
        entry.image = Some(url);
        self.write_lesson(lesson_id, &stored.lesson).await
    }

    pub async fn update_definition(&self, lesson_id: &str, index: usize, definition: &str) -> Result<StoredLesson, StoreError> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(StoreError::InvalidInput("definition must not be empty".into()));
        }

        let mut stored = self.require(lesson_id).await?;
        let len = stored.lesson.words.len();
        let entry = stored
            .lesson
            .words
            .get_mut(index)
            .ok_or(StoreError::InvalidIndex { index, len })?;
        entry.definition = definition.to_string();
        self.write_lesson(lesson_id, &stored.lesson).await
    }

    async fn write_lesson(&self, lesson_id: &str, lesson: &LessonRecord) -> Result<StoredLesson, StoreError> {
        let data = serde_json::to_string(lesson)?;
        sqlx::query(r#"UPDATE "lessons" SET "lesson_data" = ?, "updated_at" = ? WHERE "lesson_id" = ?"#)
            .bind(data)
            .bind(Utc::now())
            .bind(lesson_id)
            .execute(&self.pool)
            .await?;
        self.require(lesson_id).await
    }

    async fn persist_images(&self, lesson_id: &str, lesson: &mut LessonRecord) -> Result<(), StoreError> {
        let mut uploaded = 0usize;

        for (index, entry) in lesson.words.iter_mut().enumerate() {
            let Some(image) = entry.image.as_deref().filter(|i| is_data_uri(i)) else {
                continue;
            };
            let payload = decode_data_uri(image)?;
            let key = word_image_key(lesson_id, index, payload.extension());
            entry.image = Some(self.blobs.put(&key, &payload.mime_type, payload.bytes).await?);
            uploaded += 1;
        }

        if let Some(distractors) = lesson.distractor_images.as_mut() {
            for (index, distractor) in distractors.iter_mut().enumerate() {
                if !is_data_uri(&distractor.image) {
                    continue;
                }
                let payload = decode_data_uri(&distractor.image)?;
                let key = distractor_image_key(lesson_id, index, payload.extension());
                distractor.image = self.blobs.put(&key, &payload.mime_type, payload.bytes).await?;
                uploaded += 1;
            }
        }

        if uploaded > 0 {
            debug!(lesson_id, uploaded, "inline images moved to blob storage");
        }
        Ok(())
    }
}

fn map_lesson(row: &SqliteRow) -> Result<StoredLesson, StoreError> {
    let data: String = row.try_get("lesson_data")?;
    Ok(StoredLesson {
        lesson_id: row.try_get("lesson_id")?,
        title: row.try_get("title")?,
        words: row.try_get("words")?,
        lesson: serde_json::from_str(&data)?,
        view_count: row.try_get("view_count")?,
        archived: row.try_get::<i64, _>("archived")? != 0,
        archived_at: row.try_get("archived_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_sqlite_pool;
    use crate::services::blob_storage::LocalBlobStorage;
    use crate::services::testing::sample_lesson;
    use tempfile::TempDir;

    async fn store() -> (LessonStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_sqlite_pool(&dir.path().join("lessons.db")).await.unwrap();
        let blobs = Arc::new(LocalBlobStorage::new(dir.path().join("blobs"), "/media"));
        (LessonStore::new(pool, blobs), dir)
    }

    fn illustrated(words: &[&str]) -> LessonRecord {
        let mut lesson = sample_lesson(words);
        for entry in &mut lesson.words {
            entry.image = Some("data:image/png;base64,aGVsbG8=".into());
        }
        lesson
    }

    #[tokio::test]
    async fn save_uploads_inline_images() {
        let (store, dir) = store().await;
        let words = WordList::parse("Brave\nrescue\ndanger\nstorm").unwrap();

        let stored = store.save(&words, illustrated(&["Brave", "rescue", "danger", "storm"])).await.unwrap();

        assert_eq!(stored.lesson_id, "brave-rescue-danger");
        assert_eq!(stored.title, "Brave, rescue, danger, storm");
        assert_eq!(stored.view_count, 0);
        assert_eq!(stored.lesson.words[0].image.as_deref(), Some("/media/brave-rescue-danger/word-0.png"));
        assert!(dir.path().join("blobs/brave-rescue-danger/word-3.png").exists());
    }

    #[tokio::test]
    async fn lifecycle_view_archive_delete() {
        let (store, dir) = store().await;
        let words = WordList::parse("brave\nrescue").unwrap();
        store.save(&words, illustrated(&["brave", "rescue"])).await.unwrap();

        assert_eq!(store.get("brave-rescue").await.unwrap().view_count, 1);
        assert_eq!(store.get("brave-rescue").await.unwrap().view_count, 2);

        let archived = store.archive("brave-rescue").await.unwrap();
        assert!(archived.archived);
        assert!(archived.archived_at.is_some());
        assert!(store.list_recent(None, false).await.unwrap().is_empty());
        assert_eq!(store.list_recent(None, true).await.unwrap().len(), 1);

        let restored = store.unarchive("brave-rescue").await.unwrap();
        assert!(!restored.archived && restored.archived_at.is_none());
        assert_eq!(store.list_recent(Some(10), false).await.unwrap().len(), 1);

        store.delete("brave-rescue").await.unwrap();
        assert!(store.find("brave-rescue").await.unwrap().is_none());
        assert!(!dir.path().join("blobs/brave-rescue").exists());
        assert!(matches!(store.get("brave-rescue").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn resave_keeps_views_and_replaces_content() {
        let (store, _dir) = store().await;
        let words = WordList::parse("brave").unwrap();
        store.save(&words, sample_lesson(&["brave"])).await.unwrap();
        store.get("brave").await.unwrap();

        let mut lesson = sample_lesson(&["brave"]);
        lesson.story.title = "Second Draft".into();
        let stored = store.save(&words, lesson).await.unwrap();

        assert_eq!(stored.view_count, 1);
        assert_eq!(stored.lesson.story.title, "Second Draft");
        assert_eq!(store.list_recent(None, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edits_word_image_and_definition() {
        let (store, _dir) = store().await;
        let words = WordList::parse("brave\nrescue").unwrap();
        store.save(&words, sample_lesson(&["brave", "rescue"])).await.unwrap();

        let stored = store
            .update_word_image("brave-rescue", 1, "data:image/jpeg;base64,aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(stored.lesson.words[1].image.as_deref(), Some("/media/brave-rescue/word-1.jpg"));

        let stored = store
            .update_definition("brave-rescue", 0, "  Showing courage. ")
            .await
            .unwrap();
        assert_eq!(stored.lesson.words[0].definition, "Showing courage.");

        assert!(matches!(
            store.update_definition("brave-rescue", 5, "x").await,
            Err(StoreError::InvalidIndex { index: 5, len: 2 })
        ));
        assert!(matches!(
            store.update_word_image("brave-rescue", 0, "not an image").await,
            Err(StoreError::InvalidInput(_))
        ));
    }
}
