use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::lesson::{LessonRecord, WordList};
use crate::services::image_provider::ImageChain;
use crate::services::lesson_images::{ImageStage, DEFAULT_PACING_MS};
use crate::services::lesson_text::{TextStage, DEFAULT_COMPREHENSION_COUNT};
use crate::services::provider::{env_bool, env_string, env_u32, env_u64};
use crate::services::retry::{RetryPolicy, DEFAULT_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS};
use crate::services::text_provider::{GeminiTextProvider, TextGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidJson,
    NoResponse,
    TransportError,
    ValidationFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::NoResponse => "no_response",
            Self::TransportError => "transport_error",
            Self::ValidationFailed => "validation_failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("gave up after {attempts} attempts ({reason}): {detail}")]
    ExhaustedRetries {
        reason: FailureReason,
        attempts: u32,
        detail: String,
    },
    #[error("no image could be generated for \"{word}\": {}", .reasons.join("; "))]
    AllProvidersFailed { word: String, reasons: Vec<String> },
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// What to do when the text stage keeps producing parseable but
/// semantically short payloads until the budget runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    #[default]
    AcceptDegraded,
    Strict,
}

impl ValidationPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" | "degraded" | "lenient" => Some(Self::AcceptDegraded),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Text,
    Images,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text generation"),
            Self::Images => f.write_str("image generation"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: GenerationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub word: String,
}

/// Side channel for image-stage progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn report(&self, progress: Progress) {
        self(progress)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: Progress) {}
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub image_pacing: Duration,
    pub comprehension_count: usize,
    pub validation: ValidationPolicy,
    pub distractor_images: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            image_pacing: Duration::from_millis(DEFAULT_PACING_MS),
            comprehension_count: DEFAULT_COMPREHENSION_COUNT,
            validation: ValidationPolicy::default(),
            distractor_images: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_u32("LESSON_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            retry_backoff: env_u64("LESSON_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            image_pacing: env_u64("LESSON_IMAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.image_pacing),
            comprehension_count: env_u32("LESSON_COMPREHENSION_COUNT")
                .map(|v| v as usize)
                .unwrap_or(defaults.comprehension_count),
            validation: env_string("LESSON_VALIDATION_POLICY")
                .and_then(|v| ValidationPolicy::parse(&v))
                .unwrap_or(defaults.validation),
            distractor_images: env_bool("LESSON_DISTRACTOR_IMAGES").unwrap_or(defaults.distractor_images),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_backoff)
    }
}

/// Text stage followed by image stage, strictly in that order.
#[derive(Clone)]
pub struct LessonPipeline {
    text: TextStage,
    images: ImageStage,
}

impl LessonPipeline {
    pub fn new(text: TextStage, images: ImageStage) -> Self {
        Self { text, images }
    }

    pub fn with_providers(
        config: &PipelineConfig,
        text_generator: Arc<dyn TextGenerator>,
        chain: ImageChain,
    ) -> Self {
        let text = TextStage::new(text_generator, config.retry_policy())
            .with_comprehension_count(config.comprehension_count)
            .with_validation_policy(config.validation);
        let images = ImageStage::new(chain, config.image_pacing)
            .with_distractor_images(config.distractor_images);
        Self::new(text, images)
    }

    pub fn from_env() -> Self {
        let config = PipelineConfig::from_env();
        let text_provider = GeminiTextProvider::from_env();
        if !text_provider.is_available() {
            tracing::warn!("GOOGLE_API_KEY not set, lesson generation will fail");
        }
        Self::with_providers(&config, Arc::new(text_provider), ImageChain::from_env())
    }

    pub fn image_stage(&self) -> &ImageStage {
        &self.images
    }

    pub async fn build_lesson(
        &self,
        words: &WordList,
        progress: &dyn ProgressSink,
    ) -> Result<LessonRecord, PipelineError> {
        info!(words = %words.title(), "building lesson");

        let lesson = self
            .text
            .generate_lesson_text(words)
            .await
            .map_err(|source| fail(Stage::Text, source))?;

        let lesson = self
            .images
            .illustrate(lesson, progress)
            .await
            .map_err(|source| fail(Stage::Images, source))?;

        info!(words = lesson.words.len(), "lesson ready");
        Ok(lesson)
    }
}

fn fail(stage: Stage, source: GenerationError) -> PipelineError {
    let err = PipelineError { stage, source };
    error!(error = %err, "lesson pipeline failed");
    err
}
