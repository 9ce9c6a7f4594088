use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::lesson::{DistractorImage, LessonRecord, VocabularyEntry};
use crate::services::image_provider::{ImageChain, ImageRequest};
use crate::services::pipeline::{GenerationError, Progress, ProgressSink};

pub const DEFAULT_PACING_MS: u64 = 12_000;

/// Fixed wait before every image request except the first of a batch.
struct Pacer {
    delay: Duration,
    first: bool,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self { delay, first: true }
    }

    async fn wait(&mut self) {
        if self.first {
            self.first = false;
            return;
        }
        if !self.delay.is_zero() {
            debug!(delay_ms = self.delay.as_millis() as u64, "pacing image request");
            sleep(self.delay).await;
        }
    }
}

/// Second pipeline stage: one image per vocabulary entry, strictly sequential.
#[derive(Clone)]
pub struct ImageStage {
    chain: ImageChain,
    pacing: Duration,
    distractor_images: bool,
}

impl ImageStage {
    pub fn new(chain: ImageChain, pacing: Duration) -> Self {
        Self {
            chain,
            pacing,
            distractor_images: true,
        }
    }

    pub fn with_distractor_images(mut self, enabled: bool) -> Self {
        self.distractor_images = enabled;
        self
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.chain.provider_names()
    }

    /// Illustrates every entry in order. Fails as soon as one word cannot be
    /// illustrated by any provider.
    pub async fn generate_images(
        &self,
        entries: Vec<VocabularyEntry>,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<VocabularyEntry>, GenerationError> {
        let total = entries.len();
        let mut pacer = Pacer::new(self.pacing);
        self.illustrate_entries(entries, total, &mut pacer, progress).await
    }

    /// Fills in images for the lesson's words and, when enabled, its distractors.
    pub async fn illustrate(
        &self,
        mut lesson: LessonRecord,
        progress: &dyn ProgressSink,
    ) -> Result<LessonRecord, GenerationError> {
        let distractors: Vec<String> = if self.distractor_images {
            lesson.distractors.clone().unwrap_or_default()
        } else {
            Vec::new()
        };
        let total = lesson.words.len() + distractors.len();
        let mut pacer = Pacer::new(self.pacing);

        let entries = std::mem::take(&mut lesson.words);
        lesson.words = self
            .illustrate_entries(entries, total, &mut pacer, progress)
            .await?;

        if !distractors.is_empty() {
            let offset = lesson.words.len();
            lesson.distractor_images = Some(
                self.illustrate_distractors(&distractors, offset, total, &mut pacer, progress)
                    .await,
            );
        }

        Ok(lesson)
    }

    async fn illustrate_entries(
        &self,
        entries: Vec<VocabularyEntry>,
        total: usize,
        pacer: &mut Pacer,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<VocabularyEntry>, GenerationError> {
        info!(count = entries.len(), providers = ?self.chain.provider_names(), "generating images");
        let mut illustrated = Vec::with_capacity(entries.len());

        for (index, mut entry) in entries.into_iter().enumerate() {
            pacer.wait().await;

            let request = entry_request(&entry);
            let image = self.chain.generate(&request).await.map_err(|reasons| {
                GenerationError::AllProvidersFailed {
                    word: entry.word.clone(),
                    reasons,
                }
            })?;

            debug!(word = %entry.word, index, "image ready");
            entry.image = Some(image);
            progress.report(Progress {
                current: index + 1,
                total,
                word: entry.word.clone(),
            });
            illustrated.push(entry);
        }

        Ok(illustrated)
    }

    async fn illustrate_distractors(
        &self,
        distractors: &[String],
        offset: usize,
        total: usize,
        pacer: &mut Pacer,
        progress: &dyn ProgressSink,
    ) -> Vec<DistractorImage> {
        let mut images = Vec::with_capacity(distractors.len());

        for (i, word) in distractors.iter().enumerate() {
            pacer.wait().await;

            match self.chain.generate(&distractor_request(word)).await {
                Ok(image) => images.push(DistractorImage {
                    word: word.clone(),
                    image,
                }),
                Err(reasons) => {
                    warn!(word = %word, reasons = %reasons.join("; "), "skipping distractor image");
                }
            }

            progress.report(Progress {
                current: offset + i + 1,
                total,
                word: format!("{word} (distractor)"),
            });
        }

        images
    }
}

const STYLE: &str = "Friendly graphic-novel style with bold lines, one clear central subject, \
simple background and good contrast, suitable for middle-school students. \
Do not include any text, letters, captions or speech bubbles.";

pub fn build_image_prompt(entry: &VocabularyEntry) -> String {
    format!(
        "An illustration of the word \"{}\" ({}), showing: {} {}",
        entry.word,
        entry.definition.trim_end_matches('.'),
        entry.first_example(),
        STYLE
    )
}

fn entry_request(entry: &VocabularyEntry) -> ImageRequest {
    ImageRequest {
        word: entry.word.clone(),
        prompt: build_image_prompt(entry),
        fallback_prompt: format!(
            "illustration of {}: {}, comic book style, no text",
            entry.word,
            entry.first_example()
        ),
        seed: rand::random::<u32>() as u64,
    }
}

fn distractor_request(word: &str) -> ImageRequest {
    ImageRequest {
        word: word.to_string(),
        prompt: format!("An illustration showing: {word}. {STYLE}"),
        fallback_prompt: format!("illustration of {word}, comic book style, no text"),
        seed: rand::random::<u32>() as u64,
    }
}
