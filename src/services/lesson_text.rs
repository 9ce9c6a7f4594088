use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::lesson::{LessonRecord, VocabularyEntry, WordList};
use crate::services::json_repair::normalize_json;
use crate::services::pipeline::{FailureReason, GenerationError, ValidationPolicy};
use crate::services::provider::ProviderError;
use crate::services::retry::{attempt_with_policy, AttemptError, RetryError, RetryPolicy};
use crate::services::text_provider::{TextGenerationParams, TextGenerator};

pub const DEFAULT_COMPREHENSION_COUNT: usize = 3;
pub const DISTRACTOR_COUNT: usize = 3;
pub const FILL_IN_BLANK_OPTIONS: usize = 3;

#[derive(Debug, Clone)]
pub struct TextFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl TextFailure {
    fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }
}

impl fmt::Display for TextFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

type Attempt = Result<LessonRecord, AttemptError<LessonRecord, TextFailure>>;

/// First pipeline stage: word list in, lesson without images out.
#[derive(Clone)]
pub struct TextStage {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    params: TextGenerationParams,
    comprehension_count: usize,
    validation: ValidationPolicy,
}

impl TextStage {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            params: TextGenerationParams::default(),
            comprehension_count: DEFAULT_COMPREHENSION_COUNT,
            validation: ValidationPolicy::default(),
        }
    }

    pub fn with_comprehension_count(mut self, count: usize) -> Self {
        self.comprehension_count = count;
        self
    }

    pub fn with_validation_policy(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    pub async fn generate_lesson_text(&self, words: &WordList) -> Result<LessonRecord, GenerationError> {
        let prompt = build_lesson_prompt(words, self.comprehension_count);
        let prompt = prompt.as_str();
        let this = self;

        info!(
            provider = self.generator.name(),
            words = words.len(),
            "generating lesson text"
        );

        let result = attempt_with_policy(&self.policy, "lesson_text", move |attempt| {
            this.attempt_once(words, prompt, attempt)
        })
        .await;

        match result {
            Ok(lesson) => Ok(lesson),
            Err(RetryError::ValidationExhausted { attempts, value, error }) => match self.validation {
                ValidationPolicy::AcceptDegraded => {
                    warn!(attempts, error = %error, "lesson text failed validation, continuing with degraded payload");
                    Ok(value)
                }
                ValidationPolicy::Strict => Err(GenerationError::ExhaustedRetries {
                    reason: FailureReason::ValidationFailed,
                    attempts,
                    detail: error.detail,
                }),
            },
            Err(RetryError::Exhausted { attempts, last }) => Err(GenerationError::ExhaustedRetries {
                reason: last.reason,
                attempts,
                detail: last.detail,
            }),
            Err(RetryError::Fatal { error, .. }) => Err(GenerationError::NotConfigured(error.detail)),
        }
    }

    async fn attempt_once(&self, words: &WordList, prompt: &str, attempt: u32) -> Attempt {
        debug!(attempt, "requesting lesson text");

        let raw = match self.generator.generate(prompt, &self.params).await {
            Ok(raw) => raw,
            Err(err @ ProviderError::NotConfigured(_)) => {
                return Err(AttemptError::Fatal(TextFailure::new(
                    FailureReason::TransportError,
                    err.to_string(),
                )));
            }
            Err(ProviderError::EmptyResponse) => {
                return Err(AttemptError::Retryable(TextFailure::new(
                    FailureReason::NoResponse,
                    "provider returned no candidates",
                )));
            }
            Err(err) if err.is_transport() => {
                return Err(AttemptError::Retryable(TextFailure::new(
                    FailureReason::TransportError,
                    err.to_string(),
                )));
            }
            Err(err) => {
                return Err(AttemptError::Retryable(TextFailure::new(
                    FailureReason::InvalidJson,
                    err.to_string(),
                )));
            }
        };

        let mut lesson = parse_lesson(&raw).map_err(AttemptError::Retryable)?;
        align_entries(&mut lesson, words).map_err(AttemptError::Retryable)?;
        tidy(&mut lesson, words);

        match validate(&lesson, self.comprehension_count) {
            Ok(()) => Ok(lesson),
            Err(detail) => Err(AttemptError::Validation {
                value: lesson,
                error: TextFailure::new(FailureReason::ValidationFailed, detail),
            }),
        }
    }
}

pub fn parse_lesson(raw: &str) -> Result<LessonRecord, TextFailure> {
    let normalized = normalize_json(raw);
    serde_json::from_str(&normalized).map_err(|e| {
        debug!(error = %e, raw_len = raw.len(), "lesson JSON did not parse");
        TextFailure::new(FailureReason::InvalidJson, e.to_string())
    })
}

/// Pairs entries with input words so `words[i]` describes the i-th input word.
/// Entries are matched by name first; unmatched ones fill the remaining slots
/// in the order generated. Extra entries are dropped; missing ones fail the
/// attempt.
fn align_entries(lesson: &mut LessonRecord, words: &WordList) -> Result<(), TextFailure> {
    if lesson.words.len() < words.len() {
        return Err(TextFailure::new(
            FailureReason::InvalidJson,
            format!(
                "expected {} vocabulary entries, got {}",
                words.len(),
                lesson.words.len()
            ),
        ));
    }

    let mut pool: Vec<Option<VocabularyEntry>> =
        std::mem::take(&mut lesson.words).into_iter().map(Some).collect();
    let mut slots: Vec<Option<VocabularyEntry>> = words
        .iter()
        .map(|input| {
            let pos = pool.iter().position(|candidate| {
                candidate
                    .as_ref()
                    .is_some_and(|entry| entry.word.trim().eq_ignore_ascii_case(input))
            })?;
            pool[pos].take()
        })
        .collect();

    let mut leftovers = pool.into_iter().flatten();
    for (slot, input) in slots.iter_mut().zip(words.iter()) {
        if slot.is_none() {
            *slot = leftovers.next();
            if let Some(entry) = slot.as_ref() {
                debug!(generated = %entry.word, input, "generator renamed a vocabulary word");
            }
        }
    }

    let mut aligned = Vec::with_capacity(words.len());
    for (slot, input) in slots.into_iter().zip(words.iter()) {
        let mut entry = slot.ok_or_else(|| {
            TextFailure::new(FailureReason::InvalidJson, format!("no entry for \"{input}\""))
        })?;
        if entry.examples.iter().all(|e| e.trim().is_empty()) {
            return Err(TextFailure::new(
                FailureReason::InvalidJson,
                format!("entry for \"{input}\" has no examples"),
            ));
        }
        entry.word = input.to_string();
        entry.image = None;
        aligned.push(entry);
    }

    lesson.words = aligned;
    Ok(())
}

fn tidy(lesson: &mut LessonRecord, words: &WordList) {
    if let Some(distractors) = lesson.distractors.as_mut() {
        distractors.retain(|d| !d.trim().is_empty());
        if distractors.len() != DISTRACTOR_COUNT {
            warn!(count = distractors.len(), "unexpected distractor count");
        }
        distractors.truncate(DISTRACTOR_COUNT);
    }
    lesson.distractor_images = None;

    let fill_count = lesson.practice.fill_in_blank.len();
    if fill_count != words.len() {
        warn!(expected = words.len(), actual = fill_count, "fill-in-blank count differs from word count");
    }
}

fn validate(lesson: &LessonRecord, comprehension_count: usize) -> Result<(), String> {
    let actual = lesson.practice.comprehension.len();
    if actual != comprehension_count {
        return Err(format!(
            "expected {comprehension_count} comprehension questions, got {actual}"
        ));
    }
    Ok(())
}

pub fn build_lesson_prompt(words: &WordList, comprehension_count: usize) -> String {
    format!(
        r#"Create a vocabulary lesson for a middle-school student reading below grade level.

Words: {words}

Return ONLY one JSON object, with no markdown and no commentary, in exactly this shape:
{{
  "words": [
    {{
      "word": "the vocabulary word, unchanged",
      "definition": "one short, concrete sentence",
      "examples": ["A 5-8 word example sentence.", "Another 5-8 word example sentence."],
      "partOfSpeech": "noun | verb | adjective | adverb"
    }}
  ],
  "distractors": ["word1", "word2", "word3"],
  "story": {{
    "title": "story title",
    "text": "a 150-200 word story using every vocabulary word more than once"
  }},
  "practice": {{
    "fillInBlank": [
      {{"sentence": "A sentence with ___ for the missing word.", "answer": "word", "options": ["other1", "word", "other2"]}}
    ],
    "comprehension": [
      {{"question": "A question about the story?", "answer": "A short answer."}}
    ]
  }}
}}

Rules:
- One "words" entry per vocabulary word, in the order given.
- "partOfSpeech" must be exactly one of: noun, verb, adjective, adverb.
- Examples must be short (5-8 words) and concrete.
- Exactly {distractors} "distractors": age-appropriate words that are NOT in the vocabulary list.
- Exactly one "fillInBlank" question per vocabulary word ({count} total), each with {options} options including the answer in a random position.
- Exactly {comprehension_count} "comprehension" questions."#,
        words = words.joined(", "),
        distractors = DISTRACTOR_COUNT,
        count = words.len(),
        options = FILL_IN_BLANK_OPTIONS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson::PartOfSpeech;
    use crate::services::testing::{lesson_json, ScriptedText, TextReply};
    use std::time::Duration;
    use tokio::time::Instant;

    fn words() -> WordList {
        WordList::parse("brave\nrescue\ndanger").unwrap()
    }

    fn stage(replies: Vec<TextReply>) -> (TextStage, Arc<ScriptedText>) {
        let generator = ScriptedText::new(replies);
        let stage = TextStage::new(generator.clone(), RetryPolicy::new(3, Duration::from_secs(1)));
        (stage, generator)
    }

    #[tokio::test(start_paused = true)]
    async fn returns_lesson_on_first_success() {
        let (stage, generator) = stage(vec![TextReply::Text(lesson_json(&["brave", "rescue", "danger"], 3))]);
        let lesson = stage.generate_lesson_text(&words()).await.unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(lesson.words.len(), 3);
        assert_eq!(lesson.words[1].word, "rescue");
        assert_eq!(lesson.words[0].part_of_speech, PartOfSpeech::Adjective);
        assert!(lesson.words.iter().all(|w| w.image.is_none()));
        assert_eq!(lesson.distractors.as_ref().map(Vec::len), Some(3));
        assert_eq!(lesson.practice.fill_in_blank.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reordered_entries_follow_their_words() {
        let (stage, _) = stage(vec![TextReply::Text(lesson_json(&["Rescue", "brave", "danger"], 3))]);
        let lesson = stage.generate_lesson_text(&words()).await.unwrap();

        let pairs: Vec<(&str, &str)> = lesson
            .words
            .iter()
            .map(|w| (w.word.as_str(), w.definition.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("brave", "A simple meaning of brave."),
                ("rescue", "A simple meaning of Rescue."),
                ("danger", "A simple meaning of danger."),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_entries_fill_remaining_slots_in_order() {
        let (stage, _) = stage(vec![TextReply::Text(lesson_json(&["saved", "danger", "bold", "extra"], 3))]);
        let lesson = stage.generate_lesson_text(&words()).await.unwrap();

        assert_eq!(lesson.words.len(), 3);
        assert_eq!(lesson.words[0].definition, "A simple meaning of saved.");
        assert_eq!(lesson.words[1].word, "rescue");
        assert_eq!(lesson.words[1].definition, "A simple meaning of bold.");
        assert_eq!(lesson.words[2].definition, "A simple meaning of danger.");
    }

    #[tokio::test(start_paused = true)]
    async fn repairs_fenced_output() {
        let body = lesson_json(&["brave", "rescue", "danger"], 3);
        let wrapped = format!("Here is the lesson!\n```json\n{}\n```", body.replacen('}', ",}", 1));
        let (stage, _) = stage(vec![TextReply::Text(wrapped)]);
        assert!(stage.generate_lesson_text(&words()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_three_failures_with_backoff() {
        let (stage, generator) = stage(vec![
            TextReply::Status(503),
            TextReply::Status(503),
            TextReply::Status(503),
        ]);
        let started = Instant::now();
        let err = stage.generate_lesson_text(&words()).await.unwrap_err();

        assert!(matches!(
            err,
            GenerationError::ExhaustedRetries { reason: FailureReason::TransportError, attempts: 3, .. }
        ));
        assert_eq!(generator.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn output_without_braces_is_retried() {
        let (stage, generator) = stage(vec![
            TextReply::Text("I'm sorry, I can't do that.".into()),
            TextReply::Text(lesson_json(&["brave", "rescue", "danger"], 3)),
        ]);
        assert!(stage.generate_lesson_text(&words()).await.is_ok());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_json_reason_reported() {
        let garbage = TextReply::Text("{not json".into());
        let (stage, _) = stage(vec![garbage.clone(), garbage.clone(), garbage]);
        let err = stage.generate_lesson_text(&words()).await.unwrap_err();
        assert!(matches!(err, GenerationError::ExhaustedRetries { reason: FailureReason::InvalidJson, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_candidates_reported_as_no_response() {
        let (stage, _) = stage(vec![TextReply::Empty, TextReply::Empty, TextReply::Empty]);
        let err = stage.generate_lesson_text(&words()).await.unwrap_err();
        assert!(matches!(err, GenerationError::ExhaustedRetries { reason: FailureReason::NoResponse, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_entries_are_retried_not_accepted() {
        let short = TextReply::Text(lesson_json(&["brave"], 3));
        let (stage, generator) = stage(vec![short.clone(), short.clone(), short]);
        let err = stage.generate_lesson_text(&words()).await.unwrap_err();
        assert!(matches!(err, GenerationError::ExhaustedRetries { reason: FailureReason::InvalidJson, .. }));
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn comprehension_shortfall_accepted_when_degraded_allowed() {
        let short = TextReply::Text(lesson_json(&["brave", "rescue", "danger"], 1));
        let (stage, generator) = stage(vec![short.clone(), short.clone(), short]);

        let lesson = stage.generate_lesson_text(&words()).await.unwrap();
        assert_eq!(generator.calls(), 3);
        assert_eq!(lesson.practice.comprehension.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn comprehension_shortfall_fails_when_strict() {
        let short = TextReply::Text(lesson_json(&["brave", "rescue", "danger"], 1));
        let (stage, _) = stage(vec![short.clone(), short.clone(), short]);
        let stage = stage.with_validation_policy(ValidationPolicy::Strict);

        let err = stage.generate_lesson_text(&words()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::ExhaustedRetries { reason: FailureReason::ValidationFailed, attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_retry_recovers() {
        let (stage, generator) = stage(vec![
            TextReply::Text(lesson_json(&["brave", "rescue", "danger"], 2)),
            TextReply::Text(lesson_json(&["brave", "rescue", "danger"], 3)),
        ]);
        let lesson = stage.generate_lesson_text(&words()).await.unwrap();
        assert_eq!(lesson.practice.comprehension.len(), 3);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_is_not_retried() {
        let (stage, generator) = stage(vec![TextReply::NotConfigured]);
        let err = stage.generate_lesson_text(&words()).await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn prompt_mentions_every_word_and_constraint() {
        let prompt = build_lesson_prompt(&words(), 4);
        assert!(prompt.contains("brave, rescue, danger"));
        assert!(prompt.contains("Exactly 4 \"comprehension\""));
        assert!(prompt.contains("noun, verb, adjective, adverb"));
        assert!(prompt.contains("answer in a random position"));
    }
}
