//! Scripted providers shared by service tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::lesson::LessonRecord;
use crate::services::image_provider::{ImageAttempt, ImageGenerator, ImageRequest};
use crate::services::provider::ProviderError;
use crate::services::text_provider::{TextGenerationParams, TextGenerator};

#[derive(Debug, Clone)]
pub enum TextReply {
    Text(String),
    Status(u16),
    Empty,
    NotConfigured,
}

pub struct ScriptedText {
    replies: Mutex<VecDeque<TextReply>>,
    calls: Mutex<usize>,
}

impl ScriptedText {
    pub fn new(replies: Vec<TextReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    fn name(&self) -> &'static str {
        "scripted-text"
    }

    async fn generate(&self, _prompt: &str, _params: &TextGenerationParams) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(TextReply::Text(text)) => Ok(text),
            Some(TextReply::Status(status)) => Err(ProviderError::HttpStatus {
                status: reqwest::StatusCode::from_u16(status).unwrap(),
                body: "scripted failure".to_string(),
            }),
            Some(TextReply::NotConfigured) => Err(ProviderError::NotConfigured("GOOGLE_API_KEY")),
            Some(TextReply::Empty) | None => Err(ProviderError::EmptyResponse),
        }
    }
}

/// Image provider that replays a script, repeating the last outcome once
/// the script runs out.
pub struct ScriptedImages {
    name: &'static str,
    configured: bool,
    script: Mutex<VecDeque<ImageAttempt>>,
    last: Mutex<Option<ImageAttempt>>,
    log: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedImages {
    pub fn new(name: &'static str, script: Vec<ImageAttempt>) -> Arc<Self> {
        Arc::new(Self {
            name,
            configured: true,
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn always(name: &'static str, outcome: ImageAttempt) -> Arc<Self> {
        Self::new(name, vec![outcome])
    }

    pub fn unconfigured(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            configured: false,
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn words(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(w, _)| w.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.log.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImages {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate(&self, request: &ImageRequest) -> ImageAttempt {
        self.log
            .lock()
            .unwrap()
            .push((request.word.clone(), Instant::now()));

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .unwrap_or_else(|| ImageAttempt::Retryable(format!("{}: script empty", self.name))),
        }
    }
}

const PARTS_OF_SPEECH: [&str; 4] = ["adjective", "verb", "noun", "adverb"];

/// A compact lesson payload shaped like the text model's output.
pub fn lesson_json(words: &[&str], comprehension: usize) -> String {
    let entries: Vec<_> = words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            json!({
                "word": word,
                "definition": format!("A simple meaning of {word}."),
                "examples": [format!("The class talked about {word} today."), format!("Everyone remembered {word}.")],
                "partOfSpeech": PARTS_OF_SPEECH[i % PARTS_OF_SPEECH.len()],
            })
        })
        .collect();

    let fill_in_blank: Vec<_> = words
        .iter()
        .map(|word| {
            json!({
                "sentence": "The ___ moment came after lunch.",
                "answer": word,
                "options": [word, "table", "quickly"],
            })
        })
        .collect();

    let questions: Vec<_> = (0..comprehension)
        .map(|i| {
            json!({
                "question": format!("What happened in part {}?", i + 1),
                "answer": format!("Something happened in part {}.", i + 1),
            })
        })
        .collect();

    json!({
        "words": entries,
        "distractors": ["table", "quickly", "purple"],
        "story": {
            "title": "A Day to Remember",
            "text": format!("It was a day about {}.", words.join(" and ")),
        },
        "practice": {
            "fillInBlank": fill_in_blank,
            "comprehension": questions,
        },
    })
    .to_string()
}

pub fn sample_lesson(words: &[&str]) -> LessonRecord {
    let mut lesson: LessonRecord =
        serde_json::from_str(&lesson_json(words, 3)).expect("sample lesson parses");
    lesson.distractors = None;
    lesson
}
