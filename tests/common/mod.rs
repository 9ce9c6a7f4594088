#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vocab_lesson_backend::build_app;
use vocab_lesson_backend::config::Config;
use vocab_lesson_backend::db::init_sqlite_pool;
use vocab_lesson_backend::services::blob_storage::LocalBlobStorage;
use vocab_lesson_backend::services::image_provider::{ImageAttempt, ImageChain, ImageGenerator, ImageRequest};
use vocab_lesson_backend::services::pipeline::{LessonPipeline, PipelineConfig};
use vocab_lesson_backend::services::provider::ProviderError;
use vocab_lesson_backend::services::text_provider::{TextGenerationParams, TextGenerator};

pub const PNG_DATA_URI: &str = "data:image/png;base64,aGVsbG8=";

pub struct TestApp {
    pub router: Router,
    pub dir: TempDir,
}

impl TestApp {
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.raw(method, uri, body.map(|b| b.to_string())).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn raw(&self, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }
}

pub struct FixedText {
    words: Vec<String>,
}

#[async_trait]
impl TextGenerator for FixedText {
    fn name(&self) -> &'static str {
        "fixed-text"
    }

    async fn generate(&self, _prompt: &str, _params: &TextGenerationParams) -> Result<String, ProviderError> {
        let words: Vec<&str> = self.words.iter().map(String::as_str).collect();
        Ok(lesson_json(&words).to_string())
    }
}

pub struct FixedImage(pub ImageAttempt);

#[async_trait]
impl ImageGenerator for FixedImage {
    fn name(&self) -> &'static str {
        "fixed-image"
    }

    async fn generate(&self, _request: &ImageRequest) -> ImageAttempt {
        self.0.clone()
    }
}

pub fn lesson_json(words: &[&str]) -> Value {
    json!({
        "words": words.iter().map(|w| json!({
            "word": w,
            "definition": format!("Meaning of {w}."),
            "examples": [format!("We talked about {w}.")],
            "partOfSpeech": "noun",
        })).collect::<Vec<_>>(),
        "distractors": ["table", "purple", "quickly"],
        "story": {"title": "The Big Day", "text": format!("A story about {}.", words.join(" and "))},
        "practice": {
            "fillInBlank": words.iter().map(|w| json!({
                "sentence": "The ___ was important.",
                "answer": w,
                "options": [w, "table", "purple"],
            })).collect::<Vec<_>>(),
            "comprehension": [
                {"question": "Who?", "answer": "The class."},
                {"question": "What?", "answer": "A story."},
                {"question": "Why?", "answer": "To learn."},
            ],
        },
    })
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(&["brave", "rescue", "danger"], ImageAttempt::Success(PNG_DATA_URI.into())).await
}

pub async fn create_test_app_with(words: &[&str], image: ImageAttempt) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let media_dir = dir.path().join("media");

    let config = Config {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        log_level: "warn".into(),
        public_app_url: Some("https://lessons.test/".into()),
        db_path: dir.path().join("lessons.db"),
    };
    let pool = init_sqlite_pool(&config.db_path).await.unwrap();
    let blobs = Arc::new(LocalBlobStorage::new(&media_dir, "/media"));

    let pipeline_config = PipelineConfig {
        retry_backoff: Duration::ZERO,
        image_pacing: Duration::ZERO,
        ..PipelineConfig::default()
    };
    let text = Arc::new(FixedText {
        words: words.iter().map(|w| w.to_string()).collect(),
    });
    let providers: Vec<Arc<dyn ImageGenerator>> = vec![Arc::new(FixedImage(image))];
    let pipeline = LessonPipeline::with_providers(&pipeline_config, text, ImageChain::new(providers));

    let router = build_app(config, pool, blobs, pipeline, Some(media_dir));
    TestApp { router, dir }
}
