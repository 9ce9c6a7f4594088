use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::services::gemini::{GeminiClient, GenerateContentRequest, GenerationConfig, DEFAULT_API_ENDPOINT};
use crate::services::provider::{build_client, env_string, env_u32, env_u64, error_body, ProviderError};

const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_POLLINATIONS_ENDPOINT: &str = "https://image.pollinations.ai";
const DEFAULT_POLLINATIONS_MODEL: &str = "flux";
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_IMAGE_SIZE: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub word: String,
    /// Full illustration prompt for the primary provider.
    pub prompt: String,
    /// Shorter prompt for fallback providers.
    pub fallback_prompt: String,
    pub seed: u64,
}

/// Tagged outcome of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAttempt {
    /// Data URI or directly embeddable URL.
    Success(String),
    /// Try the next provider.
    Retryable(String),
    /// Stop the chain.
    Fatal(String),
}

impl ImageAttempt {
    fn from_error(provider: &str, err: ProviderError) -> Self {
        Self::Retryable(format!("{provider}: {err}"))
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider has the credentials it needs.
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, request: &ImageRequest) -> ImageAttempt;
}

/// Ordered list of providers walked until one succeeds.
#[derive(Clone, Default)]
pub struct ImageChain {
    providers: Vec<Arc<dyn ImageGenerator>>,
}

impl ImageChain {
    pub fn new(providers: Vec<Arc<dyn ImageGenerator>>) -> Self {
        Self { providers }
    }

    pub fn from_env() -> Self {
        let providers: Vec<Arc<dyn ImageGenerator>> = vec![
            Arc::new(GeminiImageProvider::from_env()),
            Arc::new(PollinationsImageProvider::from_env()),
        ];
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Returns the first successful image, or every failure reason in order.
    pub async fn generate(&self, request: &ImageRequest) -> Result<String, Vec<String>> {
        let mut reasons = Vec::new();

        for provider in &self.providers {
            if !provider.is_configured() {
                debug!(provider = provider.name(), word = %request.word, "image provider skipped, credential missing");
                reasons.push(format!("{}: credential missing", provider.name()));
                continue;
            }

            match provider.generate(request).await {
                ImageAttempt::Success(image) if image.trim().is_empty() => {
                    warn!(provider = provider.name(), word = %request.word, "image provider returned an empty image, falling back");
                    reasons.push(format!("{}: empty image", provider.name()));
                }
                ImageAttempt::Success(image) => {
                    if !reasons.is_empty() {
                        debug!(provider = provider.name(), word = %request.word, "fallback image provider succeeded");
                    }
                    return Ok(image);
                }
                ImageAttempt::Retryable(reason) => {
                    warn!(provider = provider.name(), word = %request.word, %reason, "image provider failed, falling back");
                    reasons.push(reason);
                }
                ImageAttempt::Fatal(reason) => {
                    warn!(provider = provider.name(), word = %request.word, %reason, "image provider failed fatally");
                    reasons.push(reason);
                    break;
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("no image providers configured".to_string());
        }
        Err(reasons)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiImageConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

impl GeminiImageConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("GOOGLE_API_KEY"),
            model: env_string("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_IMAGE_MODEL.to_string()),
            api_endpoint: env_string("GEMINI_API_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            timeout: Duration::from_millis(
                env_u64("LESSON_IMAGE_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        }
    }
}

/// Primary provider: Gemini image model returning inline base64 image data.
#[derive(Clone)]
pub struct GeminiImageProvider {
    model: String,
    client: GeminiClient,
}

impl GeminiImageProvider {
    pub fn new(config: GeminiImageConfig) -> Self {
        let http = build_client(config.timeout);
        Self {
            model: config.model,
            client: GeminiClient::new(http, config.api_key, config.api_endpoint),
        }
    }

    pub fn from_env() -> Self {
        Self::new(GeminiImageConfig::from_env())
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageProvider {
    fn name(&self) -> &'static str {
        "gemini-image"
    }

    fn is_configured(&self) -> bool {
        self.client.is_available()
    }

    async fn generate(&self, request: &ImageRequest) -> ImageAttempt {
        let body = GenerateContentRequest::prompt(
            &request.prompt,
            GenerationConfig {
                temperature: 0.8,
                max_output_tokens: 8_192,
                response_mime_type: None,
            },
        );

        match self.client.generate_content(&self.model, &body).await {
            Ok(response) => match response.first_image() {
                Some(image) => ImageAttempt::Success(format!(
                    "data:{};base64,{}",
                    image.mime_type, image.data
                )),
                None => ImageAttempt::from_error(self.name(), ProviderError::MissingImage),
            },
            Err(err) => ImageAttempt::from_error(self.name(), err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollinationsConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

impl PollinationsConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("POLLINATIONS_API_KEY"),
            endpoint: env_string("POLLINATIONS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_POLLINATIONS_ENDPOINT.to_string()),
            model: env_string("POLLINATIONS_MODEL")
                .unwrap_or_else(|| DEFAULT_POLLINATIONS_MODEL.to_string()),
            width: env_u32("LESSON_IMAGE_WIDTH").unwrap_or(DEFAULT_IMAGE_SIZE),
            height: env_u32("LESSON_IMAGE_HEIGHT").unwrap_or(DEFAULT_IMAGE_SIZE),
            timeout: Duration::from_millis(
                env_u64("LESSON_IMAGE_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        }
    }
}

/// Fallback provider: Pollinations renders the prompt at a stable URL, which is
/// returned as-is once a request to it succeeds.
#[derive(Clone)]
pub struct PollinationsImageProvider {
    config: PollinationsConfig,
    client: reqwest::Client,
}

impl PollinationsImageProvider {
    pub fn new(config: PollinationsConfig) -> Self {
        let client = build_client(config.timeout);
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(PollinationsConfig::from_env())
    }

    pub fn image_url(&self, prompt: &str, seed: u64) -> String {
        format!(
            "{}/prompt/{}?width={}&height={}&nologo=true&model={}&seed={}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(prompt),
            self.config.width,
            self.config.height,
            self.config.model,
            seed
        )
    }

    async fn fetch(&self, url: &str, api_key: &str) -> Result<(), ProviderError> {
        let resp = self.client.get(url).bearer_auth(api_key).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = error_body(resp).await;
            return Err(ProviderError::HttpStatus { status, body });
        }

        let is_image = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("image/"));
        if !is_image {
            return Err(ProviderError::MissingImage);
        }
        Ok(())
    }
}

#[async_trait]
impl ImageGenerator for PollinationsImageProvider {
    fn name(&self) -> &'static str {
        "pollinations"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    async fn generate(&self, request: &ImageRequest) -> ImageAttempt {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return ImageAttempt::from_error(self.name(), ProviderError::NotConfigured("POLLINATIONS_API_KEY"));
        };

        let url = self.image_url(&request.fallback_prompt, request.seed);
        match self.fetch(&url, api_key).await {
            Ok(()) => ImageAttempt::Success(url),
            Err(err) => ImageAttempt::from_error(self.name(), err),
        }
    }
}
