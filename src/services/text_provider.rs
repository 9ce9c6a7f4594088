use std::time::Duration;

use async_trait::async_trait;

use crate::services::gemini::{GeminiClient, GenerateContentRequest, GenerationConfig, DEFAULT_API_ENDPOINT};
use crate::services::provider::{build_client, env_string, env_u64, ProviderError};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4_000;

#[derive(Debug, Clone, PartialEq)]
pub struct TextGenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub json_output: bool,
}

impl Default for TextGenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            json_output: true,
        }
    }
}

/// A text-generation backend. Returns the raw generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str, params: &TextGenerationParams) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct TextProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

impl TextProviderConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("GOOGLE_API_KEY"),
            model: env_string("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_endpoint: env_string("GEMINI_API_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            timeout: Duration::from_millis(
                env_u64("LESSON_TEXT_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        }
    }
}

#[derive(Clone)]
pub struct GeminiTextProvider {
    model: String,
    client: GeminiClient,
}

impl GeminiTextProvider {
    pub fn new(config: TextProviderConfig) -> Self {
        let http = build_client(config.timeout);
        Self {
            model: config.model,
            client: GeminiClient::new(http, config.api_key, config.api_endpoint),
        }
    }

    pub fn from_env() -> Self {
        Self::new(TextProviderConfig::from_env())
    }

    pub fn is_available(&self) -> bool {
        self.client.is_available() && !self.model.trim().is_empty()
    }
}

#[async_trait]
impl TextGenerator for GeminiTextProvider {
    fn name(&self) -> &'static str {
        "gemini-text"
    }

    async fn generate(&self, prompt: &str, params: &TextGenerationParams) -> Result<String, ProviderError> {
        let request = GenerateContentRequest::prompt(
            prompt,
            GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
                response_mime_type: params.json_output.then(|| "application/json".to_string()),
            },
        );

        let response = self.client.generate_content(&self.model, &request).await?;
        response.first_text().ok_or(ProviderError::EmptyResponse)
    }
}
