use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::lesson::flow::FlowError;
use crate::lesson::WordListError;
use crate::services::blob_storage::BlobError;
use crate::services::lesson_store::StoreError;
use crate::services::lesson_transfer::TransferError;
use crate::services::pipeline::{GenerationError, PipelineError};

#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    is_operational: bool,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::operational(StatusCode::BAD_GATEWAY, code, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::operational(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            is_operational: false,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Message safe to show a client.
    pub fn public_message(&self) -> &str {
        if self.is_operational {
            &self.message
        } else {
            "Internal server error"
        }
    }

    fn operational(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            is_operational: true,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.is_operational {
            tracing::error!(code = %self.code, error = %self.message, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.public_message().to_string(),
            code: self.code,
        };

        (self.status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections use the error envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

pub fn json_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> AppError {
    AppError::operational(status, code, message)
}

impl From<WordListError> for AppError {
    fn from(err: WordListError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::UnknownQuestion(_) | FlowError::UnknownImage => Self::not_found(err.to_string()),
            _ => Self::conflict(err.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let code = match &err.source {
            GenerationError::NotConfigured(_) => return Self::unavailable(err.to_string()),
            GenerationError::ExhaustedRetries { .. } => "TEXT_GENERATION_FAILED",
            GenerationError::AllProvidersFailed { .. } => "IMAGE_GENERATION_FAILED",
        };
        Self::bad_gateway(code, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::not_found(format!("lesson not found: {id}")),
            StoreError::InvalidIndex { .. } | StoreError::InvalidInput(_) => Self::validation(err.to_string()),
            StoreError::Blob(blob) => blob.into(),
            StoreError::Corrupt(_) | StoreError::Database(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidDataUri(_) | BlobError::InvalidKey(_) => Self::validation(err.to_string()),
            BlobError::Request(_) | BlobError::HttpStatus { .. } => Self::bad_gateway("STORAGE_ERROR", err.to_string()),
            BlobError::Io(_) | BlobError::NotConfigured(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::ShareNotConfigured => Self::unavailable(err.to_string()),
            _ => Self::validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_masked() {
        let err = AppError::internal("database exploded");
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn maps_domain_errors() {
        let err: AppError = StoreError::NotFound("brave".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: AppError = WordListError::Empty.into();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err: AppError = PipelineError {
            stage: crate::services::pipeline::Stage::Images,
            source: GenerationError::AllProvidersFailed {
                word: "rescue".into(),
                reasons: vec!["gemini-image: HTTP 429".into()],
            },
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "IMAGE_GENERATION_FAILED");
        assert!(err.public_message().contains("rescue"));
    }
}
