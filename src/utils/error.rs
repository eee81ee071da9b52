use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Malformed model result: {0}")]
    MalformedResult(String),

    #[error("{0}")]
    UploadRejected(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<image::ImageError> for DetectError {
    fn from(err: image::ImageError) -> Self {
        DetectError::Decode(err.to_string())
    }
}

impl DetectError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DetectError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DetectError::UploadRejected(_) => StatusCode::BAD_REQUEST,
            DetectError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            DetectError::Json(_) => StatusCode::BAD_REQUEST,
            DetectError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DetectError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            DetectError::Decode(_) => "DECODE_ERROR",
            DetectError::Inference(_) => "INFERENCE_ERROR",
            DetectError::MalformedResult(_) => "MALFORMED_RESULT",
            DetectError::UploadRejected(_) => "UPLOAD_REJECTED",
            DetectError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            DetectError::InvalidInput(_) => "INVALID_INPUT",
            DetectError::Config(_) => "CONFIG_ERROR",
            DetectError::Io(_) => "IO_ERROR",
            DetectError::Json(_) => "JSON_ERROR",
            DetectError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({}, {})", self, self.error_code(), status);
        } else {
            tracing::warn!("Request rejected: {} ({}, {})", self, self.error_code(), status);
        }

        (status, axum::Json(body)).into_response()
    }
}
