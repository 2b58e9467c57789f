use crate::payload::ImagePayload;

/// Error type for inference calls.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("HTTP Error {status}: {body}")]
    HttpError { status: u16, body: String },
    #[error("Malformed response body: {0}")]
    MalformedBody(String),
    #[error("Empty or malformed response: {0}")]
    EmptyOrMalformedResponse(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AiError {
    /// Failures of the delivery itself: the request never produced a usable
    /// HTTP success with a JSON body.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            AiError::ConnectionError(_) | AiError::HttpError { .. } | AiError::MalformedBody(_)
        )
    }
}

/// One instruction plus an optional image. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    instruction: String,
    image: Option<ImagePayload>,
}

impl InferenceRequest {
    pub fn text(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            image: None,
        }
    }

    pub fn with_image(instruction: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            instruction: instruction.into(),
            image: Some(image),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }
}
