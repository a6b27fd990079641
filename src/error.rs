//! llama-stream Error Types
//!
//! Centralized error handling using thiserror for type-safe errors.

use thiserror::Error;

/// Main error type for llama-stream operations
#[derive(Debug, Error)]
pub enum LlamaError {
    /// Hugging Face Hub errors (auth, network, missing files)
    #[error("Hub Error: {0}")]
    Hub(HubError),
    /// Model loading/inference errors
    #[error("Model Error: {0}")]
    Model(ModelError),
    /// Tokenizer load/encode/decode errors
    #[error("Tokenizer Error: {0}")]
    Tokenizer(String),
    /// File system errors
    #[error("File System Error: {0}")]
    FileSystem(String),
    /// Configuration errors
    #[error("Config Error: {0}")]
    Config(String),
}

/// Hub-related errors
#[derive(Debug, Error)]
#[error("[{code:?}] {message} (retryable: {retryable})")]
pub struct HubError {
    pub code: HubErrorCode,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubErrorCode {
    InvalidToken,
    Network,
    NotFound,
    Unknown,
}

impl HubError {
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self {
            code: HubErrorCode::InvalidToken,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: HubErrorCode::Network,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: HubErrorCode::NotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            code: HubErrorCode::Unknown,
            message: message.into(),
            retryable: false,
        }
    }

    /// Classify an error message coming back from the hub client.
    ///
    /// hf-hub folds HTTP status codes into its transport error text, so the
    /// status is recovered from the message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("401") || message.contains("403") {
            Self::invalid_token(message)
        } else if message.contains("404") {
            Self::not_found(message)
        } else if message.contains("Transport") || message.contains("timed out") || message.contains("Connection") {
            Self::network(message)
        } else {
            Self::unknown(message)
        }
    }
}

/// Model/Inference errors
#[derive(Debug, Error)]
#[error("[{kind:?}] {message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    NotDownloaded,
    LoadFailed,
    InferenceFailed,
    InvalidInput,
}

impl ModelError {
    pub fn not_downloaded(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::NotDownloaded,
            message: message.into(),
        }
    }

    pub fn load_failed(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::LoadFailed,
            message: message.into(),
        }
    }

    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::InferenceFailed,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::InvalidInput,
            message: message.into(),
        }
    }
}

impl From<HubError> for LlamaError {
    fn from(err: HubError) -> Self {
        LlamaError::Hub(err)
    }
}

impl From<ModelError> for LlamaError {
    fn from(err: ModelError) -> Self {
        LlamaError::Model(err)
    }
}

impl From<std::io::Error> for LlamaError {
    fn from(err: std::io::Error) -> Self {
        LlamaError::FileSystem(err.to_string())
    }
}

impl From<serde_json::Error> for LlamaError {
    fn from(err: serde_json::Error) -> Self {
        LlamaError::Config(format!("invalid JSON: {}", err))
    }
}

impl From<toml::de::Error> for LlamaError {
    fn from(err: toml::de::Error) -> Self {
        LlamaError::Config(format!("invalid TOML: {}", err))
    }
}

// Tensor errors surface during inference; load paths map them explicitly.
impl From<candle_core::Error> for LlamaError {
    fn from(err: candle_core::Error) -> Self {
        LlamaError::Model(ModelError::inference_failed(err.to_string()))
    }
}

impl From<hf_hub::api::sync::ApiError> for LlamaError {
    fn from(err: hf_hub::api::sync::ApiError) -> Self {
        LlamaError::Hub(HubError::classify(err.to_string()))
    }
}

/// Result type alias for llama-stream operations
pub type LlamaResult<T> = Result<T, LlamaError>;
