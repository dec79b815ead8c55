use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to encode plate crop: {message}")]
    Encode { message: String },
    #[error("recognition backend error: {message}")]
    Backend { message: String },
    #[error("recognition endpoint unreachable: {message}")]
    Transport { message: String },
}

impl OcrError {
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
