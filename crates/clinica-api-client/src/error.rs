use std::path::PathBuf;

use clinica_client_core::{ConfigError, StorageError};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by [`crate::ClinicaApiClient`].
///
/// `Client` and `Server` display only the backend's message so they can be
/// shown to the user as-is.
#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("api_client_invalid_path")]
    InvalidPath,
    #[error("invalid api config: {0}")]
    Config(#[from] ConfigError),
    /// An attempt exceeded the configured timeout.
    #[error("Request timeout")]
    Timeout,
    /// Connection refused, reset, DNS failure and similar.
    #[error("api_request_failed:{message}")]
    Transport { message: String },
    #[error("{message}")]
    Server { status: StatusCode, message: String },
    #[error("{message}")]
    Client { status: StatusCode, message: String },
    #[error("api_json_encode_failed:{message}")]
    Encode { message: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    /// `POST /token` rejected the username or password.
    #[error("{message}")]
    InvalidCredentials { message: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to write {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl ApiClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Failures that a later attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Transport { .. } | Self::Read { .. } | Self::Server { .. }
        )
    }

    pub(crate) fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport {
                message: error.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiClientError>;
