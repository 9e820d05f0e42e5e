use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("authorization server error: {code}{}", describe(.description))]
    OAuth {
        code: String,
        description: Option<String>,
    },

    #[error("authorization pending")]
    Pending,

    #[error("slow down requested")]
    SlowDown { interval: Option<Duration> },

    #[error("access denied by user")]
    Denied,

    #[error("device code expired")]
    Expired,

    #[error("device flow cancelled")]
    Cancelled,

    #[error("token rejected: {0}")]
    Rejected(String),
}

impl AuthError {
    /// Malformed or unexpected server responses, including transport failures.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Url(_)
                | Self::InvalidHeader { .. }
                | Self::HttpStatus { .. }
                | Self::InvalidResponse { .. }
                | Self::OAuth { .. }
        )
    }

    /// Only the two polling responses are ever retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Pending | Self::SlowDown { .. })
    }

    pub(crate) fn invalid_response(message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
            body: body.into(),
        }
    }
}

fn describe(description: &Option<String>) -> String {
    match description {
        Some(text) if !text.is_empty() => format!(" - {text}"),
        _ => String::new(),
    }
}
