use thiserror::Error;

/// Why a request was refused. The variants are kept apart for logs and
/// tests; over HTTP every one of them is a plain 401.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("missing authorization header")]
    MissingCredential,

    #[error("authorization header is not a bearer token")]
    MalformedCredential,

    #[error("invalid credential: {reason}")]
    InvalidCredential { reason: String },
}

impl GatewayError {
    /// Short body sent back to the caller. Never includes the token.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Authorization required",
            Self::MalformedCredential => "Invalid Authorization format - expected Bearer token",
            Self::InvalidCredential { .. } => "Invalid token",
        }
    }

    /// RFC 6750 section 3 challenge for the `WWW-Authenticate` header.
    pub fn www_authenticate(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Bearer",
            Self::MalformedCredential => "Bearer error=\"invalid_request\"",
            Self::InvalidCredential { .. } => "Bearer error=\"invalid_token\"",
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{StatusCode, header};

        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, self.www_authenticate())],
            self.client_message(),
        )
            .into_response()
    }
}
