//! Per-request bearer-token authentication.
//!
//! [`BearerGateway`] pulls the token out of an `Authorization` header value,
//! hands it to a [`TokenValidator`] and yields the resulting [`AuthContext`].
//! A downstream handler only ever runs with a context in hand. With the
//! `http` feature, [`BearerLayer`] applies the same check to every request of
//! a tower/axum service and stores the context in the request extensions.

mod error;
#[cfg(feature = "http")]
mod layer;
mod validator;

use std::future::Future;

use tracing::warn;

use crate::AuthContext;

pub use error::GatewayError;
#[cfg(feature = "http")]
pub use layer::{BearerLayer, BearerService};
pub use validator::{FnValidator, ProviderValidator, TokenValidator, validator_fn};

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone)]
pub struct BearerGateway<V> {
    validator: V,
}

impl<V: TokenValidator> BearerGateway<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// Authenticates one request from its raw `Authorization` header value.
    /// An absent or empty header is a missing credential.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<AuthContext, GatewayError> {
        let token = match extract_bearer(header) {
            Ok(token) => token,
            Err(error) => {
                warn!(reason = %error, "rejected request");
                return Err(error);
            }
        };

        self.validator.validate(token).await.map_err(|error| {
            warn!(%error, "bearer token validation failed");
            GatewayError::InvalidCredential {
                reason: error.to_string(),
            }
        })
    }

    /// Runs `handler` with the caller's context, or not at all.
    pub async fn serve<H, Fut, T>(
        &self,
        header: Option<&str>,
        handler: H,
    ) -> Result<T, GatewayError>
    where
        H: FnOnce(AuthContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let context = self.authenticate(header).await?;
        Ok(handler(context).await)
    }
}

/// Returns the trimmed token from a `Bearer <token>` header value.
///
/// The scheme match is case-sensitive and requires the single space.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, GatewayError> {
    let value = match header {
        Some(value) if !value.is_empty() => value,
        _ => return Err(GatewayError::MissingCredential),
    };

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(GatewayError::MalformedCredential)?
        .trim();
    if token.is_empty() {
        return Err(GatewayError::MalformedCredential);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_cases() {
        assert_eq!(extract_bearer(None), Err(GatewayError::MissingCredential));
        assert_eq!(extract_bearer(Some("")), Err(GatewayError::MissingCredential));
        assert_eq!(
            extract_bearer(Some("Token abc")),
            Err(GatewayError::MalformedCredential)
        );
        assert_eq!(
            extract_bearer(Some("bearer abc")),
            Err(GatewayError::MalformedCredential)
        );
        assert_eq!(
            extract_bearer(Some("Bearer ")),
            Err(GatewayError::MalformedCredential)
        );
        assert_eq!(
            extract_bearer(Some("Bearer    ")),
            Err(GatewayError::MalformedCredential)
        );
        assert_eq!(extract_bearer(Some("Bearer  abc ")), Ok("abc"));
    }
}
