use std::sync::Arc;

use async_trait::async_trait;

use crate::{AuthContext, AuthError, DeviceAuthorizationSession, TokenSet};

/// How an authorization server reports whether an access token is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrospectionStyle {
    /// `GET <url>?<param>=<token>`, e.g. Google's `tokeninfo`.
    QueryParam(&'static str),
    /// `GET <url>` with `Authorization: Bearer <token>`.
    BearerHeader,
}

/// Static description of an authorization server: endpoints, default scope
/// and any extra parameters or headers it expects.
pub trait OAuthProvider: Send + Sync {
    fn id(&self) -> &'static str;
    fn device_authorization_url(&self) -> &str;
    fn token_url(&self) -> &str;
    fn introspection_url(&self) -> &str;
    fn userinfo_url(&self) -> &str;
    fn default_scope(&self) -> &'static str;

    fn introspection_style(&self) -> IntrospectionStyle {
        IntrospectionStyle::BearerHeader
    }

    fn requires_client_secret(&self) -> bool {
        false
    }

    fn device_code_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn token_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// The capability set the device flow and the gateway are written against.
///
/// Implementations must be safe to call from many requests at once.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn issue_device_code(&self) -> Result<DeviceAuthorizationSession, AuthError>;

    /// Returns [`AuthError::Pending`] or [`AuthError::SlowDown`] while the user
    /// has not yet approved the request.
    async fn exchange_device_code(&self, device_code: &str) -> Result<TokenSet, AuthError>;

    /// Keeps `refresh_token` in the result when the server does not rotate it.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AuthError>;

    /// `Ok(false)` for any non-200 answer; `Err` only when the call itself fails.
    async fn validate_token(&self, access_token: &str) -> Result<bool, AuthError>;

    async fn fetch_identity(&self, access_token: &str) -> Result<AuthContext, AuthError>;
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn issue_device_code(&self) -> Result<DeviceAuthorizationSession, AuthError> {
        (**self).issue_device_code().await
    }

    async fn exchange_device_code(&self, device_code: &str) -> Result<TokenSet, AuthError> {
        (**self).exchange_device_code(device_code).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        (**self).refresh_token(refresh_token).await
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool, AuthError> {
        (**self).validate_token(access_token).await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<AuthContext, AuthError> {
        (**self).fetch_identity(access_token).await
    }
}
