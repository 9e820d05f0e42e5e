use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::{AuthContext, AuthError, CredentialProvider};

const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_VALIDATION_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Turns a bearer token into an [`AuthContext`] or an error.
///
/// The gateway calls this once per request and may call it from many
/// requests at the same time, so implementations must not rely on any
/// external locking.
pub trait TokenValidator: Clone + Send + Sync + 'static {
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<AuthContext, AuthError>> + Send;
}

/// A [`TokenValidator`] built from an async closure. See [`validator_fn`].
#[derive(Clone)]
pub struct FnValidator<F> {
    f: F,
}

/// Wraps a caller-supplied validation function.
///
/// ```
/// use launchpad_auth::{AuthContext, AuthError, BearerGateway, validator_fn};
///
/// let gateway = BearerGateway::new(validator_fn(|token: String| async move {
///     if token == "let-me-in" {
///         Ok(AuthContext::authenticated().with_subject("demo"))
///     } else {
///         Err(AuthError::Rejected("unknown token".to_string()))
///     }
/// }));
/// # let _ = gateway;
/// ```
pub fn validator_fn<F, Fut>(f: F) -> FnValidator<F>
where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthContext, AuthError>> + Send,
{
    FnValidator { f }
}

impl<F, Fut> TokenValidator for FnValidator<F>
where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthContext, AuthError>> + Send,
{
    fn validate(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<AuthContext, AuthError>> + Send {
        (self.f)(token.to_string())
    }
}

/// Validates through a [`CredentialProvider`]: introspection first, then an
/// identity lookup to fill in the context.
///
/// A token the server accepts but whose identity cannot be fetched still
/// authenticates, with a context that carries no profile claims.
pub struct ProviderValidator<P: ?Sized> {
    provider: Arc<P>,
    timeout: Duration,
}

impl<P: ?Sized> Clone for ProviderValidator<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            timeout: self.timeout,
        }
    }
}

impl<P: CredentialProvider + ?Sized + 'static> ProviderValidator<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }

    /// Upper bound for introspection and identity lookup together, capped
    /// at one day.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_VALIDATION_TIMEOUT);
        self
    }
}

impl<P: CredentialProvider + ?Sized + 'static> TokenValidator for ProviderValidator<P> {
    async fn validate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let deadline = Instant::now() + self.timeout;

        let valid = timeout_at(deadline, self.provider.validate_token(token))
            .await
            .map_err(|_| AuthError::Rejected("token validation timed out".to_string()))??;
        if !valid {
            return Err(AuthError::Rejected(format!(
                "{} did not accept the token",
                self.provider.id()
            )));
        }

        match timeout_at(deadline, self.provider.fetch_identity(token)).await {
            Ok(Ok(context)) => Ok(context),
            Ok(Err(error)) => {
                debug!(provider = self.provider.id(), %error, "identity lookup failed");
                Ok(AuthContext::authenticated())
            }
            Err(_) => {
                debug!(provider = self.provider.id(), "identity lookup timed out");
                Ok(AuthContext::authenticated())
            }
        }
    }
}
