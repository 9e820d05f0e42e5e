use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::FromRequestParts;
use axum::http::{Request, header, request::Parts};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::warn;

use super::{BearerGateway, GatewayError, TokenValidator};
use crate::AuthContext;

/// Tower layer that puts a [`BearerGateway`] in front of a service.
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use launchpad_auth::{AuthContext, BearerGateway, BearerLayer, AuthError, validator_fn};
///
/// let gateway = BearerGateway::new(validator_fn(|_token: String| async {
///     Err::<AuthContext, _>(AuthError::Rejected("nobody gets in".to_string()))
/// }));
/// let app: Router = Router::new()
///     .route("/whoami", get(|context: AuthContext| async move {
///         context.subject().unwrap_or("anonymous").to_string()
///     }))
///     .layer(BearerLayer::new(gateway));
/// ```
#[derive(Debug, Clone)]
pub struct BearerLayer<V> {
    gateway: BearerGateway<V>,
}

impl<V> BearerLayer<V> {
    pub fn new(gateway: BearerGateway<V>) -> Self {
        Self { gateway }
    }
}

impl<S, V: Clone> Layer<S> for BearerLayer<V> {
    type Service = BearerService<S, V>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerService {
            inner,
            gateway: self.gateway.clone(),
        }
    }
}

/// Created by [`BearerLayer`]. Answers 401 without calling the inner service
/// unless the request carries a token the validator accepts; on success the
/// [`AuthContext`] is inserted into the request extensions.
#[derive(Debug, Clone)]
pub struct BearerService<S, V> {
    inner: S,
    gateway: BearerGateway<V>,
}

impl<S, V, B> Service<Request<B>> for BearerService<S, V>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    V: TokenValidator,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // The clone may not be ready; keep the one poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gateway = self.gateway.clone();

        Box::pin(async move {
            let header = match req.headers().get(header::AUTHORIZATION) {
                None => None,
                Some(value) => match value.to_str() {
                    Ok(value) => Some(value.to_owned()),
                    Err(_) => {
                        warn!("rejected request: authorization header is not visible ascii");
                        return Ok(GatewayError::MalformedCredential.into_response());
                    }
                },
            };

            match gateway.authenticate(header.as_deref()).await {
                Ok(context) => {
                    req.extensions_mut().insert(context);
                    inner.call(req).await
                }
                Err(error) => Ok(error.into_response()),
            }
        })
    }
}

/// Handlers behind a [`BearerLayer`] can take the caller's context directly.
impl<S: Send + Sync> FromRequestParts<S> for AuthContext {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(GatewayError::MissingCredential)
    }
}
