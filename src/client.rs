use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{HeaderName, HeaderValue},
};
use tracing::{debug, info};
use url::Url;

use crate::{
    AuthContext, AuthError, CredentialProvider, DeviceAuthorizationSession, DeviceCodeResponse,
    IntrospectionStyle, OAuthProvider, TokenErrorResponse, TokenResponse, TokenSet,
};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub device_code_params: Vec<(String, String)>,
    pub token_params: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            scope: None,
            device_code_params: Vec::new(),
            token_params: Vec::new(),
            timeout: None,
        }
    }

    /// Reads `<PREFIX>_CLIENT_ID`, `<PREFIX>_CLIENT_SECRET` and the optional
    /// `<PREFIX>_SCOPES` from the process environment.
    pub fn from_env(prefix: &str) -> Result<Self, AuthError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            lookup(&format!("{prefix}_{suffix}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let client_id = read("CLIENT_ID").ok_or_else(|| {
            AuthError::Configuration(format!("{prefix}_CLIENT_ID must be set"))
        })?;

        let mut config = Self::new(client_id);
        if let Some(secret) = read("CLIENT_SECRET") {
            config = config.with_client_secret(secret);
        }
        if let Some(scopes) = read("SCOPES") {
            config = config.with_scopes(scopes.split([',', ' ']));
        }
        Ok(config)
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Joins scopes with a single space, skipping empty entries.
    pub fn with_scopes<I, S>(self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let scope = scopes
            .into_iter()
            .filter_map(|scope| {
                let scope = scope.as_ref().trim();
                (!scope.is_empty()).then(|| scope.to_string())
            })
            .collect::<Vec<_>>()
            .join(" ");
        self.with_scope(scope)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_device_code_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.device_code_params.push((key.into(), value.into()));
        self
    }

    pub fn with_token_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.token_params.push((key.into(), value.into()));
        self
    }

    fn validate_for(&self, provider: &dyn OAuthProvider) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Configuration(format!(
                "{} client id is empty",
                provider.id()
            )));
        }

        let has_secret = self
            .client_secret
            .as_deref()
            .is_some_and(|secret| !secret.trim().is_empty());
        if provider.requires_client_secret() && !has_secret {
            return Err(AuthError::Configuration(format!(
                "{} requires a client secret",
                provider.id()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("device_code_params", &self.device_code_params)
            .field("token_params", &self.token_params)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// [`CredentialProvider`] backed by HTTP calls to the endpoints an
/// [`OAuthProvider`] describes.
#[derive(Debug, Clone)]
pub struct OAuthClient<P: OAuthProvider> {
    provider: P,
    config: OAuthClientConfig,
    http: Client,
}

impl<P: OAuthProvider> OAuthClient<P> {
    pub fn new(provider: P, config: OAuthClientConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Self::with_http_client(provider, config, http)
    }

    pub fn with_http_client(
        provider: P,
        config: OAuthClientConfig,
        http: Client,
    ) -> Result<Self, AuthError> {
        config.validate_for(&provider)?;
        Ok(Self {
            provider,
            config,
            http,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    fn scope(&self) -> &str {
        self.config
            .scope
            .as_deref()
            .unwrap_or(self.provider.default_scope())
    }

    fn client_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("client_id".to_string(), self.config.client_id.clone())];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret".to_string(), secret.clone()));
        }
        params
    }

    async fn send_token_request(
        &self,
        mut payload: Vec<(String, String)>,
    ) -> Result<TokenSet, AuthError> {
        payload.extend(self.client_params());
        payload.extend(self.provider.token_params());
        payload.extend(self.config.token_params.iter().cloned());

        let builder = self.http.post(self.provider.token_url());
        let builder = apply_headers(builder, &self.provider.request_headers())?;
        let response = builder.form(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;
        parse_token_body(status, body)
    }
}

#[async_trait]
impl<P: OAuthProvider> CredentialProvider for OAuthClient<P> {
    fn id(&self) -> &str {
        self.provider.id()
    }

    async fn issue_device_code(&self) -> Result<DeviceAuthorizationSession, AuthError> {
        let mut payload = vec![
            ("client_id".to_string(), self.config.client_id.clone()),
            ("scope".to_string(), self.scope().to_string()),
        ];
        payload.extend(self.provider.device_code_params());
        payload.extend(self.config.device_code_params.iter().cloned());

        debug!(provider = self.provider.id(), scope = self.scope(), "requesting device code");

        let builder = self.http.post(self.provider.device_authorization_url());
        let builder = apply_headers(builder, &self.provider.request_headers())?;
        let response = builder.form(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(AuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: DeviceCodeResponse =
            serde_json::from_str(&body).map_err(|err| AuthError::InvalidResponse {
                message: err.to_string(),
                body,
            })?;
        let session = DeviceAuthorizationSession::from_response(parsed, Utc::now())?;

        info!(
            provider = self.provider.id(),
            verification_uri = %session.verification_uri,
            interval_secs = session.poll_interval.map(|interval| interval.as_secs()),
            "device code issued"
        );
        Ok(session)
    }

    async fn exchange_device_code(&self, device_code: &str) -> Result<TokenSet, AuthError> {
        let payload = vec![
            ("grant_type".to_string(), DEVICE_CODE_GRANT.to_string()),
            ("device_code".to_string(), device_code.to_string()),
        ];
        self.send_token_request(payload).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let payload = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];
        let mut tokens = self.send_token_request(payload).await?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        debug!(provider = self.provider.id(), "access token refreshed");
        Ok(tokens)
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool, AuthError> {
        let builder = match self.provider.introspection_style() {
            IntrospectionStyle::QueryParam(param) => {
                let mut url = Url::parse(self.provider.introspection_url())?;
                url.query_pairs_mut().append_pair(param, access_token);
                self.http.get(url)
            }
            IntrospectionStyle::BearerHeader => self
                .http
                .get(self.provider.introspection_url())
                .bearer_auth(access_token),
        };
        let builder = apply_headers(builder, &self.provider.request_headers())?;

        // The token may be part of the URL, keep it out of error messages.
        let status = builder
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .status();
        debug!(
            provider = self.provider.id(),
            status = status.as_u16(),
            "token introspection"
        );
        Ok(status == StatusCode::OK)
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<AuthContext, AuthError> {
        let builder = self
            .http
            .get(self.provider.userinfo_url())
            .bearer_auth(access_token);
        let builder = apply_headers(builder, &self.provider.request_headers())?;
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let claims: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&body)
            .map_err(|err| AuthError::InvalidResponse {
                message: err.to_string(),
                body,
            })?;
        Ok(AuthContext::from_claims(claims))
    }
}

/// Token endpoints report polling state and failures as an RFC 6749 error
/// body, with a 4xx status or, for some servers, a 200. A body that is
/// neither an error nor a token is a protocol error.
fn parse_token_body(status: StatusCode, body: String) -> Result<TokenSet, AuthError> {
    if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
        if !error.error.is_empty() {
            return Err(error.into());
        }
    }

    if !status.is_success() {
        return Err(AuthError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse =
        serde_json::from_str(&body).map_err(|err| AuthError::InvalidResponse {
            message: err.to_string(),
            body,
        })?;
    TokenSet::from_response(token, Utc::now())
}

fn apply_headers(
    mut builder: RequestBuilder,
    headers: &[(String, String)],
) -> Result<RequestBuilder, AuthError> {
    for (name, value) in headers {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| AuthError::InvalidHeader {
                name: name.clone(),
                value: value.clone(),
            })?;
        let value = HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeader {
            name: name.to_string(),
            value: value.clone(),
        })?;
        builder = builder.header(name, value);
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{GitHubProvider, GoogleProvider};

    #[test]
    fn from_lookup_reads_prefixed_variables() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GOOGLE_CLIENT_ID", "id-123"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_SCOPES", "email, profile"),
        ]);
        let config =
            OAuthClientConfig::from_lookup("GOOGLE", |key| env.get(key).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.client_id, "id-123");
        assert_eq!(config.client_secret.as_deref(), Some("secret"));
        assert_eq!(config.scope.as_deref(), Some("email profile"));
    }

    #[test]
    fn from_lookup_fails_closed_without_client_id() {
        let result = OAuthClientConfig::from_lookup("GOOGLE", |_| None);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn google_client_requires_secret() {
        let result = OAuthClient::new(GoogleProvider::new(), OAuthClientConfig::new("id"));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn github_client_works_without_secret() {
        let client = OAuthClient::new(GitHubProvider::new(), OAuthClientConfig::new("id")).unwrap();
        assert_eq!(client.scope(), "read:user");
    }

    #[test]
    fn config_debug_redacts_secret() {
        let config = OAuthClientConfig::new("id").with_client_secret("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn parse_token_body_fails_closed_on_garbage_error_body() {
        let result = parse_token_body(StatusCode::BAD_REQUEST, "<html>oops</html>".to_string());
        assert!(matches!(result, Err(AuthError::HttpStatus { status: 400, .. })));
    }

    #[test]
    fn parse_token_body_maps_pending_with_ok_status() {
        let body = r#"{"error":"authorization_pending"}"#.to_string();
        assert!(matches!(
            parse_token_body(StatusCode::OK, body),
            Err(AuthError::Pending)
        ));
    }

    #[test]
    fn parse_token_body_reads_slow_down_interval() {
        let body = r#"{"error":"slow_down","interval":10}"#.to_string();
        assert!(matches!(
            parse_token_body(StatusCode::BAD_REQUEST, body),
            Err(AuthError::SlowDown { interval: Some(d) }) if d == Duration::from_secs(10)
        ));
    }

    #[test]
    fn parse_token_body_rejects_success_without_token() {
        let result = parse_token_body(StatusCode::OK, r#"{"token_type":"Bearer"}"#.to_string());
        assert!(matches!(result, Err(AuthError::InvalidResponse { .. })));
    }
}
