use crate::{IntrospectionStyle, OAuthProvider};

// References:
// - https://developers.google.com/identity/protocols/oauth2/limited-input-device
// - https://developers.google.com/identity/sign-in/web/backend-auth#calling-the-tokeninfo-endpoint

const DEVICE_AUTHORIZATION_URL: &str = "https://oauth2.googleapis.com/device/code";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const DEFAULT_SCOPE: &str = "email profile";

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    device_authorization_url: String,
    token_url: String,
    tokeninfo_url: String,
    userinfo_url: String,
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self {
            device_authorization_url: DEVICE_AUTHORIZATION_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            tokeninfo_url: TOKENINFO_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }
}

impl OAuthProvider for GoogleProvider {
    fn id(&self) -> &'static str {
        "google"
    }

    fn device_authorization_url(&self) -> &str {
        &self.device_authorization_url
    }

    fn token_url(&self) -> &str {
        &self.token_url
    }

    fn introspection_url(&self) -> &str {
        &self.tokeninfo_url
    }

    fn userinfo_url(&self) -> &str {
        &self.userinfo_url
    }

    fn default_scope(&self) -> &'static str {
        DEFAULT_SCOPE
    }

    fn introspection_style(&self) -> IntrospectionStyle {
        IntrospectionStyle::QueryParam("access_token")
    }

    fn requires_client_secret(&self) -> bool {
        true
    }
}

impl GoogleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points every endpoint at `base_url`, keeping Google's paths.
    pub fn with_base_url(self, base_url: impl AsRef<str>) -> Self {
        let base = base_url.as_ref().trim_end_matches('/');
        self.with_device_authorization_url(format!("{base}/device/code"))
            .with_token_url(format!("{base}/token"))
            .with_tokeninfo_url(format!("{base}/tokeninfo"))
            .with_userinfo_url(format!("{base}/oauth2/v2/userinfo"))
    }

    pub fn with_device_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.device_authorization_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_tokeninfo_url(mut self, url: impl Into<String>) -> Self {
        self.tokeninfo_url = url.into();
        self
    }

    pub fn with_userinfo_url(mut self, url: impl Into<String>) -> Self {
        self.userinfo_url = url.into();
        self
    }
}
