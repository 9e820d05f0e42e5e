use crate::OAuthProvider;

// References:
// - https://docs.github.com/en/apps/oauth-apps/building-oauth-apps/authorizing-oauth-apps#device-flow

const DEVICE_AUTHORIZATION_URL: &str = "https://github.com/login/device/code";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";

const DEFAULT_SCOPE: &str = "read:user";

/// GitHub device flow. GitHub has no introspection endpoint, so a token is
/// considered valid when `GET /user` accepts it.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    device_authorization_url: String,
    token_url: String,
    user_url: String,
}

impl Default for GitHubProvider {
    fn default() -> Self {
        Self {
            device_authorization_url: DEVICE_AUTHORIZATION_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            user_url: USER_URL.to_string(),
        }
    }
}

impl OAuthProvider for GitHubProvider {
    fn id(&self) -> &'static str {
        "github"
    }

    fn device_authorization_url(&self) -> &str {
        &self.device_authorization_url
    }

    fn token_url(&self) -> &str {
        &self.token_url
    }

    fn introspection_url(&self) -> &str {
        &self.user_url
    }

    fn userinfo_url(&self) -> &str {
        &self.user_url
    }

    fn default_scope(&self) -> &'static str {
        DEFAULT_SCOPE
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        vec![("Accept".to_string(), "application/json".to_string())]
    }
}

impl GitHubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.device_authorization_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_user_url(mut self, url: impl Into<String>) -> Self {
        self.user_url = url.into();
        self
    }
}
