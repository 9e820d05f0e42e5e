use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AuthError;

const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;
/// Longest wait the crate ever schedules on the tokio clock.
pub(crate) const MAX_WAIT: Duration = Duration::from_secs(MAX_LIFETIME_SECS);

/// A device/user code pair issued by the authorization server.
///
/// Created once per flow and never mutated. `expires_at` is fixed from the
/// server's `expires_in` at the moment the response was received.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceAuthorizationSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Server-requested interval. `None` when the server sent none, or zero,
    /// and the polling client's default applies.
    pub poll_interval: Option<Duration>,
}

impl DeviceAuthorizationSession {
    pub fn from_response(
        response: DeviceCodeResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let non_empty = |uri: &String| !uri.is_empty();
        let verification_uri = response
            .verification_uri
            .filter(non_empty)
            .or(response.verification_url.filter(non_empty))
            .ok_or_else(|| {
                AuthError::invalid_response(
                    "device code response has no verification_uri",
                    String::new(),
                )
            })?;

        Ok(Self {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri,
            verification_uri_complete: response
                .verification_uri_complete
                .or(response.verification_url_complete),
            expires_at: issued_at + seconds(response.expires_in),
            poll_interval: response
                .interval
                .filter(|secs| *secs > 0)
                .map(|secs| Duration::from_secs(secs.min(MAX_LIFETIME_SECS))),
        })
    }

    /// Time left before the code expires, zero once it has.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for DeviceAuthorizationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAuthorizationSession")
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .field("expires_at", &self.expires_at)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// Tokens returned by a device-code exchange or a refresh.
///
/// Expiry is not enforced here; callers check [`TokenSet::is_expired`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenSet {
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        if response.access_token.trim().is_empty() {
            return Err(AuthError::invalid_response(
                "token response has an empty access_token",
                String::new(),
            ));
        }

        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|token| !token.is_empty()),
            expires_at: issued_at + seconds(lifetime),
            token_type: response.token_type,
            scope: response.scope,
        })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Identity and claims resolved for an authenticated request.
///
/// Built once by a validator and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthContext {
    authenticated: bool,
    subject: Option<String>,
    email: Option<String>,
    name: Option<String>,
    claims: BTreeMap<String, serde_json::Value>,
}

impl AuthContext {
    /// A context that only records successful authentication.
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            subject: None,
            email: None,
            name: None,
            claims: BTreeMap::new(),
        }
    }

    pub fn from_claims(claims: serde_json::Map<String, serde_json::Value>) -> Self {
        let subject = claims
            .get("sub")
            .or_else(|| claims.get("id"))
            .and_then(claim_to_string);
        let email = claims.get("email").and_then(claim_to_string);
        let name = claims
            .get("name")
            .or_else(|| claims.get("login"))
            .and_then(claim_to_string);

        Self {
            authenticated: true,
            subject,
            email,
            name,
            claims: claims.into_iter().collect(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_claim(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.claims.get(key)
    }

    pub fn claims(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.claims
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    /// RFC 8628 name. Google sends `verification_url` instead, some servers
    /// send both.
    #[serde(default)]
    pub verification_uri: Option<String>,
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default)]
    pub verification_url_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// RFC 6749 section 5.2 error body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub interval: Option<u64>,
}

impl From<TokenErrorResponse> for AuthError {
    fn from(response: TokenErrorResponse) -> Self {
        match response.error.as_str() {
            "authorization_pending" => AuthError::Pending,
            "slow_down" => AuthError::SlowDown {
                interval: response.interval.map(Duration::from_secs),
            },
            "access_denied" => AuthError::Denied,
            "expired_token" => AuthError::Expired,
            _ => AuthError::OAuth {
                code: response.error,
                description: response.error_description,
            },
        }
    }
}

// Server lifetimes are clamped so date arithmetic cannot overflow.
fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64)
}

fn claim_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
