#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use launchpad_auth::{
    AuthContext, AuthError, CredentialProvider, DeviceAuthorizationSession, TokenSet,
};
use tokio::time::Instant;

/// What the next token-endpoint poll answers.
#[derive(Debug, Clone)]
pub enum Step {
    Pending,
    SlowDown(Option<Duration>),
    Denied,
    Expired,
    Protocol,
    Grant,
    Hang,
}

/// In-memory [`CredentialProvider`] that replays a script of poll answers
/// and records when each poll happened. Polls past the end of the script
/// answer `Pending`.
pub struct ScriptedProvider {
    expires_in: Duration,
    interval: Duration,
    fail_issue: bool,
    script: Mutex<VecDeque<Step>>,
    polls: Mutex<Vec<Instant>>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            expires_in: Duration::from_secs(600),
            interval: Duration::from_secs(5),
            fail_issue: false,
            script: Mutex::new(steps.into_iter().collect()),
            polls: Mutex::new(Vec::new()),
        }
    }

    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn failing_issue(mut self) -> Self {
        self.fail_issue = true;
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.lock().expect("polls lock poisoned").len()
    }

    /// Offsets of each poll from `start`.
    pub fn poll_offsets(&self, start: Instant) -> Vec<Duration> {
        self.polls
            .lock()
            .expect("polls lock poisoned")
            .iter()
            .map(|at| at.duration_since(start))
            .collect()
    }
}

pub fn token_set(access_token: &str) -> TokenSet {
    TokenSet {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        token_type: Some("Bearer".to_string()),
        scope: None,
    }
}

#[async_trait]
impl CredentialProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn issue_device_code(&self) -> Result<DeviceAuthorizationSession, AuthError> {
        if self.fail_issue {
            return Err(AuthError::HttpStatus {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(DeviceAuthorizationSession {
            device_code: "device-1".to_string(),
            user_code: "ABCD-EFGH".to_string(),
            verification_uri: "https://auth.example.com/device".to_string(),
            verification_uri_complete: None,
            expires_at: Utc::now() + chrono::Duration::from_std(self.expires_in).unwrap(),
            poll_interval: Some(self.interval),
        })
    }

    async fn exchange_device_code(&self, device_code: &str) -> Result<TokenSet, AuthError> {
        assert_eq!(device_code, "device-1");
        self.polls
            .lock()
            .expect("polls lock poisoned")
            .push(Instant::now());
        let step = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Step::Pending);

        match step {
            Step::Pending => Err(AuthError::Pending),
            Step::SlowDown(interval) => Err(AuthError::SlowDown { interval }),
            Step::Denied => Err(AuthError::Denied),
            Step::Expired => Err(AuthError::Expired),
            Step::Protocol => Err(AuthError::OAuth {
                code: "invalid_client".to_string(),
                description: None,
            }),
            Step::Grant => Ok(token_set("granted")),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenSet, AuthError> {
        Ok(token_set("refreshed"))
    }

    async fn validate_token(&self, access_token: &str) -> Result<bool, AuthError> {
        Ok(access_token == "granted")
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<AuthContext, AuthError> {
        Ok(AuthContext::authenticated().with_subject(access_token))
    }
}
