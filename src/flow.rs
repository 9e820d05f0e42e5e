//! OAuth 2.0 device-authorization grant (RFC 8628) driven to completion.
//!
//! [`DeviceFlowClient::run`] issues a device code, hands it to the caller for
//! display, then polls the token endpoint until the user approves, denies,
//! the code expires, or the caller cancels. Every poll is gated by a timer
//! and raced against the expiry deadline and the cancellation token, so
//! exactly one terminal state is reached.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::MAX_WAIT;
use crate::{AuthError, CredentialProvider, DeviceAuthorizationSession, TokenSet};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    CodeIssued,
    Polling,
    Succeeded,
    Expired,
    Denied,
    Cancelled,
    Failed,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Expired | Self::Denied | Self::Cancelled | Self::Failed
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CodeIssued => "code_issued",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Expired => "expired",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens plus the session they were issued for, kept for display and audit.
#[derive(Debug, Clone)]
pub struct DeviceFlowSuccess {
    pub tokens: TokenSet,
    pub session: DeviceAuthorizationSession,
}

#[derive(Debug, Error)]
#[error("device flow {state}: {error}")]
pub struct DeviceFlowFailure {
    pub state: FlowState,
    /// `None` when the flow failed before a code was issued.
    pub session: Option<DeviceAuthorizationSession>,
    #[source]
    pub error: AuthError,
}

#[derive(Debug, Clone)]
pub struct DeviceFlowClient<P> {
    provider: P,
    default_interval: Duration,
}

enum Wake<T> {
    Cancelled,
    Expired,
    Ready(T),
}

impl<P: CredentialProvider> DeviceFlowClient<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            default_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Interval used when the server asked for none. Zero is ignored.
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.default_interval = interval;
        }
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Runs the whole flow. `on_code` is called once, as soon as the device
    /// code is issued, so the user code can be shown before polling starts.
    pub async fn run<F>(
        &self,
        cancel: &CancellationToken,
        on_code: F,
    ) -> Result<DeviceFlowSuccess, DeviceFlowFailure>
    where
        F: FnOnce(&DeviceAuthorizationSession),
    {
        let mut state = FlowState::Idle;

        let issued = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.issue_device_code() => Some(result),
        };

        let Some(issued) = issued else {
            self.transition(&mut state, FlowState::Cancelled);
            return Err(failure(state, None, AuthError::Cancelled));
        };

        let session = match issued {
            Ok(session) => session,
            Err(error) => {
                self.transition(&mut state, FlowState::Failed);
                return Err(failure(state, None, error));
            }
        };

        self.transition(&mut state, FlowState::CodeIssued);
        on_code(&session);
        self.poll_session(session, cancel, state).await
    }

    /// Polls an already issued session until it reaches a terminal state.
    pub async fn poll(
        &self,
        session: DeviceAuthorizationSession,
        cancel: &CancellationToken,
    ) -> Result<DeviceFlowSuccess, DeviceFlowFailure> {
        self.poll_session(session, cancel, FlowState::CodeIssued).await
    }

    async fn poll_session(
        &self,
        session: DeviceAuthorizationSession,
        cancel: &CancellationToken,
        mut state: FlowState,
    ) -> Result<DeviceFlowSuccess, DeviceFlowFailure> {
        let deadline = Instant::now() + session.remaining(Utc::now()).min(MAX_WAIT);
        let mut interval = session
            .poll_interval
            .filter(|interval| !interval.is_zero())
            .unwrap_or(self.default_interval);
        let mut next_poll = next_tick(interval, deadline);
        let mut attempts: u32 = 0;

        self.transition(&mut state, FlowState::Polling);

        loop {
            match race(cancel, deadline, sleep_until(next_poll)).await {
                Wake::Ready(()) => {}
                Wake::Cancelled => return Err(self.cancelled(&mut state, session)),
                Wake::Expired => return Err(self.expired(&mut state, session)),
            }

            attempts += 1;
            debug!(
                provider = self.provider.id(),
                attempt = attempts,
                interval_secs = interval.as_secs(),
                "polling token endpoint"
            );

            let outcome = race(
                cancel,
                deadline,
                self.provider.exchange_device_code(&session.device_code),
            )
            .await;

            let result = match outcome {
                Wake::Ready(result) => result,
                Wake::Cancelled => return Err(self.cancelled(&mut state, session)),
                Wake::Expired => return Err(self.expired(&mut state, session)),
            };

            match result {
                Ok(tokens) => {
                    self.transition(&mut state, FlowState::Succeeded);
                    info!(provider = self.provider.id(), attempts, "device flow authorized");
                    return Ok(DeviceFlowSuccess { tokens, session });
                }
                Err(AuthError::Pending) => {}
                Err(AuthError::SlowDown { interval: hint }) => {
                    interval = slowed(interval, hint);
                    warn!(
                        provider = self.provider.id(),
                        interval_secs = interval.as_secs(),
                        "authorization server asked to slow down"
                    );
                }
                Err(AuthError::Denied) => {
                    self.transition(&mut state, FlowState::Denied);
                    return Err(failure(state, Some(session), AuthError::Denied));
                }
                Err(AuthError::Expired) => {
                    return Err(self.expired(&mut state, session));
                }
                Err(error) => {
                    self.transition(&mut state, FlowState::Failed);
                    return Err(failure(state, Some(session), error));
                }
            }

            next_poll = next_tick(interval, deadline);
        }
    }

    fn cancelled(
        &self,
        state: &mut FlowState,
        session: DeviceAuthorizationSession,
    ) -> DeviceFlowFailure {
        self.transition(state, FlowState::Cancelled);
        failure(*state, Some(session), AuthError::Cancelled)
    }

    fn expired(
        &self,
        state: &mut FlowState,
        session: DeviceAuthorizationSession,
    ) -> DeviceFlowFailure {
        self.transition(state, FlowState::Expired);
        failure(*state, Some(session), AuthError::Expired)
    }

    fn transition(&self, state: &mut FlowState, next: FlowState) {
        debug_assert!(!state.is_terminal(), "no transitions out of {state}");
        debug!(provider = self.provider.id(), from = %state, to = %next, "device flow transition");
        *state = next;
    }
}

/// Waits for `fut`, giving up early on cancellation or at `deadline`.
/// Cancellation wins ties, then expiry.
async fn race<F: Future>(
    cancel: &CancellationToken,
    deadline: Instant,
    fut: F,
) -> Wake<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wake::Cancelled,
        _ = sleep_until(deadline) => Wake::Expired,
        value = fut => Wake::Ready(value),
    }
}

/// When the next poll is due. Never later than `deadline`, where the expiry
/// branch of [`race`] wins.
fn next_tick(interval: Duration, deadline: Instant) -> Instant {
    Instant::now()
        .checked_add(interval)
        .map_or(deadline, |at| at.min(deadline))
}

/// Doubles the interval, or takes the server's suggestion when it is longer.
fn slowed(current: Duration, hint: Option<Duration>) -> Duration {
    let doubled = current.saturating_mul(2);
    match hint {
        Some(hint) if hint > doubled => hint,
        _ => doubled,
    }
}

fn failure(
    state: FlowState,
    session: Option<DeviceAuthorizationSession>,
    error: AuthError,
) -> DeviceFlowFailure {
    DeviceFlowFailure {
        state,
        session,
        error,
    }
}
