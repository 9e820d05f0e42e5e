//! OAuth 2.0 device-authorization grant and bearer-token gateway for
//! tool-invocation servers.
//!
//! A [`DeviceFlowClient`] obtains tokens from any [`CredentialProvider`];
//! [`OAuthClient`] is the HTTP implementation, configured by an
//! [`OAuthProvider`] such as [`GoogleProvider`] or [`GitHubProvider`].
//! A [`BearerGateway`] authenticates each inbound request and produces the
//! [`AuthContext`] that downstream handlers read.

mod client;
mod error;
mod flow;
mod gateway;
mod provider;
mod providers;
mod types;

pub use client::{OAuthClient, OAuthClientConfig};
pub use error::AuthError;
pub use flow::{DeviceFlowClient, DeviceFlowFailure, DeviceFlowSuccess, FlowState};
#[cfg(feature = "http")]
pub use gateway::{BearerLayer, BearerService};
pub use gateway::{
    BearerGateway, FnValidator, GatewayError, ProviderValidator, TokenValidator, extract_bearer,
    validator_fn,
};
pub use provider::{CredentialProvider, IntrospectionStyle, OAuthProvider};
pub use providers::{GitHubProvider, GoogleProvider};
pub use types::{
    AuthContext, DeviceAuthorizationSession, DeviceCodeResponse, TokenErrorResponse,
    TokenResponse, TokenSet,
};
