mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use launchpad_auth::{
    AuthContext, AuthError, BearerGateway, GatewayError, ProviderValidator, TokenValidator,
    extract_bearer, validator_fn,
};
use proptest::prelude::*;

use support::ScriptedProvider;

fn gateway() -> BearerGateway<impl TokenValidator> {
    BearerGateway::new(validator_fn(|token: String| async move {
        match token.as_str() {
            "good" => Ok(AuthContext::authenticated()
                .with_subject("user-1")
                .with_claim("role", "admin")),
            _ => Err(AuthError::Rejected("unknown token".to_string())),
        }
    }))
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let gateway = gateway();
    assert_eq!(
        gateway.authenticate(None).await,
        Err(GatewayError::MissingCredential)
    );
    assert_eq!(
        gateway.authenticate(Some("")).await,
        Err(GatewayError::MissingCredential)
    );
}

#[tokio::test]
async fn non_bearer_schemes_are_malformed() {
    let gateway = gateway();
    for header in ["Token abc", "Basic dXNlcjpwYXNz", "bearer good", "Bearer", "Bearer    "] {
        assert_eq!(
            gateway.authenticate(Some(header)).await,
            Err(GatewayError::MalformedCredential),
            "{header:?}"
        );
    }
}

#[tokio::test]
async fn accepted_token_yields_context() {
    let context = gateway().authenticate(Some("Bearer good")).await.unwrap();
    assert!(context.is_authenticated());
    assert_eq!(context.subject(), Some("user-1"));
    assert_eq!(context.claim("role"), Some(&serde_json::json!("admin")));
}

#[tokio::test]
async fn surrounding_whitespace_is_trimmed() {
    let context = gateway().authenticate(Some("Bearer  good  ")).await.unwrap();
    assert_eq!(context.subject(), Some("user-1"));
}

#[tokio::test]
async fn rejected_token_is_invalid_credential() {
    let error = gateway().authenticate(Some("Bearer bad")).await.unwrap_err();
    assert!(matches!(error, GatewayError::InvalidCredential { .. }));
    assert_eq!(error.client_message(), "Invalid token");
}

#[tokio::test]
async fn serve_runs_handler_only_when_authenticated() {
    let gateway = gateway();

    let subject = gateway
        .serve(Some("Bearer good"), |context| async move {
            context.subject().map(str::to_string)
        })
        .await
        .unwrap();
    assert_eq!(subject.as_deref(), Some("user-1"));

    let invoked = AtomicBool::new(false);
    let flag = &invoked;
    for header in [None, Some("Token good"), Some("Bearer bad")] {
        let result = gateway
            .serve(header, move |_context| async move {
                flag.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(result.is_err(), "{header:?}");
    }
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn validator_errors_become_invalid_credential() {
    let gateway = BearerGateway::new(validator_fn(|_token: String| async {
        Err::<AuthContext, _>(AuthError::HttpStatus {
            status: 503,
            body: "introspection down".to_string(),
        })
    }));

    let error = gateway.authenticate(Some("Bearer good")).await.unwrap_err();
    assert!(matches!(error, GatewayError::InvalidCredential { .. }));
}

#[tokio::test]
async fn provider_validator_accepts_unbounded_timeout() {
    let validator = ProviderValidator::new(Arc::new(ScriptedProvider::new([])))
        .with_timeout(Duration::MAX);
    let gateway = BearerGateway::new(validator);

    let context = gateway.authenticate(Some("Bearer granted")).await.unwrap();
    assert_eq!(context.subject(), Some("granted"));

    let error = gateway.authenticate(Some("Bearer other")).await.unwrap_err();
    assert!(matches!(error, GatewayError::InvalidCredential { .. }));
}

proptest! {
    #[test]
    fn prop_bearer_token_is_extracted(token in "[A-Za-z0-9._~+/=-]{1,64}") {
        let header = format!("Bearer {token}");
        prop_assert_eq!(extract_bearer(Some(&header)), Ok(token.as_str()));
    }

    #[test]
    fn prop_other_schemes_never_yield_a_token(header in "\\PC{0,64}") {
        prop_assume!(!header.starts_with("Bearer "));
        let expected = if header.is_empty() {
            GatewayError::MissingCredential
        } else {
            GatewayError::MalformedCredential
        };
        prop_assert_eq!(extract_bearer(Some(&header)), Err(expected));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Concurrent requests each see the context for their own token.
    #[test]
    fn prop_concurrent_requests_are_isolated(
        tokens in prop::collection::vec("[a-z0-9]{1,16}", 1..48),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let results = runtime.block_on(async {
            let gateway = Arc::new(BearerGateway::new(validator_fn(|token: String| async move {
                tokio::task::yield_now().await;
                Ok::<_, AuthError>(AuthContext::authenticated().with_subject(token))
            })));

            let handles: Vec<_> = tokens
                .iter()
                .cloned()
                .map(|token| {
                    let gateway = Arc::clone(&gateway);
                    tokio::spawn(async move {
                        let header = format!("Bearer {token}");
                        let context = gateway.authenticate(Some(&header)).await;
                        (token, context)
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await.unwrap());
            }
            results
        });

        for (token, context) in results {
            let context = context.unwrap();
            prop_assert_eq!(context.subject(), Some(token.as_str()));
        }
    }
}
