//! The x402-gated resource.
//!
//! A request without a credential gets HTTP 402 and the payment terms. A
//! request with `Authorization: Bearer <tx-reference>` gets the reference
//! verified on chain — every time, verdicts are never cached — and the
//! content on success.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use serde_json::{Value, json};
use tidings_payment::{PaymentChallenge, VerifyError};

use super::server::AppState;

/// GET /premium-content
pub async fn premium_content(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let payment = &state.payment;
    if payment.receiver_address.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "error": "Paywall receiver not configured"})),
        );
    }
    let challenge = PaymentChallenge::issue(&payment.receiver_address, payment.price_sol);

    let Some(auth) = headers.get(header::AUTHORIZATION) else {
        tracing::info!("💰 Unpaid request, issuing 402 challenge");
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(challenge.to_response_body()),
        );
    };

    let reference = match auth.to_str().ok().and_then(parse_bearer) {
        Some(r) => r,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": "Invalid authorization header"})),
            );
        }
    };

    match state
        .verifier
        .verify(
            &reference,
            &payment.receiver_address,
            challenge.expected_lamports(),
        )
        .await
    {
        Ok(verified) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "content": premium_payload(),
                "payment": {
                    "reference": verified.reference,
                    "received_lamports": verified.received_lamports,
                    "attempts": verified.attempts,
                },
            })),
        ),
        Err(e) => {
            let status = match &e {
                // Retryable or underpaid: re-issue the terms with a 402.
                VerifyError::Timeout | VerifyError::InsufficientAmount { .. } => {
                    StatusCode::PAYMENT_REQUIRED
                }
                // Wrong receiver or failed transaction: the credential is
                // unusable, paying again with the same reference won't help.
                VerifyError::InvalidReceiver | VerifyError::TransactionFailed(_) => {
                    StatusCode::BAD_REQUEST
                }
            };
            let mut body = challenge.to_response_body();
            body["error"] = json!(e.to_string());
            (status, Json(body))
        }
    }
}

fn parse_bearer(auth: &str) -> Option<String> {
    let token = auth.strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token.to_string())
}

/// The gated content itself. Static sample data — the point of this
/// endpoint is the payment flow, not the editorial.
fn premium_payload() -> Value {
    json!({
        "title": "Premium market brief",
        "articles": [
            {"headline": "Solana validator economics, explained", "tier": "premium"},
            {"headline": "This week in x402 adoption", "tier": "premium"},
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{AppState, build_router};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tidings_core::config::PaymentConfig;
    use tidings_core::error::Result;
    use tidings_payment::chain::{ChainClient, ChainTransaction};
    use tidings_payment::{PaymentVerifier, RetryPolicy, sol_to_lamports};
    use tidings_scheduler::{FireHandler, JobFire, JobRegistry, MemoryJobStore};
    use tower::util::ServiceExt;

    const RECEIVER: &str = "11111111111111111111111111111111";

    struct NoopHandler;

    #[async_trait]
    impl FireHandler for NoopHandler {
        async fn handle(&self, _fire: JobFire) -> Result<()> {
            Ok(())
        }
    }

    struct FixedChain {
        tx: Option<ChainTransaction>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChainClient for FixedChain {
        async fn get_transaction(&self, _reference: &str) -> Result<Option<ChainTransaction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tx.clone())
        }
    }

    fn paying_tx(lamports: u64) -> ChainTransaction {
        ChainTransaction {
            err: None,
            account_keys: vec!["payer".into(), RECEIVER.into()],
            pre_balances: vec![10 * lamports, 0],
            post_balances: vec![9 * lamports, lamports],
        }
    }

    fn app(chain: Arc<FixedChain>) -> axum::Router {
        let registry =
            JobRegistry::new(Box::new(MemoryJobStore::new()), 3).expect("registry");
        let state = AppState {
            registry: Arc::new(tokio::sync::Mutex::new(registry)),
            handler: Arc::new(NoopHandler),
            payment: PaymentConfig {
                receiver_address: RECEIVER.into(),
                ..Default::default()
            },
            verifier: Arc::new(PaymentVerifier::new(
                chain,
                RetryPolicy::new(5, Duration::from_secs(2)),
            )),
            default_timezone: chrono_tz::Asia::Shanghai,
            start_time: std::time::Instant::now(),
        };
        build_router(state)
    }

    async fn get_premium(app: axum::Router, auth: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().uri("/premium-content");
        if let Some(a) = auth {
            req = req.header("Authorization", a);
        }
        let resp = app
            .oneshot(req.body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn test_no_credential_gets_402_with_terms() {
        let chain = Arc::new(FixedChain {
            tx: None,
            calls: AtomicU32::new(0),
        });
        let (status, body) = get_premium(app(chain.clone()), None).await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["payment_info"]["address"], RECEIVER);
        assert_eq!(body["payment_info"]["currency"], "SOL");
        // No credential means no chain query at all.
        assert_eq!(chain.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_credential_gets_content() {
        let chain = Arc::new(FixedChain {
            tx: Some(paying_tx(sol_to_lamports(0.01))),
            calls: AtomicU32::new(0),
        });
        let (status, body) = get_premium(app(chain), Some("Bearer sig123")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["payment"]["reference"], "sig123");
        assert!(body["content"]["articles"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_underpaid_credential_gets_402() {
        let chain = Arc::new(FixedChain {
            tx: Some(paying_tx(sol_to_lamports(0.001))),
            calls: AtomicU32::new(0),
        });
        let (status, body) = get_premium(app(chain), Some("Bearer sig123")).await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert!(body["error"].as_str().unwrap().contains("insufficient"));
        assert_eq!(body["payment_info"]["address"], RECEIVER);
    }

    #[tokio::test]
    async fn test_failed_transaction_gets_400() {
        let mut tx = paying_tx(sol_to_lamports(0.01));
        tx.err = Some("InstructionError".into());
        let chain = Arc::new(FixedChain {
            tx: Some(tx),
            calls: AtomicU32::new(0),
        });
        let (status, _) = get_premium(app(chain), Some("Bearer sig123")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_receiver_gets_400() {
        let mut tx = paying_tx(sol_to_lamports(0.01));
        tx.account_keys = vec!["payer".into(), "someone-else".into()];
        let chain = Arc::new(FixedChain {
            tx: Some(tx),
            calls: AtomicU32::new(0),
        });
        let (status, _) = get_premium(app(chain), Some("Bearer sig123")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_header_gets_400_without_chain_query() {
        let chain = Arc::new(FixedChain {
            tx: None,
            calls: AtomicU32::new(0),
        });
        let (status, _) = get_premium(app(chain.clone()), Some("Basic abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(chain.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invisible_transaction_times_out_to_402() {
        let chain = Arc::new(FixedChain {
            tx: None,
            calls: AtomicU32::new(0),
        });
        let (status, body) = get_premium(app(chain.clone()), Some("Bearer sig123")).await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert!(body["error"].as_str().unwrap().contains("timed out"));
        assert_eq!(chain.calls.load(Ordering::SeqCst), 5);
    }
}
