//! On-chain payment verification.
//!
//! Given a claimed transaction reference and the expected (receiver, amount),
//! poll the chain within the retry budget and classify the outcome. The
//! amount check uses the receiver's balance delta, not the transfer's nominal
//! amount field — a transaction that "targets" the receiver but moves less
//! does not pass.

use std::sync::Arc;
use thiserror::Error;

use crate::chain::ChainClient;
use crate::challenge::lamports_to_sol;
use crate::retry::RetryPolicy;

/// Terminal verification failures. Only `Timeout` means "try again later";
/// the rest will never succeed for this reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("transaction failed on chain: {0}")]
    TransactionFailed(String),

    #[error("expected receiver is not a participant of the transaction")]
    InvalidReceiver,

    #[error("insufficient payment: received {received} lamports, expected {expected}")]
    InsufficientAmount { received: i64, expected: u64 },

    #[error("payment verification timed out")]
    Timeout,
}

impl VerifyError {
    /// Whether the caller may retry later with the same reference.
    pub fn is_retry_later(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub reference: String,
    pub received_lamports: u64,
    /// Which poll attempt found the transaction (1-based).
    pub attempts: u32,
}

/// The verifier. Read-only: it never mutates chain or local state, and its
/// verdicts are not cached — callers re-verify on every presentation.
pub struct PaymentVerifier {
    chain: Arc<dyn ChainClient>,
    policy: RetryPolicy,
}

impl PaymentVerifier {
    pub fn new(chain: Arc<dyn ChainClient>, policy: RetryPolicy) -> Self {
        Self { chain, policy }
    }

    /// Verify that `reference` pays at least `expected_lamports` to
    /// `receiver`.
    ///
    /// Not-yet-visible transactions (and transient RPC failures) are retried
    /// within the policy budget; everything else is terminal on first sight.
    pub async fn verify(
        &self,
        reference: &str,
        receiver: &str,
        expected_lamports: u64,
    ) -> Result<Verified, VerifyError> {
        for attempt in 1..=self.policy.max_attempts {
            match self.chain.get_transaction(reference).await {
                Ok(Some(tx)) => {
                    if let Some(err) = tx.err {
                        tracing::warn!("❌ Transaction {reference} failed on chain: {err}");
                        return Err(VerifyError::TransactionFailed(err));
                    }
                    if !tx.account_keys.iter().any(|k| k == receiver) {
                        tracing::warn!("❌ Transaction {reference} does not involve the receiver");
                        return Err(VerifyError::InvalidReceiver);
                    }
                    let received = tx.balance_delta(receiver).unwrap_or(0);
                    if received >= 0 && received as u64 >= expected_lamports {
                        tracing::info!(
                            "✅ Payment verified: {} SOL received (attempt {attempt})",
                            lamports_to_sol(received as u64)
                        );
                        return Ok(Verified {
                            reference: reference.to_string(),
                            received_lamports: received as u64,
                            attempts: attempt,
                        });
                    }
                    tracing::warn!(
                        "❌ Insufficient payment: got {received} lamports, expected {expected_lamports}"
                    );
                    return Err(VerifyError::InsufficientAmount {
                        received,
                        expected: expected_lamports,
                    });
                }
                Ok(None) => {
                    tracing::debug!(
                        "⏳ Transaction {reference} not visible yet ({attempt}/{})",
                        self.policy.max_attempts
                    );
                }
                Err(e) => {
                    // Transient RPC trouble counts as "not visible yet".
                    tracing::debug!("⏳ Chain query failed (attempt {attempt}): {e}");
                }
            }
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }
        Err(VerifyError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainTransaction;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tidings_core::{Result as CoreResult, TidingsError};

    /// Chain fake: the transaction becomes visible after `visible_after`
    /// polls (u32::MAX = never).
    struct ScriptedChain {
        visible_after: u32,
        polls: AtomicU32,
        tx: ChainTransaction,
    }

    impl ScriptedChain {
        fn new(visible_after: u32, tx: ChainTransaction) -> Arc<Self> {
            Arc::new(Self {
                visible_after,
                polls: AtomicU32::new(0),
                tx,
            })
        }
    }

    #[async_trait]
    impl ChainClient for ScriptedChain {
        async fn get_transaction(&self, _r: &str) -> CoreResult<Option<ChainTransaction>> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.visible_after {
                Ok(Some(self.tx.clone()))
            } else {
                Ok(None)
            }
        }
    }

    struct FailingChain;

    #[async_trait]
    impl ChainClient for FailingChain {
        async fn get_transaction(&self, _r: &str) -> CoreResult<Option<ChainTransaction>> {
            Err(TidingsError::Chain("connection refused".into()))
        }
    }

    fn paid_tx(receiver: &str, lamports: u64) -> ChainTransaction {
        ChainTransaction {
            err: None,
            account_keys: vec!["PAYER".into(), receiver.into()],
            pre_balances: vec![lamports * 2, 500],
            post_balances: vec![lamports, 500 + lamports],
        }
    }

    fn verifier(chain: Arc<dyn ChainClient>) -> PaymentVerifier {
        PaymentVerifier::new(chain, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_exact_amount_accepts() {
        let chain = ScriptedChain::new(1, paid_tx("ADDR1", 10_000_000));
        let v = verifier(chain).verify("sig", "ADDR1", 10_000_000).await.unwrap();
        assert_eq!(v.received_lamports, 10_000_000);
        assert_eq!(v.attempts, 1);
    }

    #[tokio::test]
    async fn test_short_delta_reports_observed_amount() {
        let chain = ScriptedChain::new(1, paid_tx("ADDR1", 9_000_000));
        let err = verifier(chain).verify("sig", "ADDR1", 10_000_000).await.unwrap_err();
        assert_eq!(
            err,
            VerifyError::InsufficientAmount { received: 9_000_000, expected: 10_000_000 }
        );
        assert!(!err.is_retry_later());
    }

    #[tokio::test]
    async fn test_receiver_absent_rejects_regardless_of_balances() {
        let chain = ScriptedChain::new(1, paid_tx("SOMEONE_ELSE", 10_000_000));
        let err = verifier(chain).verify("sig", "ADDR1", 10_000_000).await.unwrap_err();
        assert_eq!(err, VerifyError::InvalidReceiver);
    }

    #[tokio::test]
    async fn test_failed_transaction_is_terminal() {
        let mut tx = paid_tx("ADDR1", 10_000_000);
        tx.err = Some("InstructionError".into());
        let chain = ScriptedChain::new(1, tx);
        let err = verifier(chain).verify("sig", "ADDR1", 10_000_000).await.unwrap_err();
        assert_eq!(err, VerifyError::TransactionFailed("InstructionError".into()));
    }

    #[tokio::test]
    async fn test_found_on_third_attempt() {
        let chain = ScriptedChain::new(3, paid_tx("ADDR1", 10_000_000));
        let v = verifier(chain.clone()).verify("sig", "ADDR1", 10_000_000).await.unwrap();
        assert_eq!(v.attempts, 3);
        assert_eq!(chain.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_five_attempts_within_budget() {
        let chain = ScriptedChain::new(u32::MAX, paid_tx("ADDR1", 1));
        let started = tokio::time::Instant::now();
        let err = verifier(chain.clone()).verify("sig", "ADDR1", 1).await.unwrap_err();
        assert_eq!(err, VerifyError::Timeout);
        assert!(err.is_retry_later());
        assert_eq!(chain.polls.load(Ordering::SeqCst), 5);
        // 4 sleeps of 2s between 5 attempts — bounded, no sleep after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rpc_errors_retried_then_timeout() {
        let err = verifier(Arc::new(FailingChain)).verify("sig", "ADDR1", 1).await.unwrap_err();
        assert_eq!(err, VerifyError::Timeout);
    }
}
