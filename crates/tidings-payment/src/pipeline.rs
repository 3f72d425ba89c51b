//! End-to-end settlement of a 402 challenge.
//!
//! evaluate → transfer → verify, each failure classified so callers can tell
//! "denied by policy" from "transfer broke" from "chain never confirmed".

use std::sync::Arc;
use thiserror::Error;

use crate::chain::ChainClient;
use crate::challenge::PaymentChallenge;
use crate::policy::{self, Bill, PreferenceJudge, SpendPolicy};
use crate::retry::RetryPolicy;
use crate::verify::{PaymentVerifier, VerifyError};
use crate::wallet::Wallet;

/// Why a settlement did not produce a usable credential.
#[derive(Debug, Error)]
pub enum SettleError {
    #[error("payment denied: {reason}")]
    Denied { reason: String },

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// A settled challenge: the verified reference is the access credential.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub reference: String,
    pub paid_lamports: u64,
    pub attempts: u32,
}

/// The payer-side pipeline.
pub struct PaymentPipeline {
    wallet: Arc<dyn Wallet>,
    verifier: PaymentVerifier,
    policy: SpendPolicy,
    judge: Arc<dyn PreferenceJudge>,
}

impl PaymentPipeline {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        chain: Arc<dyn ChainClient>,
        retry: RetryPolicy,
        policy: SpendPolicy,
        judge: Arc<dyn PreferenceJudge>,
    ) -> Self {
        Self {
            wallet,
            verifier: PaymentVerifier::new(chain, retry),
            policy,
            judge,
        }
    }

    /// Settle a 402 challenge. On success the returned reference has already
    /// been confirmed on chain to pay the challenge's terms — though the
    /// gated resource will independently verify it again before releasing
    /// content.
    pub async fn settle(
        &self,
        challenge: &PaymentChallenge,
        memo: &str,
    ) -> Result<Settlement, SettleError> {
        let bill = Bill::from_challenge(challenge, memo);
        let decision = policy::evaluate(&bill, &self.policy, self.judge.as_ref());
        if !decision.approved {
            tracing::info!("💸 Payment denied: {}", decision.reason);
            return Err(SettleError::Denied { reason: decision.reason });
        }
        tracing::info!(
            "💸 Paying {} SOL to {} ({})",
            challenge.amount,
            challenge.address,
            decision.reason
        );

        let reference = self
            .wallet
            .transfer(&challenge.address, challenge.amount)
            .await
            .map_err(|e| SettleError::TransferFailed(e.to_string()))?;

        let verified = self
            .verifier
            .verify(&reference, &challenge.address, challenge.expected_lamports())
            .await?;

        Ok(Settlement {
            reference: verified.reference,
            paid_lamports: verified.received_lamports,
            attempts: verified.attempts,
        })
    }
}
