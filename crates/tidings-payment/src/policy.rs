//! Budget/policy decision engine.
//!
//! Two hard rules (budget ceiling, receiver address format) and one soft one
//! (a pluggable preference judge that may deny within budget). Approval is a
//! precondition for invoking the wallet — never the other way round.

use serde::{Deserialize, Serialize};
use tidings_core::config::PaymentConfig;

use crate::challenge::PaymentChallenge;

/// What we are being asked to pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    /// Amount in SOL.
    pub amount: f64,
    pub receiver: String,
    /// Free-form context (what the payment buys), shown to the judge.
    pub memo: String,
}

impl Bill {
    /// A bill straight from a 402 challenge.
    pub fn from_challenge(challenge: &PaymentChallenge, memo: &str) -> Self {
        Self {
            amount: challenge.amount,
            receiver: challenge.address.clone(),
            memo: memo.to_string(),
        }
    }
}

/// The payer's spending constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendPolicy {
    /// Hard per-payment ceiling in SOL (inclusive).
    pub budget_limit: f64,
    /// Content preferences the judge may weigh.
    #[serde(default)]
    pub preferences: Vec<String>,
}

impl Default for SpendPolicy {
    fn default() -> Self {
        Self {
            budget_limit: 0.05,
            preferences: Vec::new(),
        }
    }
}

impl SpendPolicy {
    /// Spending constraints from the payment section of the config file.
    pub fn from_config(payment: &PaymentConfig) -> Self {
        Self {
            budget_limit: payment.budget_limit_sol,
            preferences: Vec::new(),
        }
    }
}

/// The verdict. Computed per evaluation, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDecision {
    pub approved: bool,
    pub reason: String,
}

impl PaymentDecision {
    fn approve(reason: impl Into<String>) -> Self {
        Self { approved: true, reason: reason.into() }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { approved: false, reason: reason.into() }
    }
}

/// The soft rule: content-preference judgment. Inherently heuristic (an LLM
/// in production), so it lives behind a trait with a one-line contract:
/// return Some(reason) to deny, None to let the bill through.
pub trait PreferenceJudge: Send + Sync {
    fn assess(&self, bill: &Bill, policy: &SpendPolicy) -> Option<String>;
}

/// Default judge: no preference-based denials.
pub struct Permissive;

impl PreferenceJudge for Permissive {
    fn assess(&self, _bill: &Bill, _policy: &SpendPolicy) -> Option<String> {
        None
    }
}

/// Basic Solana address format check: base58, 32 bytes decoded.
pub fn is_valid_address(address: &str) -> bool {
    bs58::decode(address)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// Evaluate a bill. Hard rules first; the judge only sees bills that already
/// clear them.
pub fn evaluate(bill: &Bill, policy: &SpendPolicy, judge: &dyn PreferenceJudge) -> PaymentDecision {
    if bill.amount > policy.budget_limit {
        return PaymentDecision::deny(format!(
            "exceeds budget: {} SOL > limit {} SOL",
            bill.amount, policy.budget_limit
        ));
    }
    if !is_valid_address(&bill.receiver) {
        return PaymentDecision::deny(format!("invalid receiver address: {}", bill.receiver));
    }
    if let Some(reason) = judge.assess(bill, policy) {
        return PaymentDecision::deny(reason);
    }
    PaymentDecision::approve(format!("within budget ({} SOL)", policy.budget_limit))
}
