//! Chain query seam.
//!
//! The verifier only needs one read-only question answered: "what does the
//! chain say about this transaction reference?" Keeping that behind a trait
//! lets tests drive the verifier with scripted chains and no network.

use async_trait::async_trait;
use tidings_core::Result;

/// What the chain reports about a confirmed transaction.
#[derive(Debug, Clone)]
pub struct ChainTransaction {
    /// Some(reason) when the transaction executed but failed.
    pub err: Option<String>,
    /// Every account touched by the transaction, base58.
    pub account_keys: Vec<String>,
    /// Lamport balances before execution, indexed like `account_keys`.
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution, indexed like `account_keys`.
    pub post_balances: Vec<u64>,
}

impl ChainTransaction {
    /// The balance delta for `address`, or None when it did not participate.
    pub fn balance_delta(&self, address: &str) -> Option<i64> {
        let idx = self.account_keys.iter().position(|k| k == address)?;
        let pre = *self.pre_balances.get(idx)? as i64;
        let post = *self.post_balances.get(idx)? as i64;
        Some(post - pre)
    }
}

/// Read-only chain access.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Look up a transaction by reference. `Ok(None)` means "not visible
    /// yet" — confirmation is asynchronous, so absence is not an error.
    async fn get_transaction(&self, reference: &str) -> Result<Option<ChainTransaction>>;
}
