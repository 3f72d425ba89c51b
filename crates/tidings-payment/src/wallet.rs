//! Wallet collaborator seam.
//!
//! Transfer execution (key management, signing, broadcast) is external to
//! this core — the pipeline only needs "move this much SOL to this address
//! and hand back the transaction reference".

use async_trait::async_trait;
use tidings_core::{Result, TidingsError};

/// Payment execution collaborator.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Transfer `amount_sol` to `to`, returning the transaction reference.
    async fn transfer(&self, to: &str, amount_sol: f64) -> Result<String>;
}

/// Placeholder for deployments without signing keys. The policy still gets
/// to evaluate each bill; approved transfers then fail with a clear error
/// instead of silently skipping the paywall.
pub struct UnconfiguredWallet;

#[async_trait]
impl Wallet for UnconfiguredWallet {
    async fn transfer(&self, _to: &str, _amount_sol: f64) -> Result<String> {
        Err(TidingsError::Payment("No signing wallet configured".into()))
    }
}
