//! # Tidings Payment
//!
//! The x402 micropayment pipeline: a stateless 402 challenge issuer, a
//! budget/policy decision engine, a wallet collaborator trait, and an
//! on-chain verifier with an explicit bounded retry policy.
//!
//! ## Flow
//! ```text
//! paywalled fetch → 402 challenge {address, amount, SOL, solana-devnet}
//!   → policy engine: budget ceiling, address format, preference judge
//!   → wallet.transfer(to, amount) → transaction reference
//!   → verifier: poll chain (≤5 × 2s), check status + receiver + balance delta
//!   → reference becomes the bearer credential for the gated resource
//! ```
//!
//! The verifier's verdicts are never cached — the gated resource re-verifies
//! on every request carrying a credential.

pub mod challenge;
pub mod chain;
pub mod pipeline;
pub mod policy;
pub mod retry;
pub mod rpc;
pub mod verify;
pub mod wallet;

pub use challenge::{FetchOutcome, PaymentChallenge, lamports_to_sol, sol_to_lamports};
pub use chain::{ChainClient, ChainTransaction};
pub use pipeline::{PaymentPipeline, SettleError, Settlement};
pub use policy::{Bill, PaymentDecision, Permissive, PreferenceJudge, SpendPolicy, is_valid_address};
pub use retry::RetryPolicy;
pub use rpc::SolanaRpc;
pub use verify::{PaymentVerifier, Verified, VerifyError};
pub use wallet::{UnconfiguredWallet, Wallet};
