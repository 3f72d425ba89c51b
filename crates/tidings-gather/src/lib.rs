//! # Tidings Gather
//!
//! Turns a scheduler fire into gathered content: resolves the owning user's
//! profile, runs every content block through the right retrieval seam, and
//! settles x402 paywalls along the way.
//!
//! ## Flow
//! ```text
//! JobFire { snapshot: Thread }
//!   └── ProfileStore: user_id → email → empty fallback
//!   └── per block (isolated, errors never cascade):
//!         smart mode   → SmartRetriever (LLM agent)
//!         other modes  → BlockFetcher
//!               402?   → PaymentPipeline.settle → refetch with credential
//!   └── Vec<BlockReport>
//! ```

pub mod executor;
pub mod profile;

pub use executor::{
    BlockFetcher, BlockReport, DisabledFetcher, DisabledRetriever, GatherExecutor, ReportStatus,
    SmartRetriever,
};
pub use profile::{MemoryProfileStore, ProfileStore, UserProfile};
