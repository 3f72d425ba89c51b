//! The gathering run: one fire, many blocks, no shared fate.
//!
//! Each block inside a thread is fetched independently; a block that blows
//! up (bad query, paywall we refuse to pay, upstream outage) becomes an
//! error entry in the run report while its siblings proceed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tidings_core::error::{Result, TidingsError};
use tidings_core::thread::{BlockMode, ContentBlock, Thread};
use tidings_payment::{FetchOutcome, PaymentPipeline};
use tidings_scheduler::{FireHandler, JobFire};

use crate::profile::{ProfileStore, UserProfile};

/// Deterministic fetch seam for non-smart blocks.
///
/// `fetch` may come back with a 402 challenge instead of content; after the
/// pipeline settles it, `refetch_paid` retries the same block carrying the
/// verified transaction reference as the bearer credential.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    async fn fetch(&self, profile: &UserProfile, block: &ContentBlock) -> Result<FetchOutcome>;

    async fn refetch_paid(
        &self,
        profile: &UserProfile,
        block: &ContentBlock,
        reference: &str,
    ) -> Result<Vec<Value>>;
}

/// LLM-backed retrieval seam for blocks in smart mode.
#[async_trait]
pub trait SmartRetriever: Send + Sync {
    async fn retrieve(&self, profile: &UserProfile, query: &str) -> Result<Vec<Value>>;
}

/// Placeholder fetcher for deployments without a content backend wired in.
/// Every block it touches fails with an error entry, never a silent skip.
pub struct DisabledFetcher;

#[async_trait]
impl BlockFetcher for DisabledFetcher {
    async fn fetch(&self, _profile: &UserProfile, _block: &ContentBlock) -> Result<FetchOutcome> {
        Err(TidingsError::Gather("Content fetcher not available".into()))
    }

    async fn refetch_paid(
        &self,
        _profile: &UserProfile,
        _block: &ContentBlock,
        _reference: &str,
    ) -> Result<Vec<Value>> {
        Err(TidingsError::Gather("Content fetcher not available".into()))
    }
}

/// Placeholder retriever for deployments without the LLM agent wired in.
pub struct DisabledRetriever;

#[async_trait]
impl SmartRetriever for DisabledRetriever {
    async fn retrieve(&self, _profile: &UserProfile, _query: &str) -> Result<Vec<Value>> {
        Err(TidingsError::Gather("Retrieval agent not available".into()))
    }
}

/// Per-block result of a gathering run.
#[derive(Debug, Clone, Serialize)]
pub struct BlockReport {
    pub block_type: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

impl BlockReport {
    fn success(block: &ContentBlock, items: Vec<Value>) -> Self {
        Self {
            block_type: block.kind().to_string(),
            status: ReportStatus::Success,
            items,
            error: None,
        }
    }

    fn failure(block: &ContentBlock, error: String) -> Self {
        Self {
            block_type: block.kind().to_string(),
            status: ReportStatus::Error,
            items: Vec::new(),
            error: Some(error),
        }
    }
}

/// Executes a thread's blocks when the scheduler fires it.
pub struct GatherExecutor {
    profiles: Arc<dyn ProfileStore>,
    fetcher: Arc<dyn BlockFetcher>,
    retriever: Arc<dyn SmartRetriever>,
    /// When absent, 402 challenges are reported as errors instead of paid.
    payments: Option<Arc<PaymentPipeline>>,
}

impl GatherExecutor {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        fetcher: Arc<dyn BlockFetcher>,
        retriever: Arc<dyn SmartRetriever>,
        payments: Option<Arc<PaymentPipeline>>,
    ) -> Self {
        Self {
            profiles,
            fetcher,
            retriever,
            payments,
        }
    }

    /// Run every block in the fired thread snapshot and report per-block
    /// outcomes. Never fails as a whole; the worst case is a report where
    /// every entry is an error.
    pub async fn run(&self, fire: &JobFire) -> Vec<BlockReport> {
        let profile = self.resolve_profile(&fire.snapshot);
        let mut reports = Vec::with_capacity(fire.snapshot.blocks.len());
        for block in &fire.snapshot.blocks {
            let report = match self.run_block(&profile, block).await {
                Ok(items) => BlockReport::success(block, items),
                Err(e) => {
                    tracing::warn!(
                        "📥 Block '{}' failed in thread {}: {e}",
                        block.kind(),
                        fire.thread_id
                    );
                    BlockReport::failure(block, e.to_string())
                }
            };
            reports.push(report);
        }
        reports
    }

    async fn run_block(&self, profile: &UserProfile, block: &ContentBlock) -> Result<Vec<Value>> {
        if let ContentBlock::Unknown { kind } = block {
            return Err(TidingsError::Gather(format!("Unknown block type: {kind}")));
        }
        if block_mode(block) == Some(BlockMode::Smart) {
            return self.retriever.retrieve(profile, &query_text(block)).await;
        }
        match self.fetcher.fetch(profile, block).await? {
            FetchOutcome::Content(items) => Ok(items),
            FetchOutcome::PaymentRequired(challenge) => {
                let Some(pipeline) = &self.payments else {
                    return Err(TidingsError::Payment(
                        "Paywalled content and no payment pipeline configured".into(),
                    ));
                };
                tracing::info!(
                    "💸 Block '{}' is paywalled: {} {} to {}",
                    block.kind(),
                    challenge.amount,
                    challenge.currency,
                    challenge.address
                );
                let settlement = pipeline
                    .settle(&challenge, block.kind())
                    .await
                    .map_err(|e| TidingsError::Payment(e.to_string()))?;
                self.fetcher
                    .refetch_paid(profile, block, &settlement.reference)
                    .await
            }
        }
    }

    /// Profile lookup: by user id, then by email, else an empty profile so
    /// the run proceeds without personalization.
    fn resolve_profile(&self, thread: &Thread) -> UserProfile {
        let by_id = match self.profiles.by_user_id(&thread.user_id) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("📥 Profile lookup failed for {}: {e}", thread.user_id);
                None
            }
        };
        if let Some(profile) = by_id {
            return profile;
        }
        if !thread.email.is_empty() {
            match self.profiles.by_email(&thread.email) {
                Ok(Some(profile)) => return profile,
                Ok(None) => {}
                Err(e) => tracing::warn!("📥 Profile lookup failed for {}: {e}", thread.email),
            }
        }
        tracing::warn!(
            "📥 No profile for user {} ({}), gathering without preferences",
            thread.user_id,
            thread.email
        );
        UserProfile::default()
    }
}

#[async_trait]
impl FireHandler for GatherExecutor {
    async fn handle(&self, fire: JobFire) -> Result<()> {
        tracing::info!(
            "📥 Gathering for thread {} ({}, {} blocks)",
            fire.thread_id,
            fire.trigger_kind,
            fire.snapshot.blocks.len()
        );
        let reports = self.run(&fire).await;
        let ok = reports
            .iter()
            .filter(|r| r.status == ReportStatus::Success)
            .count();
        tracing::info!(
            "📥 Thread {} done: {ok}/{} blocks succeeded",
            fire.thread_id,
            reports.len()
        );
        Ok(())
    }
}

fn block_mode(block: &ContentBlock) -> Option<BlockMode> {
    match block {
        ContentBlock::GeneralSearch { mode, .. }
        | ContentBlock::XFromUser { mode, .. }
        | ContentBlock::XFromTopic { mode, .. } => Some(*mode),
        ContentBlock::Unknown { .. } => None,
    }
}

/// Flatten a block into the query string the retrieval agent receives.
fn query_text(block: &ContentBlock) -> String {
    match block {
        ContentBlock::GeneralSearch { query, .. } => query.clone(),
        ContentBlock::XFromUser { handles, .. } => handles.join(", "),
        ContentBlock::XFromTopic { topics, .. } => topics.join(", "),
        ContentBlock::Unknown { kind } => kind.clone(),
    }
}
