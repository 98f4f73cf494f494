//! Stage handler contract — the seam between the workflow engine and the
//! six pipeline stages. Engine and handlers only meet through this trait, so
//! a live integration can replace a mock without touching the engine.

use async_trait::async_trait;

use crate::types::{CampaignState, Stage};

/// How a stage invocation ended. Collaborator I/O failures must be converted
/// into `Retryable` or `Fatal` here; they never propagate to the engine as
/// unhandled errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    /// Transient failure, eligible for the router's bounded retry.
    Retryable(String),
    /// Unrecoverable failure; terminates the run in Error state.
    Fatal(String),
}

/// A single pipeline stage: a transformation of campaign state plus an
/// outcome report.
///
/// Handlers must be idempotent with respect to re-invocation on unchanged
/// state: running the same stage twice must not duplicate leads or
/// commissions (dedup by id).
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Which pipeline stage this handler implements.
    fn stage(&self) -> Stage;

    /// Runs the stage against the given state and returns the updated state
    /// together with the outcome.
    async fn run(&self, state: CampaignState) -> (CampaignState, StageOutcome);
}
