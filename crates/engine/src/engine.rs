//! Workflow engine — drives one campaign run to completion: ask the router,
//! dispatch the selected stage handler, merge the result, snapshot the state,
//! repeat until the router reports `Done` or a terminal error occurs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use affiliate_core::config::WorkflowConfig;
use affiliate_core::error::{ErrorDescriptor, ErrorKind, FlowResult};
use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{CampaignState, CurrentTask, Stage};

use crate::registry::CampaignRegistry;
use crate::router::{Router, StageSelection};

/// Terminal status of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Error,
}

/// What a completed run reports back to the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub campaign_id: String,
    pub status: RunStatus,
    pub steps: u32,
    pub current_task: CurrentTask,
    pub prospects: usize,
    pub affiliates: usize,
    pub commissions: usize,
    pub last_error: Option<ErrorDescriptor>,
}

impl RunSummary {
    fn from_state(state: &CampaignState, status: RunStatus) -> Self {
        Self {
            campaign_id: state.campaign_id.clone(),
            status,
            steps: state.step_count,
            current_task: state.current_task,
            prospects: state.prospects.len(),
            affiliates: state.affiliates.len(),
            commissions: state.commissions.len(),
            last_error: state.last_error.clone(),
        }
    }
}

/// Drives campaign runs. One engine instance serves all campaigns; per-run
/// exclusivity is enforced by the registry, and stages within a run execute
/// strictly sequentially.
pub struct WorkflowEngine {
    registry: Arc<CampaignRegistry>,
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
    limits: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<CampaignRegistry>,
        handlers: Vec<Arc<dyn StageHandler>>,
        limits: WorkflowConfig,
    ) -> Self {
        let handlers = handlers.into_iter().map(|h| (h.stage(), h)).collect();
        Self {
            registry,
            handlers,
            limits,
        }
    }

    pub fn registry(&self) -> Arc<CampaignRegistry> {
        self.registry.clone()
    }

    /// Executes one run for `campaign_id`, claiming the registry's
    /// single-run slot for the duration. A configured wall-clock timeout is
    /// layered onto the caller's cancellation token; both cancel between
    /// stages, never mid-stage.
    pub async fn run(
        &self,
        campaign_id: &str,
        cancel: CancellationToken,
    ) -> FlowResult<RunSummary> {
        let mut state = self.registry.begin_run(campaign_id)?;
        state.begin_run();

        let run_token = cancel.child_token();
        let timeout_guard = if self.limits.run_timeout_secs > 0 {
            let token = run_token.clone();
            let secs = self.limits.run_timeout_secs;
            Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                token.cancel();
            }))
        } else {
            None
        };

        info!(campaign_id = %campaign_id, "Run starting");
        let status = self.drive(&mut state, &run_token).await;

        if let Some(guard) = timeout_guard {
            guard.abort();
        }

        self.registry.finish_run(campaign_id, state.clone())?;

        match status {
            RunStatus::Done => metrics::counter!("engine.runs_completed").increment(1),
            RunStatus::Error => metrics::counter!("engine.runs_failed").increment(1),
        }
        info!(
            campaign_id = %campaign_id,
            status = ?status,
            steps = state.step_count,
            prospects = state.prospects.len(),
            affiliates = state.affiliates.len(),
            commissions = state.commissions.len(),
            "Run finished"
        );

        Ok(RunSummary::from_state(&state, status))
    }

    /// The loop body. Mutates `state` in place and returns the terminal
    /// status; every non-fatal iteration is snapshotted to the registry.
    async fn drive(&self, state: &mut CampaignState, cancel: &CancellationToken) -> RunStatus {
        loop {
            // Cancellation is only observed between stages.
            if cancel.is_cancelled() {
                warn!(campaign_id = %state.campaign_id, "Run cancelled");
                state.last_error = Some(ErrorDescriptor::new(
                    ErrorKind::Cancelled,
                    "run cancelled before next stage",
                ));
                return RunStatus::Error;
            }

            let selection = Router::decide(state, &self.limits);
            let stage = match selection {
                StageSelection::Done => return self.finalize(state),
                StageSelection::Run(stage) => stage,
            };

            state.current_task = CurrentTask::Stage(stage);

            let Some(handler) = self.handlers.get(&stage) else {
                // A missing handler is a wiring defect, not a campaign
                // condition; treat it like a fatal handler report.
                state.last_error = Some(ErrorDescriptor::new(
                    ErrorKind::HandlerFatal,
                    format!("no handler registered for stage {}", stage),
                ));
                return RunStatus::Error;
            };

            info!(
                campaign_id = %state.campaign_id,
                stage = %stage,
                step = state.step_count,
                "Dispatching stage"
            );
            metrics::counter!("engine.stage_executions", "stage" => stage.as_str()).increment(1);

            let (next, outcome) = handler.run(state.clone()).await;
            match outcome {
                StageOutcome::Success => {
                    *state = next;
                    state.last_error = None;
                    state.retry_count = 0;
                    state.step_count += 1;
                }
                StageOutcome::Retryable(msg) => {
                    warn!(
                        campaign_id = %state.campaign_id,
                        stage = %stage,
                        error = %msg,
                        "Stage failed, retry eligible"
                    );
                    metrics::counter!("engine.stage_retries", "stage" => stage.as_str())
                        .increment(1);
                    *state = next;
                    state.last_error =
                        Some(ErrorDescriptor::new(ErrorKind::HandlerRetryable, msg));
                    state.retry_count += 1;
                    state.step_count += 1;
                }
                StageOutcome::Fatal(msg) => {
                    warn!(
                        campaign_id = %state.campaign_id,
                        stage = %stage,
                        error = %msg,
                        "Stage failed fatally"
                    );
                    // Step count stays at its pre-call value.
                    state.last_error = Some(ErrorDescriptor::new(ErrorKind::HandlerFatal, msg));
                    return RunStatus::Error;
                }
            }

            if let Err(e) = self.registry.save(&state.campaign_id, state.clone()) {
                warn!(campaign_id = %state.campaign_id, error = %e, "Snapshot failed");
            }
        }
    }

    /// Classifies a `Done` selection into the run's terminal status.
    fn finalize(&self, state: &mut CampaignState) -> RunStatus {
        if let Some(err) = &state.last_error {
            // Retries exhausted (or an error the router refused to route
            // around); the descriptor stays in place for inspection.
            warn!(
                campaign_id = %state.campaign_id,
                error = %err,
                "Run ended with error preserved"
            );
            return RunStatus::Error;
        }

        if state.step_count >= self.limits.max_steps_per_run && Router::has_pending_work(state) {
            state.last_error = Some(ErrorDescriptor::new(
                ErrorKind::StepLimitExceeded,
                format!(
                    "step limit {} reached with work pending",
                    self.limits.max_steps_per_run
                ),
            ));
            return RunStatus::Error;
        }

        state.current_task = CurrentTask::Completed;
        RunStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CampaignConfig;
    use affiliate_core::types::{Lead, LeadStatus, OutreachRecord};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Script = Box<dyn Fn(&mut CampaignState, u32) -> StageOutcome + Send + Sync>;

    /// Scripted handler: applies a closure to the state and returns its
    /// outcome; counts invocations.
    struct FakeHandler {
        stage: Stage,
        calls: AtomicU32,
        script: Script,
    }

    impl FakeHandler {
        fn new(
            stage: Stage,
            script: impl Fn(&mut CampaignState, u32) -> StageOutcome + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                stage,
                calls: AtomicU32::new(0),
                script: Box::new(script),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StageHandler for FakeHandler {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = (self.script)(&mut state, call);
            (state, outcome)
        }
    }

    fn discovered_lead(id: &str) -> Lead {
        Lead {
            id: id.to_string(),
            name: format!("Lead {}", id),
            platform: "youtube".to_string(),
            score: 0.8,
            audience_size: 50_000,
            status: LeadStatus::Discovered,
            contact: StdHashMap::from([("email".to_string(), format!("{}@example.com", id))]),
            outreach_history: Vec::new(),
            crm_synced: false,
            notes: None,
        }
    }

    fn scout_success() -> Arc<FakeHandler> {
        FakeHandler::new(Stage::Scout, |state, _| {
            if state.prospects.is_empty() {
                state.prospects.push(discovered_lead("lead-1"));
            }
            state.cursors.scouted = true;
            StageOutcome::Success
        })
    }

    fn outreach_success() -> Arc<FakeHandler> {
        FakeHandler::new(Stage::Outreach, |state, _| {
            for lead in &mut state.prospects {
                if lead.status == LeadStatus::Discovered && lead.outreach_history.is_empty() {
                    lead.status = LeadStatus::Contacted;
                    lead.outreach_history.push(OutreachRecord {
                        channel: "email".to_string(),
                        recipient: format!("{}@example.com", lead.id),
                        message_excerpt: "Hi".to_string(),
                        sent_at: Utc::now(),
                    });
                }
            }
            state.outreach_targets.clear();
            StageOutcome::Success
        })
    }

    fn crm_success() -> Arc<FakeHandler> {
        FakeHandler::new(Stage::Crm, |state, _| {
            for lead in &mut state.prospects {
                if lead.status == LeadStatus::Contacted {
                    lead.crm_synced = true;
                }
            }
            StageOutcome::Success
        })
    }

    fn performance_success() -> Arc<FakeHandler> {
        FakeHandler::new(Stage::Performance, |state, _| {
            state.cursors.performance_reviewed = true;
            StageOutcome::Success
        })
    }

    fn engine_with(handlers: Vec<Arc<dyn StageHandler>>) -> (WorkflowEngine, Arc<CampaignRegistry>) {
        let registry = Arc::new(CampaignRegistry::default());
        registry
            .create(
                "camp-1",
                CampaignConfig {
                    name: "Test".to_string(),
                    description: None,
                    targeting: None,
                },
            )
            .unwrap();
        let engine = WorkflowEngine::new(registry.clone(), handlers, WorkflowConfig::default());
        (engine, registry)
    }

    #[tokio::test]
    async fn test_happy_path_runs_to_completed() {
        let scout = scout_success();
        let (engine, registry) = engine_with(vec![
            scout.clone(),
            outreach_success(),
            crm_success(),
            performance_success(),
        ]);

        let summary = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Done);
        assert_eq!(summary.current_task, CurrentTask::Completed);
        assert_eq!(summary.steps, 4);
        assert_eq!(scout.calls(), 1);

        let persisted = registry.get("camp-1").unwrap();
        assert_eq!(persisted.current_task, CurrentTask::Completed);
        assert!(persisted.last_error.is_none());
    }

    #[tokio::test]
    async fn test_fatal_terminates_without_step_increment() {
        let scout = FakeHandler::new(Stage::Scout, |_, _| {
            StageOutcome::Fatal("malformed collaborator response".to_string())
        });
        let (engine, registry) = engine_with(vec![scout]);

        let summary = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(summary.steps, 0);
        let err = summary.last_error.unwrap();
        assert_eq!(err.kind, ErrorKind::HandlerFatal);

        // Terminal state is persisted for inspection.
        let persisted = registry.get("camp-1").unwrap();
        assert_eq!(persisted.last_error.unwrap().kind, ErrorKind::HandlerFatal);
    }

    #[tokio::test]
    async fn test_retryable_failure_recovers() {
        let scout = FakeHandler::new(Stage::Scout, |state, call| {
            if call == 0 {
                StageOutcome::Retryable("scouting source unavailable".to_string())
            } else {
                if state.prospects.is_empty() {
                    state.prospects.push(discovered_lead("lead-1"));
                }
                state.cursors.scouted = true;
                StageOutcome::Success
            }
        });
        let scout_handle = scout.clone();
        let (engine, _) = engine_with(vec![
            scout,
            outreach_success(),
            crm_success(),
            performance_success(),
        ]);

        let summary = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Done);
        assert!(summary.last_error.is_none());
        assert_eq!(scout_handle.calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_in_error() {
        let scout = FakeHandler::new(Stage::Scout, |_, _| {
            StageOutcome::Retryable("scouting source unavailable".to_string())
        });
        let scout_handle = scout.clone();
        let (engine, _) = engine_with(vec![scout]);

        let summary = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(
            summary.last_error.unwrap().kind,
            ErrorKind::HandlerRetryable
        );
        // Initial attempt plus the configured retries.
        let limits = WorkflowConfig::default();
        assert_eq!(scout_handle.calls(), 1 + limits.max_stage_retries);
    }

    #[tokio::test]
    async fn test_step_limit_yields_error_state() {
        // A scout that reports success but never refreshes the pool keeps
        // the router pointed at it until the loop guard trips.
        let scout = FakeHandler::new(Stage::Scout, |_, _| StageOutcome::Success);
        let (engine, _) = engine_with(vec![scout]);

        let summary = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(
            summary.last_error.unwrap().kind,
            ErrorKind::StepLimitExceeded
        );
        let limits = WorkflowConfig::default();
        assert_eq!(summary.steps, limits.max_steps_per_run);
    }

    #[tokio::test]
    async fn test_cancellation_persists_state() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (engine, registry) = engine_with(vec![scout_success()]);
        let summary = engine.run("camp-1", cancel).await.unwrap();

        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(summary.last_error.unwrap().kind, ErrorKind::Cancelled);

        let persisted = registry.get("camp-1").unwrap();
        assert_eq!(persisted.last_error.unwrap().kind, ErrorKind::Cancelled);
        // The slot is released; a later run may proceed.
        assert!(registry.begin_run("camp-1").is_ok());
    }

    #[tokio::test]
    async fn test_missing_handler_is_fatal() {
        let (engine, _) = engine_with(vec![]);
        let summary = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Error);
        assert_eq!(summary.last_error.unwrap().kind, ErrorKind::HandlerFatal);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected_while_first_in_flight() {
        // Claim the slot out-of-band to simulate an in-flight run.
        let (engine, registry) = engine_with(vec![scout_success()]);
        let _claimed = registry.begin_run("camp-1").unwrap();

        let err = engine
            .run("camp-1", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, affiliate_core::FlowError::AlreadyRunning(_)));
    }
}
