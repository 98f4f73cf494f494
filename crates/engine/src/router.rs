//! Deterministic routing policy — inspects campaign state and picks the next
//! stage to execute, or decides the cycle is complete. Pure function of the
//! state and workflow limits; no clock, no I/O, no randomness.

use affiliate_core::config::WorkflowConfig;
use affiliate_core::error::ErrorKind;
use affiliate_core::types::{CampaignState, CommissionStatus, CurrentTask, LeadStatus, Stage};

/// Outcome of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelection {
    Run(Stage),
    Done,
}

/// The decision core. Priority-ordered policy; the first matching rule wins
/// and the order itself is part of the contract.
pub struct Router;

impl Router {
    /// Decides the next stage for `state`.
    ///
    /// Rule order:
    /// 1. step-limit guard (forces `Done`),
    /// 2. bounded retry of a failed stage, falling through to `Done` with the
    ///    error preserved once retries exhaust,
    /// 3. scout when the prospect pool is empty or unrefreshed this run,
    /// 4. outreach when untouched discovered leads or queued targets exist,
    /// 5. CRM when contacted/converted leads await sync,
    /// 6. commission when affiliates exist and sales are unrecorded,
    /// 7. payment when any commission is approved,
    /// 8. performance when the review has not run this cycle,
    /// 9. `Done`.
    pub fn decide(state: &CampaignState, limits: &WorkflowConfig) -> StageSelection {
        if state.step_count >= limits.max_steps_per_run {
            return StageSelection::Done;
        }

        if let Some(err) = &state.last_error {
            if err.kind == ErrorKind::HandlerRetryable {
                if let CurrentTask::Stage(stage) = state.current_task {
                    if state.retry_count <= limits.max_stage_retries {
                        return StageSelection::Run(stage);
                    }
                }
            }
            // Retries exhausted or a non-retryable error left in place:
            // fail open, never crash the campaign.
            return StageSelection::Done;
        }

        Self::policy(state)
    }

    /// True when the queues still hold work the policy would dispatch,
    /// regardless of the step-limit guard. Lets the engine tell a drained
    /// campaign apart from one cut off by the loop guard.
    pub fn has_pending_work(state: &CampaignState) -> bool {
        matches!(Self::policy(state), StageSelection::Run(_))
    }

    /// Rules 3-9: the stage-selection policy proper.
    ///
    /// Scouting runs at most once per run; the cursor covers the empty-pool
    /// case because cursors reset at run start. A campaign whose scout pass
    /// finds nothing still drains to `Done` instead of re-scouting until the
    /// step limit trips.
    fn policy(state: &CampaignState) -> StageSelection {
        if !state.cursors.scouted {
            return StageSelection::Run(Stage::Scout);
        }

        let has_untouched_discovered = state
            .prospects
            .iter()
            .any(|l| l.status == LeadStatus::Discovered && l.outreach_untouched());
        if has_untouched_discovered || !state.outreach_targets.is_empty() {
            return StageSelection::Run(Stage::Outreach);
        }

        if state.awaiting_crm_sync() {
            return StageSelection::Run(Stage::Crm);
        }

        if !state.affiliates.is_empty() && !state.cursors.sales_recorded {
            return StageSelection::Run(Stage::Commission);
        }

        if state
            .commissions
            .iter()
            .any(|c| c.status == CommissionStatus::Approved)
        {
            return StageSelection::Run(Stage::Payment);
        }

        if !state.cursors.performance_reviewed {
            return StageSelection::Run(Stage::Performance);
        }

        StageSelection::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affiliate_core::error::ErrorDescriptor;
    use affiliate_core::types::{Commission, Lead};
    use chrono::Utc;
    use std::collections::HashMap;

    fn limits() -> WorkflowConfig {
        WorkflowConfig::default()
    }

    fn make_lead(id: &str, status: LeadStatus) -> Lead {
        Lead {
            id: id.to_string(),
            name: format!("Lead {}", id),
            platform: "youtube".to_string(),
            score: 0.5,
            audience_size: 10_000,
            status,
            contact: HashMap::from([("email".to_string(), format!("{}@example.com", id))]),
            outreach_history: Vec::new(),
            crm_synced: false,
            notes: None,
        }
    }

    fn make_commission(id: &str, status: CommissionStatus) -> Commission {
        Commission {
            id: id.to_string(),
            affiliate_id: "aff-1".to_string(),
            sale_amount: 100.0,
            rate: 0.7,
            amount: 70.0,
            status,
            sale_ref: format!("tx-{}", id),
            sale_date: Utc::now(),
        }
    }

    /// A state that has finished every queue: scouted, no prospects pending,
    /// performance reviewed.
    fn drained_state() -> CampaignState {
        let mut state = CampaignState::new("camp-1");
        state.cursors.scouted = true;
        state.cursors.sales_recorded = true;
        state.cursors.performance_reviewed = true;
        let mut lead = make_lead("lead-1", LeadStatus::Contacted);
        lead.crm_synced = true;
        lead.outreach_history.push(affiliate_core::types::OutreachRecord {
            channel: "email".to_string(),
            recipient: "lead-1@example.com".to_string(),
            message_excerpt: "Hi".to_string(),
            sent_at: Utc::now(),
        });
        state.prospects.push(lead);
        state
    }

    #[test]
    fn test_empty_campaign_routes_to_scout() {
        let state = CampaignState::new("camp-1");
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Scout)
        );
    }

    #[test]
    fn test_unrefreshed_prospects_route_to_scout() {
        let mut state = CampaignState::new("camp-1");
        state.prospects.push(make_lead("lead-1", LeadStatus::Contacted));
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Scout)
        );
    }

    #[test]
    fn test_discovered_lead_routes_to_outreach() {
        let mut state = CampaignState::new("camp-1");
        state.cursors.scouted = true;
        state.prospects.push(make_lead("lead-1", LeadStatus::Discovered));
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Outreach)
        );
    }

    #[test]
    fn test_queued_targets_route_to_outreach() {
        let mut state = drained_state();
        state.outreach_targets.push("lead-1".to_string());
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Outreach)
        );
    }

    #[test]
    fn test_converted_lead_routes_to_crm() {
        let mut state = CampaignState::new("camp-1");
        state.cursors.scouted = true;
        let mut lead = make_lead("lead-1", LeadStatus::Converted);
        lead.outreach_history.push(affiliate_core::types::OutreachRecord {
            channel: "email".to_string(),
            recipient: "lead-1@example.com".to_string(),
            message_excerpt: "Hi".to_string(),
            sent_at: Utc::now(),
        });
        state.prospects.push(lead);
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Crm)
        );
    }

    #[test]
    fn test_affiliates_with_unrecorded_sales_route_to_commission() {
        let mut state = drained_state();
        state.cursors.sales_recorded = false;
        state.affiliates.push(make_lead("aff-1", LeadStatus::Active));
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Commission)
        );
    }

    #[test]
    fn test_approved_commission_routes_to_payment() {
        let mut state = drained_state();
        state.affiliates.push(make_lead("aff-1", LeadStatus::Active));
        state
            .commissions
            .push(make_commission("comm-1", CommissionStatus::Approved));
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Payment)
        );
    }

    #[test]
    fn test_pending_review_routes_to_performance() {
        let mut state = drained_state();
        state.cursors.performance_reviewed = false;
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Performance)
        );
    }

    #[test]
    fn test_drained_campaign_is_done() {
        let state = drained_state();
        assert_eq!(Router::decide(&state, &limits()), StageSelection::Done);
    }

    #[test]
    fn test_step_limit_forces_done() {
        let mut state = CampaignState::new("camp-1");
        state.step_count = limits().max_steps_per_run;
        assert_eq!(Router::decide(&state, &limits()), StageSelection::Done);
    }

    #[test]
    fn test_retryable_error_reroutes_same_stage() {
        let mut state = CampaignState::new("camp-1");
        state.current_task = CurrentTask::Stage(Stage::Scout);
        state.last_error = Some(ErrorDescriptor::new(
            ErrorKind::HandlerRetryable,
            "upstream timeout",
        ));
        state.retry_count = 1;
        assert_eq!(
            Router::decide(&state, &limits()),
            StageSelection::Run(Stage::Scout)
        );
    }

    #[test]
    fn test_exhausted_retries_fall_through_to_done() {
        let mut state = CampaignState::new("camp-1");
        state.current_task = CurrentTask::Stage(Stage::Scout);
        state.last_error = Some(ErrorDescriptor::new(
            ErrorKind::HandlerRetryable,
            "upstream timeout",
        ));
        state.retry_count = limits().max_stage_retries + 1;
        assert_eq!(Router::decide(&state, &limits()), StageSelection::Done);
        // The error descriptor is preserved for inspection.
        assert!(state.last_error.is_some());
    }

    #[test]
    fn test_decision_is_deterministic() {
        let mut state = CampaignState::new("camp-1");
        state.cursors.scouted = true;
        state.prospects.push(make_lead("lead-1", LeadStatus::Discovered));
        let first = Router::decide(&state, &limits());
        for _ in 0..100 {
            assert_eq!(Router::decide(&state, &limits()), first);
        }
    }
}
