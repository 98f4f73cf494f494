use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoutConfig;
use crate::error::ErrorDescriptor;

/// Lifecycle status of a lead as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Identified by scouting, not yet contacted.
    Discovered,
    /// Outreach has been sent.
    Contacted,
    /// Responded positively, ready to become an affiliate.
    Converted,
    /// Onboarded as an active affiliate.
    Active,
    /// Declined or disqualified.
    Rejected,
}

/// A prospective or active affiliate partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub platform: String,
    /// Acquisition score in [0.0, 1.0] assigned at scouting time.
    pub score: f64,
    pub audience_size: u64,
    pub status: LeadStatus,
    /// Free-form contact/metadata map, e.g. {"email": "...", "handle": "..."}.
    #[serde(default)]
    pub contact: HashMap<String, String>,
    #[serde(default)]
    pub outreach_history: Vec<OutreachRecord>,
    /// Set once the lead's record has been pushed to the CRM.
    #[serde(default)]
    pub crm_synced: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Lead {
    /// True if this lead has never been targeted by an outreach attempt.
    pub fn outreach_untouched(&self) -> bool {
        self.outreach_history.is_empty()
    }
}

/// One outreach attempt against a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachRecord {
    pub channel: String,
    pub recipient: String,
    pub message_excerpt: String,
    pub sent_at: DateTime<Utc>,
}

/// Lifecycle status of a commission. Transitions are strictly forward:
/// Pending -> Approved -> Paid, or Pending/Approved -> Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

impl CommissionStatus {
    /// Returns `true` if moving from `self` to `to` is a legal forward
    /// transition.
    pub fn can_transition(self, to: CommissionStatus) -> bool {
        use CommissionStatus::*;
        matches!(
            (self, to),
            (Pending, Approved) | (Approved, Paid) | (Pending, Rejected) | (Approved, Rejected)
        )
    }
}

/// A monetary credit owed to an affiliate for an attributed sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    pub id: String,
    pub affiliate_id: String,
    pub sale_amount: f64,
    pub rate: f64,
    pub amount: f64,
    pub status: CommissionStatus,
    /// Reference to the originating sale/transaction.
    pub sale_ref: String,
    pub sale_date: DateTime<Utc>,
}

impl Commission {
    /// Applies a status change, refusing reverse transitions.
    pub fn transition(&mut self, to: CommissionStatus) -> anyhow::Result<()> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.can_transition(to) {
            anyhow::bail!(
                "Invalid commission transition {:?} -> {:?} for {}",
                self.status,
                to,
                self.id
            );
        }
        self.status = to;
        Ok(())
    }
}

/// What the router most recently decided for a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentTask {
    /// No decision has been made yet.
    Idle,
    Stage(Stage),
    /// Terminal decision reached; frozen thereafter.
    Completed,
}

/// The six pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scout,
    Outreach,
    Crm,
    Commission,
    Payment,
    Performance,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scout => "scout",
            Stage::Outreach => "outreach",
            Stage::Crm => "crm",
            Stage::Commission => "commission",
            Stage::Payment => "payment",
            Stage::Performance => "performance",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run progress flags consulted by the router. Reset at run start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCursors {
    /// Prospect pool has been refreshed this run.
    pub scouted: bool,
    /// Sales have been pulled and commissions recorded this cycle.
    pub sales_recorded: bool,
    /// Performance review has run this cycle.
    pub performance_reviewed: bool,
}

/// Mutable record of one campaign's progress. Owned by the workflow engine
/// during a run, by the registry otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignState {
    pub campaign_id: String,
    /// Targeting configuration consumed by the scout stage.
    #[serde(default)]
    pub targeting: ScoutConfig,
    pub prospects: Vec<Lead>,
    pub affiliates: Vec<Lead>,
    pub commissions: Vec<Commission>,
    /// Lead ids queued for the next outreach pass.
    #[serde(default)]
    pub outreach_targets: Vec<String>,
    pub current_task: CurrentTask,
    pub step_count: u32,
    /// Consecutive retryable failures of the stage named by `current_task`.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub cursors: RunCursors,
    pub last_error: Option<ErrorDescriptor>,
    #[serde(default)]
    pub performance_report: Option<PerformanceReport>,
    #[serde(default)]
    pub crm_sync_status: Option<String>,
}

impl CampaignState {
    /// Fresh state for a newly registered campaign.
    pub fn new(campaign_id: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            targeting: ScoutConfig::default(),
            prospects: Vec::new(),
            affiliates: Vec::new(),
            commissions: Vec::new(),
            outreach_targets: Vec::new(),
            current_task: CurrentTask::Idle,
            step_count: 0,
            retry_count: 0,
            cursors: RunCursors::default(),
            last_error: None,
            performance_report: None,
            crm_sync_status: None,
        }
    }

    /// Resets per-run progress at the start of an engine run. Accumulated
    /// leads, commissions, and reports carry over between runs.
    pub fn begin_run(&mut self) {
        self.step_count = 0;
        self.retry_count = 0;
        self.cursors = RunCursors::default();
        self.last_error = None;
        if self.current_task == CurrentTask::Completed {
            self.current_task = CurrentTask::Idle;
        }
    }

    pub fn prospect(&self, lead_id: &str) -> Option<&Lead> {
        self.prospects.iter().find(|l| l.id == lead_id)
    }

    pub fn prospect_count(&self, status: LeadStatus) -> usize {
        self.prospects.iter().filter(|l| l.status == status).count()
    }

    pub fn commission_count(&self, status: CommissionStatus) -> usize {
        self.commissions
            .iter()
            .filter(|c| c.status == status)
            .count()
    }

    /// True if any prospect still needs a CRM pass: converted leads always
    /// do (they must move to the affiliate pool), contacted leads until
    /// their record has been synced once.
    pub fn awaiting_crm_sync(&self) -> bool {
        self.prospects.iter().any(|l| match l.status {
            LeadStatus::Converted => true,
            LeadStatus::Contacted => !l.crm_synced,
            _ => false,
        })
    }
}

/// Metrics/suggestions annotation produced by the performance stage.
/// Attaching it never mutates leads or commissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub analysis_period_days: u32,
    pub total_prospects: usize,
    pub contacted_prospects: usize,
    pub converted_prospects: usize,
    pub active_affiliates: usize,
    pub outreach_conversion_rate: f64,
    pub total_sales: f64,
    pub total_commissions: f64,
    pub top_affiliates: Vec<AffiliateEarnings>,
    pub suggestions: Vec<String>,
    pub anomalies: Vec<String>,
}

/// Earnings rollup for one affiliate within the analysis window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateEarnings {
    pub affiliate_id: String,
    pub earnings: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_status_forward_only() {
        use CommissionStatus::*;
        assert!(Pending.can_transition(Approved));
        assert!(Approved.can_transition(Paid));
        assert!(Pending.can_transition(Rejected));
        assert!(Approved.can_transition(Rejected));

        assert!(!Approved.can_transition(Pending));
        assert!(!Paid.can_transition(Approved));
        assert!(!Paid.can_transition(Pending));
        assert!(!Rejected.can_transition(Pending));
        assert!(!Rejected.can_transition(Approved));
        assert!(!Paid.can_transition(Rejected));
    }

    #[test]
    fn test_transition_rejects_reversal() {
        let mut c = Commission {
            id: "comm-1".to_string(),
            affiliate_id: "aff-1".to_string(),
            sale_amount: 100.0,
            rate: 0.7,
            amount: 70.0,
            status: CommissionStatus::Paid,
            sale_ref: "tx-1".to_string(),
            sale_date: Utc::now(),
        };
        assert!(c.transition(CommissionStatus::Pending).is_err());
        assert_eq!(c.status, CommissionStatus::Paid);
        // Same-status transition is a no-op, not an error.
        assert!(c.transition(CommissionStatus::Paid).is_ok());
    }

    #[test]
    fn test_begin_run_resets_cursors_only() {
        let mut state = CampaignState::new("camp-1");
        state.step_count = 7;
        state.cursors.scouted = true;
        state.current_task = CurrentTask::Completed;
        state.prospects.push(Lead {
            id: "lead-1".to_string(),
            name: "AI Insights Hub".to_string(),
            platform: "youtube".to_string(),
            score: 0.8,
            audience_size: 150_000,
            status: LeadStatus::Discovered,
            contact: HashMap::new(),
            outreach_history: Vec::new(),
            crm_synced: false,
            notes: None,
        });

        state.begin_run();

        assert_eq!(state.step_count, 0);
        assert_eq!(state.cursors, RunCursors::default());
        assert_eq!(state.current_task, CurrentTask::Idle);
        assert_eq!(state.prospects.len(), 1);
    }
}
