//! Campaign registry — keyed store mapping campaign ids to their latest
//! persisted state and run metadata. Enforces the single-writer-per-campaign
//! discipline: at most one in-flight run per campaign id, with concurrent run
//! requests rejected (`AlreadyRunning`) rather than queued.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use affiliate_core::config::ScoutConfig;
use affiliate_core::error::{FlowError, FlowResult};
use affiliate_core::types::{CampaignState, CommissionStatus, CurrentTask};

/// Creation-time campaign settings supplied by the control surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Targeting override for the scout stage; the application default is
    /// used when absent.
    #[serde(default)]
    pub targeting: Option<ScoutConfig>,
}

/// Run bookkeeping kept alongside each campaign's state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMeta {
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}

#[derive(Debug, Clone)]
struct CampaignRecord {
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    state: CampaignState,
    meta: RunMeta,
    running: bool,
}

/// One row of `list()` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub prospects: usize,
    pub affiliates: usize,
    pub commissions: usize,
    pub pending_commission_total: f64,
    pub paid_commission_total: f64,
}

/// Full descriptor for a single campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDescriptor {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub current_task: CurrentTask,
}

/// In-memory campaign store. Sharded map, so operations on different
/// campaign ids never contend; persistence beyond the process lifetime is an
/// injected concern, not part of this store.
#[derive(Default)]
pub struct CampaignRegistry {
    campaigns: DashMap<String, CampaignRecord>,
    default_targeting: ScoutConfig,
}

impl CampaignRegistry {
    pub fn new(default_targeting: ScoutConfig) -> Self {
        Self {
            campaigns: DashMap::new(),
            default_targeting,
        }
    }

    /// Registers a new campaign with empty collections. Fails if the id is
    /// already taken.
    pub fn create(&self, id: &str, config: CampaignConfig) -> FlowResult<CampaignState> {
        if self.campaigns.contains_key(id) {
            return Err(FlowError::AlreadyExists(id.to_string()));
        }

        let mut state = CampaignState::new(id);
        state.targeting = config
            .targeting
            .unwrap_or_else(|| self.default_targeting.clone());

        let record = CampaignRecord {
            name: config.name,
            description: config.description,
            created_at: Utc::now(),
            state: state.clone(),
            meta: RunMeta::default(),
            running: false,
        };

        info!(campaign_id = %id, name = %record.name, "Campaign registered");
        self.campaigns.insert(id.to_string(), record);
        Ok(state)
    }

    /// Returns the latest persisted state for `id`.
    pub fn get(&self, id: &str) -> FlowResult<CampaignState> {
        self.campaigns
            .get(id)
            .map(|r| r.state.clone())
            .ok_or_else(|| FlowError::NotFound(id.to_string()))
    }

    /// Overwrites the persisted state for `id`. Used by the engine to
    /// snapshot after every stage.
    pub fn save(&self, id: &str, state: CampaignState) -> FlowResult<()> {
        let mut record = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        record.state = state;
        Ok(())
    }

    /// Returns the full descriptor for `id`.
    pub fn descriptor(&self, id: &str) -> FlowResult<CampaignDescriptor> {
        let record = self
            .campaigns
            .get(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        Ok(CampaignDescriptor {
            id: id.to_string(),
            name: record.name.clone(),
            description: record.description.clone(),
            created_at: record.created_at,
            last_run: record.meta.last_run,
            run_count: record.meta.run_count,
            current_task: record.state.current_task,
        })
    }

    /// Summaries for all registered campaigns.
    pub fn list(&self) -> Vec<CampaignSummary> {
        let mut summaries: Vec<CampaignSummary> = self
            .campaigns
            .iter()
            .map(|entry| {
                let r = entry.value();
                let pending_total: f64 = r
                    .state
                    .commissions
                    .iter()
                    .filter(|c| c.status == CommissionStatus::Pending)
                    .map(|c| c.amount)
                    .sum();
                let paid_total: f64 = r
                    .state
                    .commissions
                    .iter()
                    .filter(|c| c.status == CommissionStatus::Paid)
                    .map(|c| c.amount)
                    .sum();
                CampaignSummary {
                    id: entry.key().clone(),
                    name: r.name.clone(),
                    description: r.description.clone(),
                    running: r.running,
                    last_run: r.meta.last_run,
                    run_count: r.meta.run_count,
                    prospects: r.state.prospects.len(),
                    affiliates: r.state.affiliates.len(),
                    commissions: r.state.commissions.len(),
                    pending_commission_total: pending_total,
                    paid_commission_total: paid_total,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Claims the single in-flight-run slot for `id` and hands out the state
    /// for the run. Rejects with `AlreadyRunning` when a run is in flight.
    ///
    /// The map guard is released before this returns; the engine never holds
    /// registry locks across a stage call.
    pub fn begin_run(&self, id: &str) -> FlowResult<CampaignState> {
        let mut record = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        if record.running {
            return Err(FlowError::AlreadyRunning(id.to_string()));
        }
        record.running = true;
        Ok(record.state.clone())
    }

    /// Persists the final state of a run, stamps run metadata, and releases
    /// the in-flight slot.
    pub fn finish_run(&self, id: &str, state: CampaignState) -> FlowResult<()> {
        let mut record = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        record.state = state;
        record.running = false;
        record.meta.last_run = Some(Utc::now());
        record.meta.run_count += 1;
        Ok(())
    }

    /// True when a run is currently in flight for `id`.
    pub fn is_running(&self, id: &str) -> bool {
        self.campaigns.get(id).map(|r| r.running).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> CampaignConfig {
        CampaignConfig {
            name: name.to_string(),
            description: None,
            targeting: None,
        }
    }

    #[test]
    fn test_create_and_get() {
        let registry = CampaignRegistry::default();
        let state = registry.create("camp-1", config("Launch")).unwrap();
        assert_eq!(state.campaign_id, "camp-1");
        assert!(state.prospects.is_empty());

        let fetched = registry.get("camp-1").unwrap();
        assert_eq!(fetched.campaign_id, "camp-1");
    }

    #[test]
    fn test_create_duplicate_fails() {
        let registry = CampaignRegistry::default();
        registry.create("camp-1", config("Launch")).unwrap();
        let err = registry.create("camp-1", config("Launch")).unwrap_err();
        assert!(matches!(err, FlowError::AlreadyExists(_)));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let registry = CampaignRegistry::default();
        assert!(matches!(
            registry.get("nope").unwrap_err(),
            FlowError::NotFound(_)
        ));
    }

    #[test]
    fn test_begin_run_is_exclusive() {
        let registry = CampaignRegistry::default();
        registry.create("camp-1", config("Launch")).unwrap();

        let state = registry.begin_run("camp-1").unwrap();
        let err = registry.begin_run("camp-1").unwrap_err();
        assert!(matches!(err, FlowError::AlreadyRunning(_)));

        registry.finish_run("camp-1", state).unwrap();
        // Slot released, a new run may begin.
        assert!(registry.begin_run("camp-1").is_ok());
    }

    #[test]
    fn test_finish_run_stamps_metadata() {
        let registry = CampaignRegistry::default();
        registry.create("camp-1", config("Launch")).unwrap();

        let state = registry.begin_run("camp-1").unwrap();
        registry.finish_run("camp-1", state).unwrap();

        let descriptor = registry.descriptor("camp-1").unwrap();
        assert_eq!(descriptor.run_count, 1);
        assert!(descriptor.last_run.is_some());
    }

    #[test]
    fn test_list_reports_counts() {
        let registry = CampaignRegistry::default();
        registry.create("camp-2", config("B")).unwrap();
        registry.create("camp-1", config("A")).unwrap();

        let summaries = registry.list();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "camp-1");
        assert_eq!(summaries[1].id, "camp-2");
        assert_eq!(summaries[0].prospects, 0);
    }
}
