//! CRM stage — pushes contacted/converted leads to the CRM of record and
//! promotes converted leads into the affiliate pool. The prospect and
//! affiliate pools stay disjoint through this move.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{CampaignState, LeadStatus, Stage};

use crate::collaborators::CrmClient;

pub struct CrmHandler {
    client: Arc<dyn CrmClient>,
}

impl CrmHandler {
    pub fn new(client: Arc<dyn CrmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageHandler for CrmHandler {
    fn stage(&self) -> Stage {
        Stage::Crm
    }

    async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
        let mut synced = 0usize;
        let mut promoted = 0usize;

        // Sync contacted leads in place.
        for idx in 0..state.prospects.len() {
            let lead = state.prospects[idx].clone();
            if lead.status != LeadStatus::Contacted || lead.crm_synced {
                continue;
            }
            match self.client.upsert_contact(&lead).await {
                Ok(()) => {
                    state.prospects[idx].crm_synced = true;
                    synced += 1;
                }
                Err(e) => {
                    return (
                        state,
                        StageOutcome::Retryable(format!("CRM sync for {} failed: {}", lead.id, e)),
                    );
                }
            }
        }

        // Promote converted leads into the affiliate pool. The prospect is
        // only removed once the CRM accepted the record, so a retryable
        // failure leaves the state untouched for this lead.
        let mut idx = 0;
        while idx < state.prospects.len() {
            if state.prospects[idx].status != LeadStatus::Converted {
                idx += 1;
                continue;
            }

            let mut lead = state.prospects[idx].clone();
            lead.status = LeadStatus::Active;
            lead.crm_synced = true;
            match self.client.upsert_contact(&lead).await {
                Ok(()) => {
                    state.prospects.remove(idx);
                    if state.affiliates.iter().any(|a| a.id == lead.id) {
                        debug!(lead_id = %lead.id, "Already an affiliate, dropping duplicate");
                        continue;
                    }
                    info!(lead_id = %lead.id, "Lead promoted to active affiliate");
                    state.affiliates.push(lead);
                    promoted += 1;
                }
                Err(e) => {
                    return (
                        state,
                        StageOutcome::Retryable(format!(
                            "CRM sync for {} failed: {}",
                            lead.id, e
                        )),
                    );
                }
            }
        }

        state.crm_sync_status = Some(format!(
            "CRM sync: {} synced, {} promoted",
            synced, promoted
        ));
        metrics::counter!("stages.crm.promotions").increment(promoted as u64);
        info!(
            campaign_id = %state.campaign_id,
            synced,
            promoted,
            "CRM pass complete"
        );
        (state, StageOutcome::Success)
    }
}
