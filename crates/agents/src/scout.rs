//! Scout stage — refreshes the prospect pool from the configured
//! platform/keyword grid, filters by audience floor, scores, and appends
//! new leads deduplicated by id.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{CampaignState, Lead, LeadStatus, Stage};

use crate::collaborators::{ProspectScorer, RawProspect, ScoutingSource};

pub struct ScoutHandler {
    source: Arc<dyn ScoutingSource>,
    scorer: Arc<dyn ProspectScorer>,
}

impl ScoutHandler {
    pub fn new(source: Arc<dyn ScoutingSource>, scorer: Arc<dyn ProspectScorer>) -> Self {
        Self { source, scorer }
    }

    async fn build_lead(&self, raw: &RawProspect) -> anyhow::Result<Lead> {
        let score = self.scorer.score(raw).await?;
        Ok(Lead {
            id: raw.id.clone(),
            name: raw.name.clone(),
            platform: raw.platform.clone(),
            score,
            audience_size: raw.audience_size,
            status: LeadStatus::Discovered,
            contact: raw.contact.clone(),
            outreach_history: Vec::new(),
            crm_synced: false,
            notes: None,
        })
    }
}

#[async_trait]
impl StageHandler for ScoutHandler {
    fn stage(&self) -> Stage {
        Stage::Scout
    }

    async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
        let targeting = state.targeting.clone();

        let mut raw: Vec<RawProspect> = Vec::new();
        for platform in &targeting.platforms {
            for keyword in &targeting.keywords {
                match self.source.fetch(platform, keyword).await {
                    Ok(found) => raw.extend(found),
                    Err(e) => {
                        return (
                            state,
                            StageOutcome::Retryable(format!(
                                "scouting {} for '{}' failed: {}",
                                platform, keyword, e
                            )),
                        );
                    }
                }
            }
        }

        let before_filter = raw.len();
        raw.retain(|p| p.audience_size >= targeting.min_audience_size);
        debug!(
            campaign_id = %state.campaign_id,
            found = before_filter,
            kept = raw.len(),
            "Prospects after audience floor"
        );

        let mut added = 0usize;
        for prospect in &raw {
            // Never re-add or overwrite a lead we already track, in either
            // pool; leads past Discovered keep their progress.
            let known = state.prospects.iter().any(|l| l.id == prospect.id)
                || state.affiliates.iter().any(|l| l.id == prospect.id);
            if known {
                continue;
            }
            match self.build_lead(prospect).await {
                Ok(lead) => {
                    state.prospects.push(lead);
                    added += 1;
                }
                Err(e) => {
                    return (
                        state,
                        StageOutcome::Retryable(format!(
                            "scoring prospect {} failed: {}",
                            prospect.id, e
                        )),
                    );
                }
            }
        }

        state.cursors.scouted = true;
        metrics::counter!("stages.scout.leads_added").increment(added as u64);
        info!(
            campaign_id = %state.campaign_id,
            added,
            total = state.prospects.len(),
            "Scouting complete"
        );
        (state, StageOutcome::Success)
    }
}
