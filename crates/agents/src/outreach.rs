//! Outreach stage — picks targets (manually queued ids plus the best-scored
//! untouched discoveries), personalizes a message from templates, delivers
//! it, and records the attempt on each lead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use affiliate_core::config::OutreachConfig;
use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{CampaignState, LeadStatus, OutreachRecord, Stage};

use crate::collaborators::OutreachChannel;

const EXCERPT_LEN: usize = 100;

pub struct OutreachHandler {
    channel: Arc<dyn OutreachChannel>,
    config: OutreachConfig,
}

impl OutreachHandler {
    pub fn new(channel: Arc<dyn OutreachChannel>, config: OutreachConfig) -> Self {
        Self { channel, config }
    }

    fn fill_template(template: &str, name: &str, platform: &str) -> String {
        template
            .replace("{LEAD_NAME}", name)
            .replace("{LEAD_PLATFORM}", platform)
    }

    /// Target ids for this pass: the explicit queue first, then untouched
    /// discovered prospects by descending score, capped at the per-run
    /// limit.
    fn select_targets(&self, state: &CampaignState) -> Vec<String> {
        let mut targets: Vec<String> = state
            .outreach_targets
            .iter()
            .filter(|id| state.prospect(id).is_some())
            .cloned()
            .collect();

        let mut eligible: Vec<&affiliate_core::types::Lead> = state
            .prospects
            .iter()
            .filter(|l| {
                l.status == LeadStatus::Discovered
                    && l.outreach_untouched()
                    && !targets.contains(&l.id)
            })
            .collect();
        eligible.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        for lead in eligible {
            if targets.len() >= self.config.max_outreach_per_run {
                break;
            }
            targets.push(lead.id.clone());
        }
        targets.truncate(self.config.max_outreach_per_run);
        targets
    }
}

#[async_trait]
impl StageHandler for OutreachHandler {
    fn stage(&self) -> Stage {
        Stage::Outreach
    }

    async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
        let targets = self.select_targets(&state);
        if targets.is_empty() {
            debug!(campaign_id = %state.campaign_id, "No outreach targets");
            state.outreach_targets.clear();
            return (state, StageOutcome::Success);
        }

        let contact_key = self.channel.contact_key().to_string();
        let mut contacted = 0usize;
        let mut converted = 0usize;
        let mut unreachable = 0usize;

        for lead_id in &targets {
            let Some(idx) = state.prospects.iter().position(|l| &l.id == lead_id) else {
                continue;
            };

            // Work on a snapshot so the channel sees an immutable lead.
            let lead = state.prospects[idx].clone();
            if matches!(lead.status, LeadStatus::Contacted | LeadStatus::Converted) {
                debug!(lead_id = %lead.id, "Already contacted, skipping");
                continue;
            }

            let Some(recipient) = lead.contact.get(&contact_key).cloned() else {
                // Cannot ever reach this lead over the configured channel;
                // reject it so it stops matching the outreach rule.
                let entry = &mut state.prospects[idx];
                entry.status = LeadStatus::Rejected;
                entry.notes = Some(format!(
                    "Outreach skipped: no {} contact info",
                    self.channel.channel()
                ));
                unreachable += 1;
                continue;
            };

            let subject =
                Self::fill_template(&self.config.subject_template, &lead.name, &lead.platform);
            let body =
                Self::fill_template(&self.config.message_template, &lead.name, &lead.platform);

            match self.channel.send(&lead, &subject, &body).await {
                Ok(receipt) => {
                    let entry = &mut state.prospects[idx];
                    entry.status = if receipt.converted {
                        converted += 1;
                        LeadStatus::Converted
                    } else {
                        contacted += 1;
                        LeadStatus::Contacted
                    };
                    let excerpt: String = body.chars().take(EXCERPT_LEN).collect();
                    entry.outreach_history.push(OutreachRecord {
                        channel: self.channel.channel().to_string(),
                        recipient,
                        message_excerpt: excerpt,
                        sent_at: Utc::now(),
                    });
                }
                Err(e) => {
                    return (
                        state,
                        StageOutcome::Retryable(format!(
                            "outreach to {} failed: {}",
                            lead_id, e
                        )),
                    );
                }
            }
        }

        state.outreach_targets.clear();
        metrics::counter!("stages.outreach.sent").increment((contacted + converted) as u64);
        info!(
            campaign_id = %state.campaign_id,
            contacted,
            converted,
            unreachable,
            "Outreach pass complete"
        );
        (state, StageOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEmailChannel;
    use std::collections::HashMap;

    fn lead(id: &str, score: f64, email: bool) -> affiliate_core::types::Lead {
        let mut contact = HashMap::new();
        if email {
            contact.insert("email".to_string(), format!("{}@example.com", id));
        }
        affiliate_core::types::Lead {
            id: id.to_string(),
            name: format!("Lead {}", id),
            platform: "youtube".to_string(),
            score,
            audience_size: 10_000,
            status: LeadStatus::Discovered,
            contact,
            outreach_history: Vec::new(),
            crm_synced: false,
            notes: None,
        }
    }

    fn handler() -> OutreachHandler {
        OutreachHandler::new(Arc::new(MockEmailChannel), OutreachConfig::default())
    }

    #[tokio::test]
    async fn test_outreach_transitions_discovered_leads() {
        let mut state = CampaignState::new("camp-1");
        state.cursors.scouted = true;
        state.prospects.push(lead("yt_ai_channel_1", 0.9, true));
        state.prospects.push(lead("yt_ai_channel_2", 0.6, true));

        let (state, outcome) = handler().run(state).await;

        assert_eq!(outcome, StageOutcome::Success);
        // The well-known mock prospect converts on the spot.
        assert_eq!(
            state.prospect("yt_ai_channel_1").unwrap().status,
            LeadStatus::Converted
        );
        assert_eq!(
            state.prospect("yt_ai_channel_2").unwrap().status,
            LeadStatus::Contacted
        );
        assert!(state
            .prospects
            .iter()
            .all(|l| l.outreach_history.len() == 1));
    }

    #[tokio::test]
    async fn test_outreach_is_idempotent() {
        let mut state = CampaignState::new("camp-1");
        state.prospects.push(lead("yt_ai_channel_2", 0.6, true));

        let (state, _) = handler().run(state).await;
        let (state, outcome) = handler().run(state).await;

        assert_eq!(outcome, StageOutcome::Success);
        assert_eq!(
            state.prospect("yt_ai_channel_2").unwrap().outreach_history.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unreachable_lead_is_rejected() {
        let mut state = CampaignState::new("camp-1");
        state.prospects.push(lead("no-email", 0.4, false));

        let (state, outcome) = handler().run(state).await;

        assert_eq!(outcome, StageOutcome::Success);
        let l = state.prospect("no-email").unwrap();
        assert_eq!(l.status, LeadStatus::Rejected);
        assert!(l.notes.as_deref().unwrap().contains("no email contact"));
    }

    #[tokio::test]
    async fn test_manual_targets_processed_and_cleared() {
        let mut state = CampaignState::new("camp-1");
        state.prospects.push(lead("yt_ai_channel_2", 0.6, true));
        state.outreach_targets = vec![
            "yt_ai_channel_2".to_string(),
            "ghost-lead".to_string(),
        ];

        let (state, outcome) = handler().run(state).await;

        assert_eq!(outcome, StageOutcome::Success);
        assert!(state.outreach_targets.is_empty());
        assert_eq!(
            state.prospect("yt_ai_channel_2").unwrap().status,
            LeadStatus::Contacted
        );
    }

    #[tokio::test]
    async fn test_per_run_cap_prefers_high_scores() {
        let mut config = OutreachConfig::default();
        config.max_outreach_per_run = 1;
        let handler = OutreachHandler::new(Arc::new(MockEmailChannel), config);

        let mut state = CampaignState::new("camp-1");
        state.prospects.push(lead("low", 0.2, true));
        state.prospects.push(lead("high", 0.9, true));

        let (state, _) = handler.run(state).await;

        assert_eq!(state.prospect("high").unwrap().status, LeadStatus::Contacted);
        assert_eq!(state.prospect("low").unwrap().status, LeadStatus::Discovered);
    }
}
