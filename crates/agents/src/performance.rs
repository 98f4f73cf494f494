//! Performance stage — computes a metrics snapshot over the analysis
//! window and attaches it, with suggestions and anomaly notes, as an
//! annotation. Leads and commissions are never mutated here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use affiliate_core::config::PerformanceConfig;
use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{
    AffiliateEarnings, CampaignState, LeadStatus, PerformanceReport, Stage,
};

use crate::collaborators::InsightGenerator;

pub struct PerformanceHandler {
    insights: Arc<dyn InsightGenerator>,
    config: PerformanceConfig,
}

impl PerformanceHandler {
    pub fn new(insights: Arc<dyn InsightGenerator>, config: PerformanceConfig) -> Self {
        Self { insights, config }
    }
}

#[async_trait]
impl StageHandler for PerformanceHandler {
    fn stage(&self) -> Stage {
        Stage::Performance
    }

    async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
        let window_start = Utc::now() - Duration::days(self.config.analysis_period_days as i64);

        let in_window: Vec<_> = state
            .commissions
            .iter()
            .filter(|c| c.sale_date > window_start)
            .collect();

        let total_sales: f64 = in_window.iter().map(|c| c.sale_amount).sum();
        let total_commissions: f64 = in_window.iter().map(|c| c.amount).sum();

        let contacted = state.prospect_count(LeadStatus::Contacted);
        let converted = state.prospect_count(LeadStatus::Converted) + state.affiliates.len();
        let attempted = contacted + converted;
        let conversion_rate = if attempted > 0 {
            converted as f64 / attempted as f64
        } else {
            0.0
        };

        let mut earnings: HashMap<String, f64> = HashMap::new();
        for c in &in_window {
            *earnings.entry(c.affiliate_id.clone()).or_insert(0.0) += c.amount;
        }
        let mut top_affiliates: Vec<AffiliateEarnings> = earnings
            .into_iter()
            .map(|(affiliate_id, earnings)| AffiliateEarnings {
                affiliate_id,
                earnings,
            })
            .collect();
        top_affiliates.sort_by(|a, b| {
            b.earnings
                .partial_cmp(&a.earnings)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.affiliate_id.cmp(&b.affiliate_id))
        });
        top_affiliates.truncate(self.config.top_affiliate_count);

        let mut anomalies = Vec::new();
        if attempted > 0 && conversion_rate < self.config.low_conversion_rate {
            anomalies.push(format!(
                "Conversion rate {:.3} is below the {:.3} alert threshold",
                conversion_rate, self.config.low_conversion_rate
            ));
        }
        if !state.affiliates.is_empty() && in_window.is_empty() {
            anomalies.push("Active affiliates produced no sales in the analysis window".to_string());
        }

        let suggestions = match self
            .insights
            .suggest(conversion_rate, total_commissions, state.affiliates.len())
            .await
        {
            Ok(s) => s,
            Err(e) => {
                return (
                    state,
                    StageOutcome::Retryable(format!("insight service unavailable: {}", e)),
                );
            }
        };

        state.performance_report = Some(PerformanceReport {
            generated_at: Utc::now(),
            analysis_period_days: self.config.analysis_period_days,
            total_prospects: state.prospects.len(),
            contacted_prospects: contacted,
            converted_prospects: converted,
            active_affiliates: state.affiliates.len(),
            outreach_conversion_rate: conversion_rate,
            total_sales,
            total_commissions,
            top_affiliates,
            suggestions,
            anomalies,
        });
        state.cursors.performance_reviewed = true;

        info!(
            campaign_id = %state.campaign_id,
            conversion_rate,
            total_commissions,
            "Performance review complete"
        );
        (state, StageOutcome::Success)
    }
}
