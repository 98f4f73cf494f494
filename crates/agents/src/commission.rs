//! Commission stage — pulls sales from the ledger, attributes them to
//! active affiliates, records pending commissions deduplicated by sale
//! reference, and applies the auto-approval policy for payout-ready
//! affiliates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use affiliate_core::config::CommissionConfig;
use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{CampaignState, Commission, CommissionStatus, Stage};

use crate::collaborators::SalesLedger;

pub struct CommissionHandler {
    ledger: Arc<dyn SalesLedger>,
    config: CommissionConfig,
}

impl CommissionHandler {
    pub fn new(ledger: Arc<dyn SalesLedger>, config: CommissionConfig) -> Self {
        Self { ledger, config }
    }

    /// Commission rate for an affiliate with `prior_sales` recorded sales:
    /// the base rate plus the best tier bonus the volume qualifies for.
    fn rate_for(&self, prior_sales: u32) -> f64 {
        let bonus = self
            .config
            .performance_tiers
            .iter()
            .filter(|t| prior_sales >= t.threshold)
            .map(|t| t.bonus)
            .fold(0.0, f64::max);
        self.config.default_rate + bonus
    }
}

#[async_trait]
impl StageHandler for CommissionHandler {
    fn stage(&self) -> Stage {
        Stage::Commission
    }

    async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
        let sales = match self.ledger.fetch_sales().await {
            Ok(sales) => sales,
            Err(e) => {
                return (
                    state,
                    StageOutcome::Retryable(format!("sales ledger unavailable: {}", e)),
                );
            }
        };

        // Sales already recorded per affiliate, for tier computation.
        let mut sale_counts: HashMap<String, u32> = HashMap::new();
        for c in &state.commissions {
            *sale_counts.entry(c.affiliate_id.clone()).or_insert(0) += 1;
        }

        let mut recorded = 0usize;
        for sale in &sales {
            let Some(affiliate_id) = sale.affiliate_id.as_deref() else {
                debug!(tx = %sale.transaction_id, "Sale carries no affiliate attribution");
                continue;
            };
            if !state.affiliates.iter().any(|a| a.id == affiliate_id) {
                debug!(
                    tx = %sale.transaction_id,
                    affiliate_id,
                    "Sale attributed to unknown affiliate, skipping"
                );
                continue;
            }

            let commission_id = format!("comm_{}", sale.transaction_id);
            if state.commissions.iter().any(|c| c.id == commission_id) {
                continue;
            }

            let prior = sale_counts.get(affiliate_id).copied().unwrap_or(0);
            let rate = self.rate_for(prior);
            state.commissions.push(Commission {
                id: commission_id,
                affiliate_id: affiliate_id.to_string(),
                sale_amount: sale.amount,
                rate,
                amount: sale.amount * rate,
                status: CommissionStatus::Pending,
                sale_ref: sale.transaction_id.clone(),
                sale_date: sale.occurred_at,
            });
            *sale_counts.entry(affiliate_id.to_string()).or_insert(0) += 1;
            recorded += 1;
        }

        // Auto-approval: an affiliate's pending balance becomes payable once
        // it clears the payout threshold; smaller balances keep accruing.
        let mut approved = 0usize;
        if self.config.auto_approve_commissions {
            let mut pending_totals: HashMap<String, f64> = HashMap::new();
            for c in &state.commissions {
                if c.status == CommissionStatus::Pending {
                    *pending_totals.entry(c.affiliate_id.clone()).or_insert(0.0) += c.amount;
                }
            }
            for c in &mut state.commissions {
                if c.status != CommissionStatus::Pending {
                    continue;
                }
                let total = pending_totals.get(&c.affiliate_id).copied().unwrap_or(0.0);
                if total < self.config.payment_threshold {
                    continue;
                }
                if let Err(e) = c.transition(CommissionStatus::Approved) {
                    warn!(commission_id = %c.id, error = %e, "Approval skipped");
                    continue;
                }
                approved += 1;
            }
        }

        state.cursors.sales_recorded = true;
        metrics::counter!("stages.commission.recorded").increment(recorded as u64);
        info!(
            campaign_id = %state.campaign_id,
            recorded,
            approved,
            total = state.commissions.len(),
            "Commission pass complete"
        );
        (state, StageOutcome::Success)
    }
}
