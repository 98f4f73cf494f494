//! Payment stage — settles approved commissions through the payment
//! gateway, batched per affiliate. Every approved commission leaves this
//! stage as either paid or rejected.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use affiliate_core::config::PaymentConfig;
use affiliate_core::stage::{StageHandler, StageOutcome};
use affiliate_core::types::{CampaignState, CommissionStatus, Stage};

use crate::collaborators::{PaymentGateway, PayoutResult};

pub struct PaymentHandler {
    gateway: Arc<dyn PaymentGateway>,
    config: PaymentConfig,
}

impl PaymentHandler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: PaymentConfig) -> Self {
        Self { gateway, config }
    }

    /// Groups approved commission indices into payout batches: one batch
    /// per affiliate, or one per commission when batching is disabled.
    fn batches(&self, state: &CampaignState) -> Vec<(String, Vec<usize>)> {
        let mut batches: Vec<(String, Vec<usize>)> = Vec::new();
        for (idx, c) in state.commissions.iter().enumerate() {
            if c.status != CommissionStatus::Approved {
                continue;
            }
            if self.config.batch_payments {
                if let Some(batch) = batches.iter_mut().find(|(aff, _)| aff == &c.affiliate_id) {
                    batch.1.push(idx);
                    continue;
                }
            }
            batches.push((c.affiliate_id.clone(), vec![idx]));
        }
        batches
    }
}

#[async_trait]
impl StageHandler for PaymentHandler {
    fn stage(&self) -> Stage {
        Stage::Payment
    }

    async fn run(&self, mut state: CampaignState) -> (CampaignState, StageOutcome) {
        let batches = self.batches(&state);
        if batches.is_empty() {
            return (state, StageOutcome::Success);
        }

        let mut paid = 0usize;
        let mut rejected = 0usize;
        let mut total_paid = 0.0f64;

        for (affiliate_id, indices) in batches {
            let batch_total: f64 = indices.iter().map(|&i| state.commissions[i].amount).sum();

            // An approved batch below the payout minimum means the approval
            // and payout thresholds disagree; bounce it rather than leave
            // the batch approved forever.
            if batch_total < self.config.minimum_payment {
                warn!(
                    affiliate_id = %affiliate_id,
                    batch_total,
                    minimum = self.config.minimum_payment,
                    "Approved batch below payout minimum, rejecting"
                );
                for &i in &indices {
                    if let Err(e) = state.commissions[i].transition(CommissionStatus::Rejected) {
                        warn!(commission_id = %state.commissions[i].id, error = %e, "Rejection skipped");
                    } else {
                        rejected += 1;
                    }
                }
                continue;
            }

            match self
                .gateway
                .pay(&affiliate_id, batch_total, &self.config.default_currency)
                .await
            {
                Ok(PayoutResult::Paid { transaction_id }) => {
                    info!(
                        affiliate_id = %affiliate_id,
                        amount = batch_total,
                        tx = %transaction_id,
                        "Payout settled"
                    );
                    for &i in &indices {
                        if let Err(e) = state.commissions[i].transition(CommissionStatus::Paid) {
                            warn!(commission_id = %state.commissions[i].id, error = %e, "Payment mark skipped");
                        } else {
                            paid += 1;
                            total_paid += state.commissions[i].amount;
                        }
                    }
                }
                Ok(PayoutResult::Refused { reason }) => {
                    warn!(affiliate_id = %affiliate_id, reason = %reason, "Payout refused");
                    for &i in &indices {
                        if let Err(e) = state.commissions[i].transition(CommissionStatus::Rejected)
                        {
                            warn!(commission_id = %state.commissions[i].id, error = %e, "Rejection skipped");
                        } else {
                            rejected += 1;
                        }
                    }
                }
                Err(e) => {
                    // Gateway unreachable; everything stays approved for the
                    // retry.
                    return (
                        state,
                        StageOutcome::Retryable(format!(
                            "payout to {} failed: {}",
                            affiliate_id, e
                        )),
                    );
                }
            }
        }

        metrics::counter!("stages.payment.settled").increment(paid as u64);
        info!(
            campaign_id = %state.campaign_id,
            paid,
            rejected,
            total_paid,
            "Payment pass complete"
        );
        (state, StageOutcome::Success)
    }
}
