//! Canned-data collaborators. These stand in for the real platform, CRM,
//! and payment integrations; every call succeeds deterministically so the
//! pipeline can run end-to-end without network access.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::debug;

use affiliate_core::types::Lead;

use crate::collaborators::{
    CrmClient, InsightGenerator, OutreachChannel, OutreachReceipt, PaymentGateway, PayoutResult,
    ProspectScorer, RawProspect, SaleRecord, SalesLedger, ScoutingSource,
};

/// Returns canned prospects for a subset of platform/keyword combinations
/// to simulate source variability.
#[derive(Debug, Default)]
pub struct MockScoutingSource;

#[async_trait]
impl ScoutingSource for MockScoutingSource {
    async fn fetch(&self, platform: &str, keyword: &str) -> anyhow::Result<Vec<RawProspect>> {
        debug!(platform, keyword, "Scouting (mock data)");

        let mut prospects = Vec::new();
        if platform == "youtube" && keyword.contains("AI") {
            prospects.push(RawProspect {
                id: "yt_ai_channel_1".to_string(),
                name: "AI Insights Hub".to_string(),
                platform: "youtube".to_string(),
                audience_size: 150_000,
                engagement_rate: 0.05,
                description: "Deep dives into AI research and applications.".to_string(),
                contact: HashMap::from([(
                    "email".to_string(),
                    "ai.insights@example.com".to_string(),
                )]),
            });
            prospects.push(RawProspect {
                id: "yt_ai_channel_2".to_string(),
                name: "ML For Everyone".to_string(),
                platform: "youtube".to_string(),
                audience_size: 75_000,
                engagement_rate: 0.03,
                description: "Making machine learning accessible to all.".to_string(),
                contact: HashMap::from([(
                    "email".to_string(),
                    "ml.everyone@example.com".to_string(),
                )]),
            });
        } else if platform == "twitter" && keyword.contains("SaaS") {
            prospects.push(RawProspect {
                id: "tw_saas_guru_1".to_string(),
                name: "SaaS Guru".to_string(),
                platform: "twitter".to_string(),
                audience_size: 25_000,
                engagement_rate: 0.02,
                description: "Latest trends and reviews in the SaaS world.".to_string(),
                contact: HashMap::from([
                    ("email".to_string(), "saas.guru@example.com".to_string()),
                    ("handle".to_string(), "@saasguru".to_string()),
                ]),
            });
            // Below the default audience floor; filtered out by the scout.
            prospects.push(RawProspect {
                id: "tw_saas_reviewer_2".to_string(),
                name: "CloudReviewer".to_string(),
                platform: "twitter".to_string(),
                audience_size: 500,
                engagement_rate: 0.01,
                description: "Honest SaaS reviews.".to_string(),
                contact: HashMap::from([(
                    "handle".to_string(),
                    "@cloudreviewer".to_string(),
                )]),
            });
        }

        Ok(prospects)
    }
}

/// Deterministic stand-in for the LLM scoring service: audience reach and
/// engagement folded into a single acquisition score.
#[derive(Debug, Default)]
pub struct MockProspectScorer;

#[async_trait]
impl ProspectScorer for MockProspectScorer {
    async fn score(&self, prospect: &RawProspect) -> anyhow::Result<f64> {
        let reach = ((prospect.audience_size as f64).max(1.0).log10() / 6.0).min(0.5);
        let engagement = (prospect.engagement_rate * 10.0).min(0.5);
        Ok((reach + engagement).clamp(0.0, 1.0))
    }
}

/// Email channel that "delivers" everything and converts one well-known
/// prospect on the spot.
#[derive(Debug, Default)]
pub struct MockEmailChannel;

#[async_trait]
impl OutreachChannel for MockEmailChannel {
    fn channel(&self) -> &str {
        "email"
    }

    fn contact_key(&self) -> &str {
        "email"
    }

    async fn send(
        &self,
        lead: &Lead,
        _subject: &str,
        _body: &str,
    ) -> anyhow::Result<OutreachReceipt> {
        debug!(lead_id = %lead.id, "Sending outreach email (mock)");
        Ok(OutreachReceipt {
            message_id: format!("mock_msg_id_{}", lead.id),
            converted: lead.id == "yt_ai_channel_1",
        })
    }
}

/// Records synced lead ids so tests can assert on CRM traffic.
#[derive(Debug, Default)]
pub struct MockCrmClient {
    synced: Mutex<Vec<String>>,
}

impl MockCrmClient {
    pub fn synced_ids(&self) -> Vec<String> {
        self.synced.lock().expect("crm mock mutex poisoned").clone()
    }
}

#[async_trait]
impl CrmClient for MockCrmClient {
    async fn upsert_contact(&self, lead: &Lead) -> anyhow::Result<()> {
        debug!(lead_id = %lead.id, status = ?lead.status, "CRM upsert (mock)");
        self.synced
            .lock()
            .expect("crm mock mutex poisoned")
            .push(lead.id.clone());
        Ok(())
    }
}

/// Canned sales, including one attributed to an unknown affiliate id that
/// the commission stage must skip.
#[derive(Debug, Default)]
pub struct MockSalesLedger;

#[async_trait]
impl SalesLedger for MockSalesLedger {
    async fn fetch_sales(&self) -> anyhow::Result<Vec<SaleRecord>> {
        let now = Utc::now();
        Ok(vec![
            SaleRecord {
                transaction_id: "mock_stripe_tx_001".to_string(),
                source: "mock_stripe".to_string(),
                amount: 100.0,
                affiliate_id: Some("yt_ai_channel_1".to_string()),
                occurred_at: now - Duration::hours(10),
            },
            SaleRecord {
                transaction_id: "mock_paypal_tx_002".to_string(),
                source: "mock_paypal".to_string(),
                amount: 75.50,
                affiliate_id: Some("tw_saas_guru_1".to_string()),
                occurred_at: now - Duration::hours(5),
            },
            SaleRecord {
                transaction_id: "mock_stripe_tx_003".to_string(),
                source: "mock_stripe".to_string(),
                amount: 25.0,
                affiliate_id: Some("yt_ai_channel_1".to_string()),
                occurred_at: now - Duration::hours(2),
            },
            SaleRecord {
                transaction_id: "mock_stripe_tx_004".to_string(),
                source: "mock_stripe".to_string(),
                amount: 50.0,
                affiliate_id: Some("unknown_affiliate_id".to_string()),
                occurred_at: now - Duration::hours(1),
            },
        ])
    }
}

/// Pays every payout except affiliates on the refusal list.
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    refuse: HashSet<String>,
}

impl MockPaymentGateway {
    pub fn refusing(affiliate_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            refuse: affiliate_ids.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn pay(
        &self,
        affiliate_id: &str,
        amount: f64,
        currency: &str,
    ) -> anyhow::Result<PayoutResult> {
        debug!(affiliate_id, amount, currency, "Processing payout (mock)");
        if self.refuse.contains(affiliate_id) {
            return Ok(PayoutResult::Refused {
                reason: format!("payout account for {} is blocked", affiliate_id),
            });
        }
        Ok(PayoutResult::Paid {
            transaction_id: format!("mock_payout_{}", affiliate_id),
        })
    }
}

/// Threshold-driven stand-in for the LLM suggestion service.
#[derive(Debug, Default)]
pub struct MockInsightGenerator;

#[async_trait]
impl InsightGenerator for MockInsightGenerator {
    async fn suggest(
        &self,
        conversion_rate: f64,
        total_commissions: f64,
        active_affiliates: usize,
    ) -> anyhow::Result<Vec<String>> {
        let mut suggestions = Vec::new();
        if conversion_rate < 0.1 {
            suggestions.push(
                "Outreach conversion is low; tighten prospect targeting or revise the pitch."
                    .to_string(),
            );
        }
        if active_affiliates == 0 {
            suggestions
                .push("No active affiliates yet; prioritize converting contacted leads.".to_string());
        }
        if total_commissions > 0.0 && active_affiliates > 0 {
            suggestions.push(
                "Commissions are flowing; consider a tier bonus to reward top performers."
                    .to_string(),
            );
        }
        Ok(suggestions)
    }
}
