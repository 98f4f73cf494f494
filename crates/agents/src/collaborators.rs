//! External collaborator contracts. Every stage talks to the outside world
//! (scouting sources, outreach channels, CRM, payment rails, the scoring
//! service) through these traits; a live integration replaces a mock without
//! touching the stage handlers or the engine.
//!
//! All calls are fallible I/O: stage handlers convert any error into a
//! retryable or fatal outcome at the stage boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use affiliate_core::types::Lead;

/// An unscored prospect as returned by a scouting source.
#[derive(Debug, Clone)]
pub struct RawProspect {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub audience_size: u64,
    pub engagement_rate: f64,
    pub description: String,
    pub contact: HashMap<String, String>,
}

/// Discovers prospects on a platform for a keyword.
#[async_trait]
pub trait ScoutingSource: Send + Sync {
    async fn fetch(&self, platform: &str, keyword: &str) -> anyhow::Result<Vec<RawProspect>>;
}

/// Black-box scoring service (LLM or otherwise) producing an acquisition
/// score in [0.0, 1.0].
#[async_trait]
pub trait ProspectScorer: Send + Sync {
    async fn score(&self, prospect: &RawProspect) -> anyhow::Result<f64>;
}

/// Result of delivering one outreach message.
#[derive(Debug, Clone)]
pub struct OutreachReceipt {
    pub message_id: String,
    /// The recipient accepted on the spot; the lead converts immediately.
    pub converted: bool,
}

/// Delivers outreach messages over one channel (email, DM, ...).
#[async_trait]
pub trait OutreachChannel: Send + Sync {
    fn channel(&self) -> &str;

    /// The contact key this channel needs, e.g. "email".
    fn contact_key(&self) -> &str;

    async fn send(&self, lead: &Lead, subject: &str, body: &str)
        -> anyhow::Result<OutreachReceipt>;
}

/// Pushes lead records into the CRM of record.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn upsert_contact(&self, lead: &Lead) -> anyhow::Result<()>;
}

/// A sale attributed (or attributable) to an affiliate.
#[derive(Debug, Clone)]
pub struct SaleRecord {
    pub transaction_id: String,
    pub source: String,
    pub amount: f64,
    pub affiliate_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Source of sales records from payment processors.
#[async_trait]
pub trait SalesLedger: Send + Sync {
    async fn fetch_sales(&self) -> anyhow::Result<Vec<SaleRecord>>;
}

/// Result of a payout attempt.
#[derive(Debug, Clone)]
pub enum PayoutResult {
    Paid { transaction_id: String },
    Refused { reason: String },
}

/// Executes affiliate payouts.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn pay(
        &self,
        affiliate_id: &str,
        amount: f64,
        currency: &str,
    ) -> anyhow::Result<PayoutResult>;
}

/// Black-box generation service turning a metrics snapshot into
/// optimization suggestions.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn suggest(
        &self,
        conversion_rate: f64,
        total_commissions: f64,
        active_affiliates: usize,
    ) -> anyhow::Result<Vec<String>>;
}
