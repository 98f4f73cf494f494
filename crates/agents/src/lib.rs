//! Pipeline stage handlers — scout, outreach, CRM, commission, payment, and
//! performance — plus the collaborator contracts and canned-data mocks they
//! run against.

pub mod collaborators;
pub mod commission;
pub mod crm;
pub mod mock;
pub mod outreach;
pub mod payment;
pub mod performance;
pub mod scout;

use std::sync::Arc;

use affiliate_core::config::AppConfig;
use affiliate_core::stage::StageHandler;

pub use commission::CommissionHandler;
pub use crm::CrmHandler;
pub use outreach::OutreachHandler;
pub use payment::PaymentHandler;
pub use performance::PerformanceHandler;
pub use scout::ScoutHandler;

/// Wires all six stages against the mock collaborators. Production wiring
/// swaps individual collaborators for live adapters; the handlers and the
/// engine stay unchanged.
pub fn mock_handlers(config: &AppConfig) -> Vec<Arc<dyn StageHandler>> {
    vec![
        Arc::new(ScoutHandler::new(
            Arc::new(mock::MockScoutingSource),
            Arc::new(mock::MockProspectScorer),
        )),
        Arc::new(OutreachHandler::new(
            Arc::new(mock::MockEmailChannel),
            config.outreach.clone(),
        )),
        Arc::new(CrmHandler::new(Arc::new(mock::MockCrmClient::default()))),
        Arc::new(CommissionHandler::new(
            Arc::new(mock::MockSalesLedger),
            config.commission.clone(),
        )),
        Arc::new(PaymentHandler::new(
            Arc::new(mock::MockPaymentGateway::default()),
            config.payment.clone(),
        )),
        Arc::new(PerformanceHandler::new(
            Arc::new(mock::MockInsightGenerator),
            config.performance.clone(),
        )),
    ]
}
