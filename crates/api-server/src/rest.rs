//! REST handlers for the campaign control surface: create/inspect/run
//! campaigns, browse leads and commissions, queue outreach targets.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use affiliate_core::error::{ErrorDescriptor, FlowError};
use affiliate_core::types::{
    Commission, CommissionStatus, CurrentTask, Lead, LeadStatus, PerformanceReport,
};
use affiliate_engine::registry::{CampaignConfig, CampaignDescriptor, CampaignSummary};
use affiliate_engine::{CampaignRegistry, RunSummary, WorkflowEngine};

/// Maximum string field length (campaign id, name, lead ids).
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CampaignRegistry>,
    pub engine: Arc<WorkflowEngine>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: &str) -> ApiError {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: message.to_string(),
        }),
    )
}

/// Maps registry/engine errors onto the HTTP surface.
fn flow_error(err: FlowError) -> ApiError {
    let (status, code) = match &err {
        FlowError::NotFound(_) => (StatusCode::NOT_FOUND, "campaign_not_found"),
        FlowError::AlreadyExists(_) => (StatusCode::CONFLICT, "campaign_exists"),
        FlowError::AlreadyRunning(_) => (StatusCode::CONFLICT, "campaign_running"),
        _ => {
            error!(error = %err, "Control surface operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

/// Parses a snake_case status filter using the enum's serde names.
fn parse_status<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

// ---------------------------------------------------------------------------
// Campaign lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    /// Explicit id; generated when absent.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub targeting: Option<affiliate_core::config::ScoutConfig>,
}

#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub id: String,
    pub descriptor: CampaignDescriptor,
}

/// POST /campaigns
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), ApiError> {
    if request.name.is_empty() {
        return Err(bad_request("campaign 'name' must not be empty"));
    }
    if request.name.len() > MAX_FIELD_LEN {
        return Err(bad_request("campaign 'name' exceeds maximum length"));
    }
    let id = request
        .id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if id.is_empty() || id.len() > MAX_FIELD_LEN {
        return Err(bad_request("campaign 'id' must be 1-256 characters"));
    }

    state
        .registry
        .create(
            &id,
            CampaignConfig {
                name: request.name,
                description: request.description,
                targeting: request.targeting,
            },
        )
        .map_err(flow_error)?;

    let descriptor = state.registry.descriptor(&id).map_err(flow_error)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateCampaignResponse { id, descriptor }),
    ))
}

/// GET /campaigns
pub async fn list_campaigns(State(state): State<AppState>) -> Json<Vec<CampaignSummary>> {
    Json(state.registry.list())
}

/// GET /campaigns/{id}
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignDescriptor>, ApiError> {
    state.registry.descriptor(&id).map(Json).map_err(flow_error)
}

/// POST /campaigns/{id}/run — executes one full cycle and returns the final
/// run summary. Rejected with 409 while a run is in flight.
pub async fn run_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunSummary>, ApiError> {
    metrics::counter!("api.run_requests").increment(1);
    state
        .engine
        .run(&id, CancellationToken::new())
        .await
        .map(Json)
        .map_err(flow_error)
}

// ---------------------------------------------------------------------------
// Campaign inspection
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct LeadStatusCounts {
    pub discovered: usize,
    pub contacted: usize,
    pub converted: usize,
    pub rejected: usize,
}

#[derive(Debug, Serialize)]
pub struct CommissionStatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub paid: usize,
    pub rejected: usize,
}

#[derive(Debug, Serialize)]
pub struct CampaignStatusResponse {
    pub campaign_id: String,
    pub current_task: CurrentTask,
    pub step_count: u32,
    pub last_error: Option<ErrorDescriptor>,
    pub running: bool,
    pub prospects: LeadStatusCounts,
    pub affiliates: usize,
    pub commissions: CommissionStatusCounts,
    pub crm_sync_status: Option<String>,
    pub performance_report: Option<PerformanceReport>,
}

/// GET /campaigns/{id}/status
pub async fn campaign_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignStatusResponse>, ApiError> {
    let campaign = state.registry.get(&id).map_err(flow_error)?;

    Ok(Json(CampaignStatusResponse {
        campaign_id: id.clone(),
        current_task: campaign.current_task,
        step_count: campaign.step_count,
        last_error: campaign.last_error.clone(),
        running: state.registry.is_running(&id),
        prospects: LeadStatusCounts {
            discovered: campaign.prospect_count(LeadStatus::Discovered),
            contacted: campaign.prospect_count(LeadStatus::Contacted),
            converted: campaign.prospect_count(LeadStatus::Converted),
            rejected: campaign.prospect_count(LeadStatus::Rejected),
        },
        affiliates: campaign.affiliates.len(),
        commissions: CommissionStatusCounts {
            pending: campaign.commission_count(CommissionStatus::Pending),
            approved: campaign.commission_count(CommissionStatus::Approved),
            paid: campaign.commission_count(CommissionStatus::Paid),
            rejected: campaign.commission_count(CommissionStatus::Rejected),
        },
        crm_sync_status: campaign.crm_sync_status.clone(),
        performance_report: campaign.performance_report.clone(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadQuery {
    pub status: Option<String>,
    pub platform: Option<String>,
    pub min_audience: Option<u64>,
    pub search: Option<String>,
}

/// GET /campaigns/{id}/leads
pub async fn list_leads(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LeadQuery>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let campaign = state.registry.get(&id).map_err(flow_error)?;

    let status_filter = match &query.status {
        Some(raw) => Some(
            parse_status::<LeadStatus>(raw)
                .ok_or_else(|| bad_request("unknown lead status filter"))?,
        ),
        None => None,
    };

    let leads = campaign
        .prospects
        .into_iter()
        .filter(|l| status_filter.map_or(true, |s| l.status == s))
        .filter(|l| {
            query
                .platform
                .as_deref()
                .map_or(true, |p| l.platform.eq_ignore_ascii_case(p))
        })
        .filter(|l| query.min_audience.map_or(true, |m| l.audience_size >= m))
        .filter(|l| {
            query.search.as_deref().map_or(true, |needle| {
                let needle = needle.to_lowercase();
                l.name.to_lowercase().contains(&needle)
                    || l.notes
                        .as_deref()
                        .map(|n| n.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
        })
        .collect();

    Ok(Json(leads))
}

/// GET /campaigns/{id}/affiliates
pub async fn list_affiliates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let campaign = state.registry.get(&id).map_err(flow_error)?;
    Ok(Json(campaign.affiliates))
}

#[derive(Debug, Default, Deserialize)]
pub struct CommissionQuery {
    pub status: Option<String>,
}

/// GET /campaigns/{id}/commissions
pub async fn list_commissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CommissionQuery>,
) -> Result<Json<Vec<Commission>>, ApiError> {
    let campaign = state.registry.get(&id).map_err(flow_error)?;

    let status_filter = match &query.status {
        Some(raw) => Some(
            parse_status::<CommissionStatus>(raw)
                .ok_or_else(|| bad_request("unknown commission status filter"))?,
        ),
        None => None,
    };

    let commissions = campaign
        .commissions
        .into_iter()
        .filter(|c| status_filter.map_or(true, |s| c.status == s))
        .collect();
    Ok(Json(commissions))
}

// ---------------------------------------------------------------------------
// Outreach targeting
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct OutreachTargetRequest {
    pub lead_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OutreachTargetResponse {
    pub queued: Vec<String>,
    pub unknown: Vec<String>,
}

/// POST /campaigns/{id}/outreach — queues specific leads for the next
/// outreach pass. Rejected while a run is in flight so the manual edit
/// cannot race the engine's snapshots.
pub async fn queue_outreach_targets(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<OutreachTargetRequest>,
) -> Result<Json<OutreachTargetResponse>, ApiError> {
    if request.lead_ids.is_empty() {
        return Err(bad_request("'lead_ids' must not be empty"));
    }
    if request.lead_ids.iter().any(|l| l.len() > MAX_FIELD_LEN) {
        return Err(bad_request("lead id exceeds maximum length"));
    }

    if state.registry.is_running(&id) {
        return Err(flow_error(FlowError::AlreadyRunning(id)));
    }

    let mut campaign = state.registry.get(&id).map_err(flow_error)?;

    let mut queued = Vec::new();
    let mut unknown = Vec::new();
    for lead_id in request.lead_ids {
        if campaign.prospect(&lead_id).is_none() {
            warn!(campaign_id = %id, lead_id = %lead_id, "Unknown outreach target");
            unknown.push(lead_id);
            continue;
        }
        if !campaign.outreach_targets.contains(&lead_id) {
            campaign.outreach_targets.push(lead_id.clone());
        }
        queued.push(lead_id);
    }

    state.registry.save(&id, campaign).map_err(flow_error)?;
    Ok(Json(OutreachTargetResponse { queued, unknown }))
}

// ---------------------------------------------------------------------------
// Operational endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
