use serde::{Deserialize, Serialize};

/// Root application configuration. Loaded from environment variables
/// with the prefix `AFFILIATE_FLOW__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub scout: ScoutConfig,
    #[serde(default)]
    pub outreach: OutreachConfig,
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Bounds on a single engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: u32,
    #[serde(default = "default_max_stage_retries")]
    pub max_stage_retries: u32,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_min_audience_size")]
    pub min_audience_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    #[serde(default = "default_outreach_method")]
    pub method: String,
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
    #[serde(default = "default_message_template")]
    pub message_template: String,
    #[serde(default = "default_max_outreach_per_run")]
    pub max_outreach_per_run: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionConfig {
    #[serde(default = "default_commission_rate")]
    pub default_rate: f64,
    #[serde(default = "default_performance_tiers")]
    pub performance_tiers: Vec<CommissionTier>,
    #[serde(default = "default_payment_threshold")]
    pub payment_threshold: f64,
    #[serde(default = "default_auto_approve")]
    pub auto_approve_commissions: bool,
}

/// Volume-based bonus tier applied on top of the default commission rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionTier {
    pub threshold: u32,
    pub bonus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_minimum_payment")]
    pub minimum_payment: f64,
    #[serde(default = "default_batch_payments")]
    pub batch_payments: bool,
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_analysis_period_days")]
    pub analysis_period_days: u32,
    #[serde(default = "default_low_conversion_rate")]
    pub low_conversion_rate: f64,
    #[serde(default = "default_top_affiliate_count")]
    pub top_affiliate_count: usize,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_steps_per_run() -> u32 {
    24
}
fn default_max_stage_retries() -> u32 {
    2
}
fn default_run_timeout_secs() -> u64 {
    300
}
fn default_platforms() -> Vec<String> {
    vec![
        "youtube".to_string(),
        "twitter".to_string(),
        "linkedin".to_string(),
        "instagram".to_string(),
    ]
}
fn default_keywords() -> Vec<String> {
    vec![
        "AI tools".to_string(),
        "SaaS review".to_string(),
        "machine learning".to_string(),
        "productivity tools".to_string(),
    ]
}
fn default_min_audience_size() -> u64 {
    1000
}
fn default_outreach_method() -> String {
    "email".to_string()
}
fn default_subject_template() -> String {
    "Collaboration Opportunity: {LEAD_NAME} x Our Brand".to_string()
}
fn default_message_template() -> String {
    "Hi {LEAD_NAME}, I noticed your impressive content on {LEAD_PLATFORM} and \
     believe our audience would love your perspective. We're offering a 70% \
     commission on our affiliate program. Would you be interested in learning more?"
        .to_string()
}
fn default_max_outreach_per_run() -> usize {
    10
}
fn default_commission_rate() -> f64 {
    0.7
}
fn default_performance_tiers() -> Vec<CommissionTier> {
    vec![
        CommissionTier {
            threshold: 10,
            bonus: 0.05,
        },
        CommissionTier {
            threshold: 25,
            bonus: 0.10,
        },
        CommissionTier {
            threshold: 50,
            bonus: 0.15,
        },
    ]
}
fn default_payment_threshold() -> f64 {
    50.0
}
fn default_auto_approve() -> bool {
    true
}
fn default_minimum_payment() -> f64 {
    50.0
}
fn default_batch_payments() -> bool {
    true
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_analysis_period_days() -> u32 {
    30
}
fn default_low_conversion_rate() -> f64 {
    0.05
}
fn default_top_affiliate_count() -> usize {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps_per_run(),
            max_stage_retries: default_max_stage_retries(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            platforms: default_platforms(),
            keywords: default_keywords(),
            min_audience_size: default_min_audience_size(),
        }
    }
}

impl Default for OutreachConfig {
    fn default() -> Self {
        Self {
            method: default_outreach_method(),
            subject_template: default_subject_template(),
            message_template: default_message_template(),
            max_outreach_per_run: default_max_outreach_per_run(),
        }
    }
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_rate: default_commission_rate(),
            performance_tiers: default_performance_tiers(),
            payment_threshold: default_payment_threshold(),
            auto_approve_commissions: default_auto_approve(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            minimum_payment: default_minimum_payment(),
            batch_payments: default_batch_payments(),
            default_currency: default_currency(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            analysis_period_days: default_analysis_period_days(),
            low_conversion_rate: default_low_conversion_rate(),
            top_affiliate_count: default_top_affiliate_count(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            workflow: WorkflowConfig::default(),
            scout: ScoutConfig::default(),
            outreach: OutreachConfig::default(),
            commission: CommissionConfig::default(),
            payment: PaymentConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("AFFILIATE_FLOW")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
