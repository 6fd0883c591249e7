use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const CURRENCY_USD: &str = "USD";

/// A tracked analytics event, immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub event_type: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub api_key: String,
    pub billing_event_id: String,
    pub source: String,
}

/// Monetary charge attached to a user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl BillingEvent {
    pub fn new(user_id: &str, event_type: &str, amount: f64, description: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            amount,
            currency: CURRENCY_USD.to_string(),
            timestamp: Utc::now(),
            description: description.to_string(),
        }
    }
}

/// Per-user usage over a query window, computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub user_id: String,
    pub total_events: u64,
    pub events_by_type: std::collections::HashMap<String, u64>,
    pub billing_summary: BillingSummary,
    pub period: UsagePeriod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSummary {
    pub total_cost: f64,
    pub cost_breakdown: std::collections::HashMap<String, f64>,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}
