use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{AnalyticsError, Result};

const DEFAULT_BILLING_URL: &str = "http://localhost:8080";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Base cost per API call, before endpoint and method surcharges.
const BASE_COST: f64 = 0.0001;

pub const EVENTS_ENDPOINT: &str = "/api/v1/analytics/events";
pub const FUNNEL_COMPUTE_ENDPOINT: &str = "/api/v1/funnels/compute";
pub const HEATMAP_GENERATE_ENDPOINT: &str = "/api/v1/heatmaps/generate";

/// Usage record forwarded to the billing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub user_id: String,
    pub service: String,
    pub metric: String,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

/// Billing-side view of a chargeable event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingServiceEvent {
    pub user_id: String,
    pub service: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

/// HTTP client for the billing service.
///
/// Both endpoints expect a JSON body and answer 201 on success; anything
/// else is surfaced as a billing error to the caller.
pub struct BillingClient {
    client: reqwest::Client,
    base_url: String,
}

impl BillingClient {
    pub fn new(base_url: &str) -> Self {
        let base_url = if base_url.is_empty() {
            DEFAULT_BILLING_URL.to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };

        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn track_usage(&self, record: &UsageRecord) -> Result<()> {
        self.post("/usage", record).await
    }

    pub async fn track_event(&self, event: &BillingServiceEvent) -> Result<()> {
        self.post("/event", event).await
    }

    /// Records one API call as both a usage record and a billing event.
    /// The usage failure short-circuits the event post.
    pub async fn track_api_call(
        &self,
        user_id: &str,
        endpoint: &str,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        let mut details = Map::new();
        details.insert("endpoint".to_string(), json!(endpoint));
        details.insert("metadata".to_string(), Value::Object(metadata));

        let record = UsageRecord {
            user_id: user_id.to_string(),
            service: "analytics".to_string(),
            metric: "api_call".to_string(),
            amount: 1,
            timestamp: Utc::now(),
            details: details.clone(),
        };
        self.track_usage(&record).await?;

        let event = BillingServiceEvent {
            user_id: user_id.to_string(),
            service: "analytics".to_string(),
            event_type: "api_call".to_string(),
            timestamp: Utc::now(),
            details,
        };
        self.track_event(&event).await
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "forwarding to billing service");

        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(AnalyticsError::Billing(format!(
                "billing service returned status {} for {}",
                response.status(),
                path
            )));
        }

        Ok(())
    }
}

/// Cost of one API call: fixed base rate plus endpoint and method surcharges.
pub fn cost_of(endpoint: &str, method: &str) -> f64 {
    let mut cost = BASE_COST;

    cost += match endpoint {
        EVENTS_ENDPOINT => 0.0002,
        FUNNEL_COMPUTE_ENDPOINT => 0.001,
        HEATMAP_GENERATE_ENDPOINT => 0.002,
        _ => 0.0,
    };

    if matches!(method, "POST" | "PUT" | "DELETE") {
        cost += 0.0001;
    }

    cost
}
