use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use event_schema::SchemaRegistry;

use crate::error::{AnalyticsError, Result};
use crate::models::{
    new_event_id, AnalyticsEvent, BillingEvent, BillingSummary, UsagePeriod, UsageSummary,
    CURRENCY_USD,
};
use crate::services::billing::{cost_of, BillingClient, EVENTS_ENDPOINT};

/// Per-event cost by event type, `other` rate for everything else.
fn price_of(event_type: &str) -> f64 {
    match event_type {
        "page_view" => 0.001,
        "click" => 0.002,
        "conversion" => 0.01,
        _ => 0.0005,
    }
}

/// Core event tracking and usage aggregation.
///
/// Events live in an in-memory map for the lifetime of the process; there is
/// no eviction. Billing correlation is best-effort on the tracking path: a
/// billing failure is logged and the event is stored anyway, with a fresh
/// billing event id so every stored event carries one.
pub struct AnalyticsService {
    events: DashMap<String, AnalyticsEvent>,
    schemas: Arc<SchemaRegistry>,
    billing: Arc<BillingClient>,
}

impl AnalyticsService {
    pub fn new(schemas: Arc<SchemaRegistry>, billing: Arc<BillingClient>) -> Self {
        Self {
            events: DashMap::new(),
            schemas,
            billing,
        }
    }

    /// Validates, enriches, correlates and stores one event.
    pub async fn track_event(
        &self,
        mut event_data: Map<String, Value>,
        api_key: &str,
        user_id: &str,
    ) -> Result<AnalyticsEvent> {
        self.schemas.validate(&event_data)?;

        enrich_event_data(&mut event_data);

        let event_type = event_data
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Err(err) = self
            .billing
            .track_api_call(user_id, EVENTS_ENDPOINT, Map::new())
            .await
        {
            warn!(user_id, error = %err, "billing correlation failed, storing event anyway");
        }

        // Enrichment guarantees a source is present; caller values win
        let source = event_data
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("api")
            .to_string();

        let event = AnalyticsEvent {
            id: new_event_id(),
            event_type: event_type.clone(),
            user_id: user_id.to_string(),
            page: event_data
                .get("page")
                .and_then(Value::as_str)
                .map(str::to_string),
            timestamp: Utc::now(),
            properties: event_data,
            api_key: api_key.to_string(),
            billing_event_id: new_event_id(),
            source,
        };

        self.events.insert(event.id.clone(), event.clone());
        info!(event_id = %event.id, event_type, user_id, "event tracked");

        Ok(event)
    }

    /// Aggregates a user's events over `[start, end + 24h)`.
    ///
    /// The end bound is pushed forward one day so a date-only bound covers
    /// the whole final day.
    pub fn get_usage(&self, user_id: &str, start_date: &str, end_date: &str) -> Result<UsageSummary> {
        let start = parse_date_bound(start_date)?;
        let end = parse_date_bound(end_date)? + Duration::hours(24);

        let mut events_by_type: HashMap<String, u64> = HashMap::new();
        let mut total_events = 0u64;

        for entry in self.events.iter() {
            let event = entry.value();
            if event.user_id == user_id && event.timestamp >= start && event.timestamp < end {
                total_events += 1;
                *events_by_type.entry(event.event_type.clone()).or_default() += 1;
            }
        }

        let mut cost_breakdown: HashMap<String, f64> = HashMap::new();
        let mut total_cost = 0.0;
        for (event_type, count) in &events_by_type {
            let cost = price_of(event_type) * *count as f64;
            cost_breakdown.insert(event_type.clone(), cost);
            total_cost += cost;
        }

        Ok(UsageSummary {
            user_id: user_id.to_string(),
            total_events,
            events_by_type,
            billing_summary: BillingSummary {
                total_cost,
                cost_breakdown,
                currency: CURRENCY_USD.to_string(),
            },
            period: UsagePeriod { start, end },
        })
    }

    /// Forwards one API call to billing and logs its synthesized charge.
    ///
    /// Unlike `track_event`, a billing failure here is returned to the
    /// caller; admission middleware decides what to do with it.
    pub async fn track_api_usage(
        &self,
        user_id: &str,
        endpoint: &str,
        method: &str,
        metadata: Map<String, Value>,
    ) -> Result<()> {
        let forward = self
            .billing
            .track_api_call(user_id, endpoint, metadata)
            .await;

        let charge = BillingEvent::new(
            user_id,
            "api_call",
            cost_of(endpoint, method),
            &format!("{method} {endpoint}"),
        );
        info!(
            user_id,
            endpoint,
            method,
            billing_event_id = %charge.id,
            amount = charge.amount,
            currency = %charge.currency,
            "api usage recorded"
        );

        forward
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn stored_event(&self, id: &str) -> Option<AnalyticsEvent> {
        self.events.get(id).map(|e| e.clone())
    }
}

/// Fills in context fields the caller omitted; caller values are never
/// overwritten.
fn enrich_event_data(data: &mut Map<String, Value>) {
    data.entry("timestamp".to_string())
        .or_insert_with(|| json!(Utc::now().to_rfc3339()));
    data.entry("session_id".to_string()).or_insert_with(|| {
        json!(format!(
            "sess_{}",
            &Uuid::new_v4().simple().to_string()[..8]
        ))
    });
    data.entry("ip_address".to_string())
        .or_insert_with(|| json!("127.0.0.1"));
    data.entry("user_agent".to_string())
        .or_insert_with(|| json!("Mozilla/5.0 (compatible; AnalyticsService/1.0)"));
    data.entry("source".to_string()).or_insert_with(|| json!("api"));
    data.entry("properties".to_string())
        .or_insert_with(|| json!({}));
}

/// Accepts a date-only bound or a full RFC 3339 timestamp.
fn parse_date_bound(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AnalyticsError::InvalidDateFormat(value.to_string()))
}
