use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analytics_service::config::Config;
use analytics_service::services::billing::BillingClient;
use analytics_service::services::{AnalyticsService, CrossServiceRouter};
use event_schema::SchemaRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,analytics_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let schemas = Arc::new(SchemaRegistry::with_default_schemas());
    let billing = Arc::new(BillingClient::new(&config.billing.base_url));
    let analytics = Arc::new(AnalyticsService::new(schemas, billing));
    info!(
        billing_url = %config.billing.base_url,
        "analytics service ready"
    );

    let router = if config.kafka.is_enabled() {
        let router = CrossServiceRouter::new(&config.kafka.brokers, config.kafka.topics.clone());
        router.start().await?;
        info!(
            brokers = %config.kafka.brokers,
            topics = ?config.kafka.topics,
            "analytics event router started"
        );
        Some(router)
    } else {
        warn!("kafka brokers or topics not configured, event router disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if let Some(router) = router {
        router.stop().await;
    }
    info!(events_stored = analytics.event_count(), "analytics service stopped");

    Ok(())
}
