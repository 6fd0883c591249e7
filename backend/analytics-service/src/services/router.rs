use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use event_schema::CrossServiceEvent;
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::models::BillingEvent;

/// Upper bound on concurrently running handler invocations.
const MAX_IN_FLIGHT_HANDLERS: usize = 64;

pub type EventHandler =
    Arc<dyn Fn(CrossServiceEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps an async fn into a registrable handler.
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(CrossServiceEvent) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// One stream of raw messages for a single topic.
#[async_trait]
pub trait TopicSource: Send {
    async fn recv(&mut self) -> Result<Vec<u8>>;
}

/// Creates a source per topic at router start.
pub trait SourceFactory: Send + Sync {
    fn create(&self, topic: &str) -> Result<Box<dyn TopicSource>>;
}

/// Kafka-backed source reading partition 0 from the newest offset.
///
/// No consumer group and no committed offsets; restarting the router starts
/// reading at the live end of the partition.
pub struct KafkaTopicSource {
    consumer: StreamConsumer,
}

#[async_trait]
impl TopicSource for KafkaTopicSource {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            let message = self.consumer.recv().await?;
            if let Some(payload) = message.payload() {
                return Ok(payload.to_vec());
            }
        }
    }
}

pub struct KafkaSourceFactory {
    brokers: String,
}

impl KafkaSourceFactory {
    pub fn new(brokers: &str) -> Self {
        Self {
            brokers: brokers.to_string(),
        }
    }
}

impl SourceFactory for KafkaSourceFactory {
    fn create(&self, topic: &str) -> Result<Box<dyn TopicSource>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "6000")
            .create()?;

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(topic, 0, Offset::End)?;
        consumer.assign(&assignment)?;

        Ok(Box::new(KafkaTopicSource { consumer }))
    }
}

struct RouterState {
    shutdown: Option<watch::Sender<bool>>,
    loops: Vec<JoinHandle<()>>,
}

/// Routes broker events to per-type handlers.
///
/// One consumption loop per topic; each decoded event is dispatched on its
/// own task, so handler completion order is not tied to partition order.
/// A handler failure is logged and never stalls the loop that dispatched it.
pub struct CrossServiceRouter {
    topics: Vec<String>,
    factory: Box<dyn SourceFactory>,
    handlers: Arc<RwLock<HashMap<String, EventHandler>>>,
    permits: Arc<Semaphore>,
    state: Mutex<RouterState>,
}

impl CrossServiceRouter {
    pub fn new(brokers: &str, topics: Vec<String>) -> Self {
        Self::with_source_factory(Box::new(KafkaSourceFactory::new(brokers)), topics)
    }

    pub fn with_source_factory(factory: Box<dyn SourceFactory>, topics: Vec<String>) -> Self {
        Self {
            topics,
            factory,
            handlers: Arc::new(RwLock::new(default_handlers())),
            permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT_HANDLERS)),
            state: Mutex::new(RouterState {
                shutdown: None,
                loops: Vec::new(),
            }),
        }
    }

    /// Installs or replaces the handler for an event type.
    pub async fn register_handler(&self, event_type: &str, handler: EventHandler) {
        self.handlers
            .write()
            .await
            .insert(event_type.to_string(), handler);
    }

    /// Spawns one consumption loop per topic.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.shutdown.is_some() {
            return Err(AnalyticsError::AlreadyRunning);
        }

        let (tx, rx) = watch::channel(false);
        for topic in &self.topics {
            let source = match self.factory.create(topic) {
                Ok(source) => source,
                Err(err) => {
                    warn!(topic, error = %err, "failed to open topic source, skipping");
                    continue;
                }
            };

            info!(topic, "starting consumption loop");
            state.loops.push(tokio::spawn(consume_topic(
                topic.clone(),
                source,
                rx.clone(),
                self.handlers.clone(),
                self.permits.clone(),
            )));
        }

        state.shutdown = Some(tx);
        Ok(())
    }

    /// Decodes and routes one raw message.
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) {
        dispatch_message(topic, payload, &self.handlers, &self.permits).await;
    }

    /// Stops all loops and waits for in-flight handlers to finish.
    /// Idempotent when already stopped.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(shutdown) = state.shutdown.take() else {
            return;
        };

        let _ = shutdown.send(true);
        for task in state.loops.drain(..) {
            if let Err(err) = task.await {
                error!(error = %err, "consumption loop panicked");
            }
        }

        // Taking every permit forms a barrier over outstanding handlers.
        if let Ok(all) = self
            .permits
            .clone()
            .acquire_many_owned(MAX_IN_FLIGHT_HANDLERS as u32)
            .await
        {
            drop(all);
        }

        info!("event router stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.shutdown.is_some()
    }
}

async fn consume_topic(
    topic: String,
    mut source: Box<dyn TopicSource>,
    mut shutdown: watch::Receiver<bool>,
    handlers: Arc<RwLock<HashMap<String, EventHandler>>>,
    permits: Arc<Semaphore>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(topic, "consumption loop shutting down");
                    return;
                }
            }
            received = source.recv() => {
                match received {
                    Ok(payload) => {
                        dispatch_message(&topic, &payload, &handlers, &permits).await;
                    }
                    Err(err) => {
                        warn!(topic, error = %err, "receive failed, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

async fn dispatch_message(
    topic: &str,
    payload: &[u8],
    handlers: &RwLock<HashMap<String, EventHandler>>,
    permits: &Arc<Semaphore>,
) {
    let mut event: CrossServiceEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(err) => {
            warn!(topic, error = %err, "dropping malformed message");
            return;
        }
    };

    if event.correlation_id.is_none() {
        event.correlation_id = Some(Uuid::new_v4().to_string());
    }

    let handler = match handlers.read().await.get(&event.event_type) {
        Some(handler) => handler.clone(),
        None => {
            warn!(topic, event_type = %event.event_type, "no handler registered, dropping");
            return;
        }
    };

    let Ok(permit) = permits.clone().acquire_owned().await else {
        return;
    };

    let event_type = event.event_type.clone();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(err) = handler(event).await {
            error!(event_type, error = %err, "handler failed");
        }
    });
}

fn default_handlers() -> HashMap<String, EventHandler> {
    let mut handlers: HashMap<String, EventHandler> = HashMap::new();

    for event_type in [
        "billing.user.subscription.created",
        "billing.user.subscription.updated",
        "billing.user.subscription.cancelled",
        "billing.payment.completed",
        "billing.payment.failed",
    ] {
        handlers.insert(event_type.to_string(), handler(handle_billing_event));
    }

    for event_type in [
        "auth.user.login",
        "auth.user.logout",
        "auth.user.registered",
        "auth.user.password.changed",
    ] {
        handlers.insert(event_type.to_string(), handler(handle_auth_event));
    }

    for event_type in [
        "payments.transaction.completed",
        "payments.transaction.failed",
        "payments.refund.processed",
    ] {
        handlers.insert(event_type.to_string(), handler(handle_payment_event));
    }

    for event_type in [
        "analytics.page.view",
        "analytics.user.action",
        "analytics.conversion",
    ] {
        handlers.insert(event_type.to_string(), handler(handle_analytics_event));
    }

    handlers
}

/// Builds the billing-side charge for a broker billing message, pulling
/// `amount` and `description` out of the payload data.
fn billing_event_from(event: &CrossServiceEvent) -> BillingEvent {
    let amount = event.data.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
    let description = event
        .data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    BillingEvent::new(&event.user_id, &event.event_type, amount, description)
}

async fn handle_billing_event(event: CrossServiceEvent) -> Result<()> {
    info!(
        event_type = %event.event_type,
        user_id = %event.user_id,
        correlation_id = ?event.correlation_id,
        "processing billing event"
    );

    let billing_event = billing_event_from(&event);
    info!(
        billing_event_id = %billing_event.id,
        amount = billing_event.amount,
        "created billing event"
    );

    Ok(())
}

async fn handle_auth_event(event: CrossServiceEvent) -> Result<()> {
    info!(
        event_type = %event.event_type,
        user_id = %event.user_id,
        correlation_id = ?event.correlation_id,
        "auth event received"
    );
    Ok(())
}

async fn handle_payment_event(event: CrossServiceEvent) -> Result<()> {
    info!(
        event_type = %event.event_type,
        user_id = %event.user_id,
        correlation_id = ?event.correlation_id,
        "payment event received"
    );
    Ok(())
}

async fn handle_analytics_event(event: CrossServiceEvent) -> Result<()> {
    info!(
        event_type = %event.event_type,
        user_id = %event.user_id,
        correlation_id = ?event.correlation_id,
        "analytics event received"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[test]
    fn test_billing_event_built_from_message_data() {
        let mut data = Map::new();
        data.insert("amount".to_string(), json!(29.99));
        data.insert("description".to_string(), json!("Pro plan renewal"));
        let event =
            CrossServiceEvent::new("billing", "billing.payment.completed", "user123", data);

        let billing_event = billing_event_from(&event);

        assert_eq!(billing_event.user_id, "user123");
        assert_eq!(billing_event.event_type, "billing.payment.completed");
        assert_eq!(billing_event.amount, 29.99);
        assert_eq!(billing_event.description, "Pro plan renewal");
        assert!(!billing_event.id.is_empty());
        assert_eq!(billing_event.currency, "USD");
    }

    #[test]
    fn test_billing_event_defaults_when_data_is_missing() {
        let event = CrossServiceEvent::new(
            "billing",
            "billing.user.subscription.cancelled",
            "user123",
            Map::new(),
        );

        let billing_event = billing_event_from(&event);

        assert_eq!(billing_event.amount, 0.0);
        assert!(billing_event.description.is_empty());
    }

    #[test]
    fn test_default_handler_catalogue() {
        let handlers = default_handlers();
        assert_eq!(handlers.len(), 15);
        assert!(handlers.contains_key("billing.payment.failed"));
        assert!(handlers.contains_key("auth.user.password.changed"));
        assert!(handlers.contains_key("payments.refund.processed"));
        assert!(handlers.contains_key("analytics.conversion"));
    }
}
