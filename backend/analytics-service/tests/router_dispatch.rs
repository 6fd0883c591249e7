use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use analytics_service::error::{AnalyticsError, Result};
use analytics_service::services::router::{handler, CrossServiceRouter, SourceFactory, TopicSource};
use event_schema::CrossServiceEvent;

// Channel-backed source so routing is testable without a broker.
struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl TopicSource for ChannelSource {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| AnalyticsError::Internal("source closed".to_string()))
    }
}

#[derive(Clone, Default)]
struct ChannelFactory {
    senders: Arc<Mutex<HashMap<String, mpsc::Sender<Vec<u8>>>>>,
}

impl ChannelFactory {
    fn sender(&self, topic: &str) -> mpsc::Sender<Vec<u8>> {
        self.senders.lock().unwrap()[topic].clone()
    }
}

impl SourceFactory for ChannelFactory {
    fn create(&self, topic: &str) -> Result<Box<dyn TopicSource>> {
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().insert(topic.to_string(), tx);
        Ok(Box::new(ChannelSource { rx }))
    }
}

fn envelope(event_type: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "source": "auth-service",
        "event_type": event_type,
        "user_id": "u1",
        "data": {}
    }))
    .unwrap()
}

// Registers a handler that forwards every received event to a channel.
async fn capture(router: &CrossServiceRouter, event_type: &str) -> mpsc::Receiver<CrossServiceEvent> {
    let (tx, rx) = mpsc::channel(16);
    router
        .register_handler(
            event_type,
            handler(move |event| {
                let tx = tx.clone();
                async move {
                    tx.send(event)
                        .await
                        .map_err(|e| AnalyticsError::Handler(e.to_string()))
                }
            }),
        )
        .await;
    rx
}

#[tokio::test]
async fn test_login_event_routes_to_registered_handler() {
    let factory = ChannelFactory::default();
    let router = CrossServiceRouter::with_source_factory(
        Box::new(factory.clone()),
        vec!["auth-events".to_string()],
    );
    let mut captured = capture(&router, "auth.user.login").await;

    router.start().await.unwrap();
    factory
        .sender("auth-events")
        .send(envelope("auth.user.login"))
        .await
        .unwrap();

    let event = timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "auth.user.login");
    assert_eq!(event.user_id, "u1");

    router.stop().await;
}

#[tokio::test]
async fn test_unregistered_type_is_dropped() {
    let factory = ChannelFactory::default();
    let router = CrossServiceRouter::with_source_factory(
        Box::new(factory.clone()),
        vec!["misc-events".to_string()],
    );
    let mut captured = capture(&router, "auth.user.login").await;

    router.start().await.unwrap();
    let sender = factory.sender("misc-events");
    sender.send(envelope("inventory.sku.retired")).await.unwrap();
    sender.send(envelope("auth.user.login")).await.unwrap();

    // The unknown type never reaches any handler; the loop keeps going
    let event = timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "auth.user.login");

    router.stop().await;
}

#[tokio::test]
async fn test_malformed_payload_does_not_stall_the_loop() {
    let factory = ChannelFactory::default();
    let router = CrossServiceRouter::with_source_factory(
        Box::new(factory.clone()),
        vec!["auth-events".to_string()],
    );
    let mut captured = capture(&router, "auth.user.login").await;

    router.start().await.unwrap();
    let sender = factory.sender("auth-events");
    sender.send(b"{not json".to_vec()).await.unwrap();
    sender.send(envelope("auth.user.login")).await.unwrap();

    let event = timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "auth.user.login");

    router.stop().await;
}

#[tokio::test]
async fn test_missing_correlation_id_is_assigned() {
    let router = CrossServiceRouter::with_source_factory(
        Box::new(ChannelFactory::default()),
        vec![],
    );
    let mut captured = capture(&router, "auth.user.login").await;

    router.dispatch("auth-events", &envelope("auth.user.login")).await;

    let event = timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.correlation_id.is_some());
}

#[tokio::test]
async fn test_supplied_correlation_id_is_preserved() {
    let router = CrossServiceRouter::with_source_factory(
        Box::new(ChannelFactory::default()),
        vec![],
    );
    let mut captured = capture(&router, "auth.user.login").await;

    let payload = serde_json::to_vec(&json!({
        "source": "auth-service",
        "event_type": "auth.user.login",
        "user_id": "u1",
        "data": {},
        "correlation_id": "corr-42"
    }))
    .unwrap();
    router.dispatch("auth-events", &payload).await;

    let event = timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.correlation_id.as_deref(), Some("corr-42"));
}

#[tokio::test]
async fn test_handler_error_does_not_break_dispatch() {
    let factory = ChannelFactory::default();
    let router = CrossServiceRouter::with_source_factory(
        Box::new(factory.clone()),
        vec!["auth-events".to_string()],
    );
    router
        .register_handler(
            "auth.user.logout",
            handler(|_| async { Err(AnalyticsError::Handler("boom".to_string())) }),
        )
        .await;
    let mut captured = capture(&router, "auth.user.login").await;

    router.start().await.unwrap();
    let sender = factory.sender("auth-events");
    sender.send(envelope("auth.user.logout")).await.unwrap();
    sender.send(envelope("auth.user.login")).await.unwrap();

    let event = timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "auth.user.login");

    router.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let router = CrossServiceRouter::with_source_factory(
        Box::new(ChannelFactory::default()),
        vec![],
    );

    router.start().await.unwrap();
    assert!(router.is_running().await);

    let err = router.start().await.unwrap_err();
    assert!(matches!(err, AnalyticsError::AlreadyRunning));

    router.stop().await;
    assert!(!router.is_running().await);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let router = CrossServiceRouter::with_source_factory(
        Box::new(ChannelFactory::default()),
        vec![],
    );

    router.stop().await;
    router.start().await.unwrap();
    router.stop().await;
    router.stop().await;

    // Stopped router can start again
    router.start().await.unwrap();
    router.stop().await;
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_handlers() {
    let factory = ChannelFactory::default();
    let router = CrossServiceRouter::with_source_factory(
        Box::new(factory.clone()),
        vec!["auth-events".to_string()],
    );

    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
    router
        .register_handler(
            "auth.user.login",
            handler(move |_| {
                let done_tx = done_tx.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    done_tx
                        .send(())
                        .await
                        .map_err(|e| AnalyticsError::Handler(e.to_string()))
                }
            }),
        )
        .await;

    router.start().await.unwrap();
    factory
        .sender("auth-events")
        .send(envelope("auth.user.login"))
        .await
        .unwrap();

    // Give the loop time to pick the message up before stopping
    tokio::time::sleep(Duration::from_millis(50)).await;
    router.stop().await;

    // The handler must already have finished by the time stop returned
    assert!(done_rx.try_recv().is_ok());
}
