use event_schema::ValidationError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("invalid event data: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error("billing service error: {0}")]
    Billing(String),

    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("consumer service is already running")]
    AlreadyRunning,

    #[error("handler error: {0}")]
    Handler(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AnalyticsError {
    fn from(err: reqwest::Error) -> Self {
        AnalyticsError::Billing(err.to_string())
    }
}
