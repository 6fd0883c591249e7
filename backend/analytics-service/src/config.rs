use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            kafka: KafkaConfig {
                brokers: env::var("KAFKA_BROKERS").unwrap_or_default(),
                topics: csv_env("KAFKA_TOPICS"),
            },
            billing: BillingConfig {
                base_url: env::var("BILLING_SERVICE_URL").unwrap_or_default(),
            },
        }
    }
}

impl KafkaConfig {
    /// Kafka consumption runs only when brokers and topics are both set.
    pub fn is_enabled(&self) -> bool {
        !self.brokers.is_empty() && !self.topics.is_empty()
    }
}

fn csv_env(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
