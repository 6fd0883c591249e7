pub mod analytics;
pub mod billing;
pub mod router;

pub use analytics::AnalyticsService;
pub use billing::{cost_of, BillingClient};
pub use router::{CrossServiceRouter, EventHandler, SourceFactory, TopicSource};
