//! Admission control for the analytics ingestion path
//!
//! Two independent, composable policies: a sliding-window rate limiter and a
//! deterministic request sampler, both keyed per user and endpoint. They are
//! constructed by the embedding layer and passed down as dependencies; there
//! is no global state here.

pub mod rate_limit;
pub mod sampler;

pub use rate_limit::RateLimiter;
pub use sampler::RequestSampler;
