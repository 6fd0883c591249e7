use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Hash buckets used to reduce the subject hash to a value in [0, 1).
const GRANULARITY: u32 = 10_000;

/// Deterministic request sampler with a per-endpoint rate in [0.0, 1.0].
///
/// The decision for a given (user, endpoint) pair hashes the pair and
/// compares the reduced value against the endpoint's rate, so the same
/// subject always receives the same decision for a fixed rate. An endpoint
/// with no configured rate samples everything; a rate explicitly set to 0.0
/// samples nothing.
pub struct RequestSampler {
    rates: DashMap<String, f64>,
}

impl RequestSampler {
    pub fn new() -> Self {
        Self {
            rates: DashMap::new(),
        }
    }

    pub fn should_sample(&self, user_id: &str, endpoint: &str) -> bool {
        let rate = self.sample_rate(endpoint);

        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }

        let digest = Sha256::digest(format!("{user_id}:{endpoint}").as_bytes());
        let bucket =
            u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) % GRANULARITY;

        f64::from(bucket) / f64::from(GRANULARITY) < rate
    }

    /// Sets the sampling rate for an endpoint, clamped to [0.0, 1.0].
    pub fn set_sample_rate(&self, endpoint: &str, rate: f64) {
        self.rates
            .insert(endpoint.to_string(), rate.clamp(0.0, 1.0));
    }

    /// Current rate for an endpoint; unconfigured endpoints report 1.0.
    pub fn sample_rate(&self, endpoint: &str) -> f64 {
        self.rates.get(endpoint).map(|r| *r).unwrap_or(1.0)
    }

    /// Applies one rate to every endpoint that already has a configured rate.
    pub fn set_global_sample_rate(&self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for mut entry in self.rates.iter_mut() {
            *entry.value_mut() = rate;
        }
    }

    /// Clears all sampling configuration.
    pub fn reset(&self) {
        self.rates.clear();
    }
}

impl Default for RequestSampler {
    fn default() -> Self {
        Self::new()
    }
}
