// Per-endpoint token buckets
//
// One bucket per endpoint id, created for a single run and dropped with it.
// Workers share the buckets; governor's limiter state is atomic, so acquire
// needs no extra locking.

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Endpoint, RateLimit};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Slowest replenish period accepted for a bucket
const MAX_PERIOD: Duration = Duration::from_secs(86_400);

#[derive(Default)]
pub struct EndpointBuckets {
    buckets: HashMap<String, Arc<DirectLimiter>>,
}

impl EndpointBuckets {
    pub fn for_endpoints<'a>(endpoints: impl IntoIterator<Item = &'a Endpoint>) -> Self {
        let mut buckets = HashMap::new();
        for endpoint in endpoints {
            buckets
                .entry(endpoint.id.clone())
                .or_insert_with(|| Arc::new(RateLimiter::direct(quota(&endpoint.rate_limit))));
        }
        Self { buckets }
    }

    /// Wait up to `wait` for a token. Returns false when none became
    /// available in time. Unknown endpoints are not limited.
    pub async fn acquire(&self, endpoint_id: &str, wait: Duration) -> bool {
        let Some(bucket) = self.buckets.get(endpoint_id) else {
            return true;
        };

        if bucket.check().is_ok() {
            return true;
        }

        tokio::time::timeout(wait, bucket.until_ready()).await.is_ok()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn quota(rate: &RateLimit) -> Quota {
    let burst = NonZeroU32::new(rate.burst).unwrap_or(NonZeroU32::MIN);
    let period = Duration::try_from_secs_f64(1.0 / rate.requests_per_second)
        .unwrap_or(MAX_PERIOD)
        .min(MAX_PERIOD);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
        .allow_burst(burst)
}
