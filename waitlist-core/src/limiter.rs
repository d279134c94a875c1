//! Per-client admission limiting.
//!
//! Each client key gets a token bucket that refills at a fixed rate up to a
//! burst capacity. Buckets are created lazily and evicted by [`RateLimiter::sweep`]
//! once idle, so the table only ever holds recently active clients.

use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Refill rate and burst capacity of a bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quota {
    /// Tokens regained per second
    pub rate_per_sec: f64,
    /// Bucket capacity, and thus the number of back-to-back admissions
    pub burst: u32,
}

impl Default for Quota {
    /// One request every ten seconds, bursts of ten
    fn default() -> Self {
        Self {
            rate_per_sec: 0.1,
            burst: 10,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl Bucket {
    fn full(quota: &Quota, now: Instant) -> Self {
        Self {
            tokens: f64::from(quota.burst),
            last_refill: now,
            last_access: now,
        }
    }

    fn take(&mut self, quota: &Quota, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * quota.rate_per_sec).min(f64::from(quota.burst));
        self.last_refill = now;
        self.last_access = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token buckets keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    quota: Quota,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    /// Create a limiter handing every client the same quota
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            buckets: DashMap::new(),
        }
    }

    /// The quota per client
    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Whether `key` may proceed now, consuming a token if so
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Like [`RateLimiter::allow`], as of `now`
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        // Check-and-consume happens under the entry's shard lock, so concurrent
        // callers for the same key never overspend the bucket.
        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(&self.quota, now))
            .take(&self.quota, now)
    }

    /// Evict buckets untouched for longer than `idle`, returning how many went
    pub fn sweep(&self, idle: Duration) -> usize {
        self.sweep_at(idle, Instant::now())
    }

    /// Like [`RateLimiter::sweep`], as of `now`
    pub fn sweep_at(&self, idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_access) <= idle);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of tracked clients
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no client is tracked
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Admission policy in front of the public endpoints.
#[derive(Debug)]
pub enum AdmissionLimiter {
    /// Everyone is admitted
    Unlimited,
    /// Each client draws from its own bucket
    PerClient(RateLimiter),
}

impl AdmissionLimiter {
    /// Build the per-client policy
    pub fn per_client(quota: Quota) -> Self {
        Self::PerClient(RateLimiter::new(quota))
    }

    /// Whether the client identified by `key` may proceed
    pub fn allow(&self, key: &str) -> bool {
        match self {
            Self::Unlimited => true,
            Self::PerClient(limiter) => limiter.allow(key),
        }
    }

    /// Evict idle clients, if any are tracked
    pub fn sweep(&self, idle: Duration) -> usize {
        match self {
            Self::Unlimited => 0,
            Self::PerClient(limiter) => limiter.sweep(idle),
        }
    }
}

/// Run [`AdmissionLimiter::sweep`] every `interval` until `cancel` fires.
///
/// The first sweep happens one full interval after spawning. A zero interval
/// disables sweeping; the task then only waits for `cancel`.
pub fn spawn_sweeper(
    limiter: Arc<AdmissionLimiter>,
    interval: Duration,
    idle: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if interval.is_zero() {
            tracing::warn!("admission sweeper has a zero interval, idle clients are kept");
            cancel.cancelled().await;
            return;
        }

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("admission sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = limiter.sweep(idle);
                    if evicted > 0 {
                        tracing::debug!(evicted, "swept idle admission entries");
                    }
                }
            }
        }
    })
}
