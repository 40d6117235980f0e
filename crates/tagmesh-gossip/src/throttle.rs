//! Per-peer token buckets for inbound statement volume.
//!
//! Each peer gets its own bucket where one token is one statement. A
//! bucket refills at `per_sec` tokens per second up to one second's worth
//! of burst. Statements beyond the available tokens are dropped, never
//! queued: the sender can offer them again on a later exchange.

use std::collections::HashMap;

use tagmesh_types::PeerId;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct Bucket {
    available: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter keyed by peer.
pub struct PeerThrottle {
    rate: f64,
    buckets: Mutex<HashMap<PeerId, Bucket>>,
}

impl PeerThrottle {
    /// Allow `per_sec` statements per second from each peer.
    pub fn new(per_sec: u64) -> Self {
        Self {
            rate: per_sec as f64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take up to `wanted` tokens from `peer`'s bucket. Returns how many
    /// were granted.
    pub async fn take(&self, peer: PeerId, wanted: usize) -> usize {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(peer).or_insert_with(|| Bucket {
            available: self.rate,
            last_refill: Instant::now(),
        });
        self.refill(bucket);

        let granted = (bucket.available.floor() as usize).min(wanted);
        bucket.available -= granted as f64;
        if granted < wanted {
            debug!(%peer, wanted, granted, "throttle: peer over statement budget");
        }
        granted
    }

    /// Configured statements per second.
    pub fn rate(&self) -> u64 {
        self.rate as u64
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.available = (bucket.available + elapsed * self.rate).min(self.rate);
            bucket.last_refill = now;
        }
    }
}
