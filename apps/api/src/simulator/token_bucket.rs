//! Fixed-window token bucket: `capacity` tokens, all restored once per period.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

#[derive(Debug)]
struct BucketState {
    available: u32,
    last_refill: Instant,
    last_refill_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_period: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub available: u32,
    pub capacity: u32,
    pub seconds_until_next_refill: f64,
    pub last_refill_at: DateTime<Utc>,
    pub refill_period_secs: f64,
}

impl TokenBucket {
    /// A full bucket with no background refill. See [`TokenBucket::start`].
    pub fn new(capacity: u32, refill_period: Duration) -> Self {
        Self {
            capacity,
            refill_period,
            state: Mutex::new(BucketState {
                available: capacity,
                last_refill: Instant::now(),
                last_refill_at: Utc::now(),
            }),
        }
    }

    /// Creates a full bucket and spawns the task that refills it every period.
    /// The task ends once the last `Arc` is dropped.
    pub fn start(capacity: u32, refill_period: Duration) -> Arc<Self> {
        let bucket = Arc::new(Self::new(capacity, refill_period));
        tokio::spawn(refill_loop(Arc::downgrade(&bucket)));
        bucket
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// Takes one token. Returns `false` when the bucket is empty.
    pub async fn consume(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.available == 0 {
            return false;
        }
        state.available -= 1;
        debug!(
            available = state.available,
            capacity = self.capacity,
            "Token consumed"
        );
        true
    }

    pub async fn status(&self) -> BucketStatus {
        let state = self.state.lock().await;
        let next_refill = state.last_refill + self.refill_period;
        BucketStatus {
            available: state.available,
            capacity: self.capacity,
            seconds_until_next_refill: next_refill
                .saturating_duration_since(Instant::now())
                .as_secs_f64(),
            last_refill_at: state.last_refill_at,
            refill_period_secs: self.refill_period.as_secs_f64(),
        }
    }

    /// Refills immediately and restarts the period from now.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.refill_locked(&mut state);
        info!(capacity = self.capacity, "Token bucket reset");
    }

    fn refill_locked(&self, state: &mut BucketState) {
        state.available = self.capacity;
        state.last_refill = Instant::now();
        state.last_refill_at = Utc::now();
    }

    async fn next_refill(&self) -> Instant {
        self.state.lock().await.last_refill + self.refill_period
    }

    /// Refills if a full period has passed since the last refill. A `reset` in
    /// the meantime pushes the deadline back, in which case nothing happens.
    async fn refill_if_due(&self) {
        let mut state = self.state.lock().await;
        if Instant::now() < state.last_refill + self.refill_period {
            return;
        }
        self.refill_locked(&mut state);
        info!(
            available = state.available,
            capacity = self.capacity,
            "Token bucket refilled"
        );
    }
}

async fn refill_loop(bucket: Weak<TokenBucket>) {
    loop {
        // Only hold a strong reference while touching the bucket.
        let deadline = match bucket.upgrade() {
            Some(bucket) => bucket.next_refill().await,
            None => return,
        };
        sleep_until(deadline).await;
        match bucket.upgrade() {
            Some(bucket) => bucket.refill_if_due().await,
            None => return,
        }
    }
}
