//! Network byte-rate limiter shared by the connections of a query
//!
//! Keeps the average receive rate since the first byte under `max_speed` by
//! sleeping the receiving task, and optionally fails once a total byte limit
//! is crossed.

use crate::error::{ReplicaError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared throttler handle, absent means "no throttling"
pub type ThrottlerPtr = Option<Arc<Throttler>>;

#[derive(Debug)]
struct ThrottlerState {
    count: u64,
    start: Option<Instant>,
}

/// Byte-rate limiter
#[derive(Debug)]
pub struct Throttler {
    /// Bytes per second, 0 = unlimited
    max_speed: u64,
    /// Total bytes allowed, 0 = unlimited
    limit: u64,
    state: Mutex<ThrottlerState>,
}

impl Throttler {
    /// Create a throttler; pass 0 to disable either bound
    pub fn new(max_speed: u64, limit: u64) -> Arc<Self> {
        Arc::new(Self {
            max_speed,
            limit,
            state: Mutex::new(ThrottlerState {
                count: 0,
                start: None,
            }),
        })
    }

    /// Throttler that only enforces an average rate
    pub fn with_max_speed(max_speed: u64) -> Arc<Self> {
        Self::new(max_speed, 0)
    }

    /// Account for `amount` received bytes, sleeping if the rate is exceeded
    pub async fn add(&self, amount: u64) -> Result<()> {
        let (count, elapsed) = {
            let mut state = self.state.lock();
            let start = *state.start.get_or_insert_with(Instant::now);
            state.count += amount;
            (state.count, start.elapsed())
        };

        if self.limit > 0 && count > self.limit {
            return Err(ReplicaError::ThrottlerLimitExceeded {
                limit: self.limit,
                amount: count,
            });
        }

        if self.max_speed > 0 {
            let desired = Duration::from_secs_f64(count as f64 / self.max_speed as f64);
            if desired > elapsed {
                let pause = desired - elapsed;
                tracing::trace!("Throttling network receive for {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        Ok(())
    }

    /// Bytes accounted so far
    pub fn total_bytes(&self) -> u64 {
        self.state.lock().count
    }

    /// Forget accumulated bytes and the start time
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.start = None;
    }
}
