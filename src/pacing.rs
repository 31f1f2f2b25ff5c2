//! Issuance pacing and concurrency bounds.
//!
//! Two independent gates sit in front of every dispatch: the
//! `RateScheduler` spaces attempts at the target rate, and the
//! `ConcurrencyLimiter` caps how many are in flight at once. Effective
//! throughput is whichever gate is tighter; the limiter is never exceeded
//! to hit the target rate.

use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration, Instant};

/// Slot spacing cap: vanishingly small rates must not push slot
/// arithmetic past the `Instant` range.
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Paces permits at fixed inter-arrival spacing.
///
/// Slots are absolute instants spaced `1 / target_rps` apart. Using
/// absolute deadlines (sleep_until) instead of relative sleeps eliminates
/// truncation error and self-corrects for timer overshoot. While the
/// consumer is stalled, unclaimed slots accumulate up to `burst` permits,
/// so catch-up after a stall is bounded rather than an unlimited surge.
///
/// A target rate of zero (or anything non-positive) disables pacing:
/// `acquire` returns immediately.
pub struct RateScheduler {
    /// Spacing between slots; None when pacing is disabled.
    interval: Option<Duration>,

    /// Maximum number of slots that may pile up while unclaimed.
    burst: u32,

    /// The next unclaimed slot.
    next_slot: Mutex<Instant>,

    /// Fallback floor for slot times near scheduler creation.
    anchor: Instant,
}

impl RateScheduler {
    /// Create a scheduler for the given target rate.
    ///
    /// # Arguments
    /// * `target_rps` - Target permits per second; `0.0` means unbounded
    /// * `burst` - Upper bound on accumulated unclaimed permits
    pub fn new(target_rps: f64, burst: usize) -> Self {
        let interval = if target_rps > 0.0 && target_rps.is_finite() {
            let spacing = Duration::try_from_secs_f64(1.0 / target_rps)
                .map(|d| d.min(MAX_INTERVAL))
                .unwrap_or(MAX_INTERVAL);
            Some(spacing)
        } else {
            None
        };

        let now = Instant::now();
        Self {
            interval,
            burst: burst.min(u32::MAX as usize).max(1) as u32,
            next_slot: Mutex::new(now),
            anchor: now,
        }
    }

    /// Wait for the next issuance slot.
    ///
    /// Returns immediately when pacing is disabled or an accumulated slot
    /// is available; otherwise sleeps until the slot's absolute deadline.
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let deadline = {
            let mut next = self.next_slot.lock().unwrap();
            let now = Instant::now();

            // Slots older than `burst` intervals are forfeited, which caps
            // how many permits a stalled consumer can claim at once.
            let floor = now
                .checked_sub(interval.saturating_mul(self.burst - 1))
                .unwrap_or(self.anchor);

            let slot = (*next).max(floor);
            *next = slot + interval;
            slot
        };

        time::sleep_until(deadline).await;
    }

    /// Whether this scheduler actually paces, or passes everything through.
    pub fn is_unbounded(&self) -> bool {
        self.interval.is_none()
    }
}

/// Fixed-capacity pool of in-flight permits.
///
/// A permit is held from dispatch to completion; dropping the guard
/// releases it unconditionally, whatever the attempt's outcome. The number
/// of outstanding permits never exceeds the capacity.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter with the given capacity. Capacity must be at least
    /// one; `TestConfig` validation enforces this before a run starts.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for an in-flight permit. The permit is released when the
    /// returned guard drops.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("concurrency semaphore closed")
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
