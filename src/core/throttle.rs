use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

/// Global bytes-per-second cap shared by every running segment.
pub struct Throttle {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: NonZeroU32,
}

impl Throttle {
    /// `None` for a zero limit, i.e. unlimited.
    pub fn new(bytes_per_sec: u32) -> Option<Self> {
        let burst = NonZeroU32::new(bytes_per_sec)?;
        Some(Self { limiter: RateLimiter::direct(Quota::per_second(burst)), burst })
    }

    pub fn bytes_per_sec(&self) -> u32 {
        self.burst.get()
    }

    /// Wait until `n` bytes may pass. Chunks larger than one second's budget
    /// are split so the limiter never rejects them.
    pub async fn acquire(&self, mut n: usize) {
        while n > 0 {
            let step = n.min(self.burst.get() as usize);
            if let Some(cells) = NonZeroU32::new(step as u32) {
                // step <= burst, so capacity is always sufficient
                let _ = self.limiter.until_n_ready(cells).await;
            }
            n -= step;
        }
    }
}
