//! Completion rate and ETA reporting.

use std::time::Duration;
use tokio::time::Instant;

pub struct Throughput {
    started: Instant,
    total: u64,
    interval: u64,
    done: u64,
}

impl Throughput {
    pub fn new(total: u64, interval: u64) -> Self {
        Self {
            started: Instant::now(),
            total,
            interval: interval.max(1),
            done: 0,
        }
    }

    /// Count one finished host and log every `interval` completions and at the end.
    pub fn record(&mut self) {
        self.done += 1;
        if self.done % self.interval == 0 || self.done == self.total {
            let elapsed = self.started.elapsed();
            let rate = rate_per_sec(self.done, elapsed);
            let eta = eta(self.done, self.total, elapsed);
            tracing::info!(
                done = self.done,
                total = self.total,
                rate_per_s = %format!("{rate:.2}"),
                eta_s = eta.map(|d| d.as_secs()),
                "progress"
            );
        }
    }
}

pub fn rate_per_sec(done: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        done as f64 / secs
    }
}

/// Projected time left at the observed rate; `None` before the first completion.
pub fn eta(done: u64, total: u64, elapsed: Duration) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    let per_host = elapsed.as_secs_f64() / done as f64;
    Some(Duration::from_secs_f64(per_host * total.saturating_sub(done) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_scales_with_remaining() {
        assert_eq!(eta(0, 10, Duration::from_secs(5)), None);
        assert_eq!(eta(5, 10, Duration::from_secs(10)), Some(Duration::from_secs(10)));
        assert_eq!(eta(10, 10, Duration::from_secs(10)), Some(Duration::ZERO));
    }

    #[test]
    fn rate_handles_zero_elapsed() {
        assert_eq!(rate_per_sec(3, Duration::ZERO), 0.0);
        assert_eq!(rate_per_sec(4, Duration::from_secs(2)), 2.0);
    }
}
