//! Reconnect backoff for sync triggers.
//!
//! When connectivity returns, every open client would otherwise fire its
//! sync cycle at the same instant. The trigger scheduler waits a delay from
//! here first; exponential growth handles flaky links that bounce on and
//! off, and the jitter spreads clients out.

use std::time::Duration;

/// Calculate the delay before a connectivity-restored sync attempt.
///
/// Formula: min(30s, 2^attempt seconds) + random(0..5000ms). `attempt`
/// counts consecutive failures since the last successful cycle, starting
/// at 0 for the first retry (giving a ~1s base, the original restore delay).
pub fn reconnect_delay(attempt: u32) -> Duration {
    // Base: 2^attempt seconds, capped at 30 seconds
    let base_secs = 2u64.pow(attempt.min(5)).min(30);
    let base = Duration::from_secs(base_secs);

    let jitter = Duration::from_millis(random_jitter_ms());
    base + jitter
}

/// Generate random jitter between 0 and 5000 milliseconds.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).expect("getrandom failed");
    let random = u64::from_le_bytes(bytes);
    random % 5001 // 0..5000 inclusive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt() {
        let d0 = reconnect_delay(0);
        let d3 = reconnect_delay(3);

        assert!(d0 >= Duration::from_secs(1));
        assert!(d3 >= Duration::from_secs(8));
    }

    #[test]
    fn delay_capped_at_30_seconds_plus_jitter() {
        let delay = reconnect_delay(10);

        // Max possible: 30s base + 5s jitter = 35s
        assert!(
            delay <= Duration::from_secs(35),
            "reconnect delay must be capped at ~35s, got {:?}",
            delay
        );
    }

    #[test]
    fn jitter_creates_variance() {
        let mut delays: Vec<Duration> = Vec::new();
        for _ in 0..20 {
            delays.push(reconnect_delay(3));
        }

        let min = delays.iter().min().unwrap();
        let max = delays.iter().max().unwrap();

        // Probabilistic: 20 samples over 5001 jitter values collide on a
        // narrow band only with vanishing likelihood.
        assert!(
            max.as_millis() - min.as_millis() >= 100,
            "expected jitter variance, got min={:?} max={:?}",
            min,
            max
        );
    }
}
