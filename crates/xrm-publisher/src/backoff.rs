//! Reconnect and retry timings: fixed delays for connection/channel
//! errors, jittered delay for publish retries.

use std::time::Duration;

use rand::Rng;

/// Delay before retrying a dropped connection.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Delay before re-initializing a channel after a channel-level error.
pub const REINIT_DELAY: Duration = Duration::from_secs(2);

/// A random delay in `[1s, 5s)`, used between failed-publish retries.
#[must_use]
pub fn jittered_retry_delay() -> Duration {
    let millis = rand::thread_rng().gen_range(1_000..5_000);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_delay_is_within_one_to_five_seconds() {
        for _ in 0..100 {
            let delay = jittered_retry_delay();
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay < Duration::from_millis(5_000));
        }
    }
}
