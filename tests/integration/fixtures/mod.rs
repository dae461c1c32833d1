pub mod cluster;

use std::time::{Duration, Instant};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `cond` until it holds, panicking with `what` after a timeout.
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
