//! Bounded polling

use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Call `check` every `interval` until it returns `Ok(true)`.
///
/// Errors from `check` are returned immediately. If `timeout` elapses first the
/// result is `Error::Timeout`. `check` always runs at least once.
pub fn poll_until<F>(interval: Duration, timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let start = Instant::now();
    loop {
        if check()? {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(Error::Timeout(timeout.as_millis() as u64));
        }
        std::thread::sleep(interval.min(timeout - elapsed));
    }
}
