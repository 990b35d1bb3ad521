//! Startup hardware acquisition.
//!
//! GPIO lines, the I2C bus and the serial port may be briefly unavailable
//! at boot (udev, another process releasing them).  Acquisition is retried
//! on a fixed backoff until it succeeds or shutdown is requested.

use std::fmt::Display;
use std::time::Duration;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

/// Call `open` until it succeeds, sleeping `backoff` between attempts.
/// Returns `None` if `cancel` fires first.
pub async fn acquire_with_retry<T, E, F>(
    label: &str,
    backoff: Duration,
    cancel: &CancellationToken,
    mut open: F,
) -> Option<T>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    let mut attempt = 1u32;
    loop {
        match open() {
            Ok(v) => {
                if attempt > 1 {
                    info!("hw_init: '{}' acquired after {} attempts", label, attempt);
                }
                return Some(v);
            }
            Err(e) => {
                warn!(
                    "hw_init: '{}' unavailable (attempt {}): {}, retrying in {}s",
                    label,
                    attempt,
                    e,
                    backoff.as_secs()
                );
            }
        }
        tokio::select! {
            () = cancel.cancelled() => return None,
            () = tokio::time::sleep(backoff) => {}
        }
        attempt = attempt.saturating_add(1);
    }
}
