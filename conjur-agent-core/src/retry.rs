use std::fmt::Display;
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::errors::{Error, Result};

/// Delay before the second attempt; doubles on every attempt after that.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

// Delay stops doubling after 64x base.
const MAX_DELAY_SHIFT: u32 = 6;

/// Poll `predicate` until it succeeds or `max_attempts` attempts have been
/// spent, sleeping with exponential backoff between attempts.
///
/// The predicate is any fallible async operation: a file-existence check, a
/// readiness probe, or a full authentication round. Its last error is
/// carried inside the returned [`Error::RetryExhausted`].
pub async fn wait_for<F, Fut, E>(predicate: F, max_attempts: usize) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: Display,
{
    wait_for_with_delay(predicate, max_attempts, BASE_DELAY).await
}

async fn wait_for_with_delay<F, Fut, E>(
    mut predicate: F,
    max_attempts: usize,
    base_delay: Duration,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: Display,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        if attempt > 1 {
            tracing::debug!(attempt, "still waiting for condition");
        }
        match predicate().await {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= max_attempts => {
                return Err(Error::RetryExhausted {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                let shift = (attempt as u32 - 1).min(MAX_DELAY_SHIFT);
                tokio::time::sleep(base_delay * (1 << shift)).await;
            }
        }
    }
}

/// Succeeds iff `path` exists and is a regular file. The canonical
/// [`wait_for`] predicate for gating startup on a file-based artifact.
pub async fn verify_file_exists(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path).await?;
    if meta.is_file() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        ))
    }
}
