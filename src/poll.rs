//! Bounded status polling
//!
//! Cloud resources settle asynchronously: a created volume reports
//! `creating` for a while, a deleted server keeps answering `GET` until the
//! backend catches up. [`wait_until`] is the one polling primitive everything
//! builds on: re-fetch, test a predicate, sleep, repeat, with a wall-clock
//! deadline rather than an attempt count so slow individual calls cannot
//! stretch the worst case.
//!
//! Fetch failures during intermediate attempts are swallowed and treated as
//! "not ready yet" to tolerate the eventual-consistency gap right after a
//! create or delete. Once the deadline elapses one final fetch runs and its
//! outcome is surfaced: the error if it fails, `Timeout` if the predicate
//! still does not hold.

use crate::error::{HarnessError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Poll `fetch` until `predicate` holds for its result.
///
/// Worst-case wall clock is `timeout` plus one `interval` plus one trailing
/// fetch; never unbounded.
pub async fn wait_until<T, F, Fut, P>(
    mut fetch: F,
    predicate: P,
    interval: Duration,
    timeout: Duration,
    what: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    loop {
        match fetch().await {
            Ok(state) if predicate(&state) => return Ok(state),
            Ok(_) => debug!("{}: not ready yet", what),
            Err(e) => debug!("{}: fetch failed, treating as not ready: {}", what, e),
        }

        if start.elapsed() >= timeout {
            // Final attempt after the deadline surfaces whatever it sees.
            return match fetch().await {
                Ok(state) if predicate(&state) => Ok(state),
                Ok(_) => Err(HarnessError::Timeout {
                    waited: start.elapsed(),
                    reason: format!("{}: condition not met", what),
                }),
                Err(e) => Err(e),
            };
        }

        tokio::time::sleep(interval).await;
    }
}

/// Poll until `fetch` reports the resource gone (`NotFound`).
///
/// Used after a delete call to confirm the service stopped answering for the
/// id. Any other fetch error is transient until the deadline.
pub async fn wait_for_deletion<T, F, Fut>(
    mut fetch: F,
    interval: Duration,
    timeout: Duration,
    what: &str,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    loop {
        match fetch().await {
            Err(e) if e.is_not_found() => return Ok(()),
            Ok(_) => debug!("{}: still present", what),
            Err(e) => debug!("{}: fetch failed, retrying: {}", what, e),
        }

        if start.elapsed() >= timeout {
            return match fetch().await {
                Err(e) if e.is_not_found() => Ok(()),
                Ok(_) => Err(HarnessError::Timeout {
                    waited: start.elapsed(),
                    reason: format!("{}: still present after delete", what),
                }),
                Err(e) => Err(e),
            };
        }

        tokio::time::sleep(interval).await;
    }
}
