//! Deadline-bounded polling
//!
//! `poll_until_deadline` runs a probe once per interval until it reports
//! `Probe::Ready` or the deadline passes. Probe errors end the loop at once.
//! The wait itself has no cancellation input; dropping the returned future
//! is the only way to abandon it early.

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Interval between two probes of a polling wait.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T, P> {
    Ready(T),
    /// Not there yet; the payload describes what was observed.
    Pending(P),
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollError<E, P> {
    Probe(E),
    Expired { elapsed: Duration, last: P },
}

pub async fn poll_until_deadline<T, P, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, PollError<E, P>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T, P>, E>>,
{
    let started = Instant::now();
    // A timeout too large to represent never expires.
    let deadline = started.checked_add(timeout);

    loop {
        match probe().await.map_err(PollError::Probe)? {
            Probe::Ready(value) => return Ok(value),
            Probe::Pending(last) => {
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(PollError::Expired {
                        elapsed: started.elapsed(),
                        last,
                    });
                }
            }
        }
        time::sleep(interval).await;
    }
}
