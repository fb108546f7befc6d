//! Fixed-interval poll loop.
//!
//! The loop knows nothing about history; each tick just runs the supplied
//! callback. Whether a tick actually refreshes is up to the callback (the
//! engine drops ticks while a refresh is outstanding).

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Handle to a running poll loop. Cancelling is idempotent; dropping the
/// handle cancels too.
pub struct PollerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
        self.task.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start calling `tick` every `period`, first call one period from now.
///
/// `tick` resolves to whether a refresh actually ran. A tick that fires
/// while the previous callback is still running is skipped, never queued.
pub fn spawn<F, Fut>(period: Duration, token: CancellationToken, mut tick: F) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let period = if period.is_zero() { DEFAULT_POLL_INTERVAL } else { period };
    let loop_token = token.clone();

    let task = tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                ran = tick() => {
                    if !ran {
                        tracing::trace!("Poll tick dropped");
                    }
                }
            }
        }

        tracing::debug!("Poller stopped");
    });

    PollerHandle { token, task }
}
