//! Elapsed-seconds tick task owned by a recording session

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

const TICK: Duration = Duration::from_secs(1);

/// Calls `on_tick` with the elapsed whole seconds, once per second
///
/// The task is aborted when the ticker is dropped.
pub struct ElapsedTicker {
    handle: JoinHandle<()>,
}

impl ElapsedTicker {
    /// Spawn the tick task on the current runtime
    pub fn start(on_tick: impl Fn(u64) + Send + 'static) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK, TICK);
            let mut elapsed = 0u64;
            loop {
                interval.tick().await;
                elapsed += 1;
                on_tick(elapsed);
            }
        });

        Self { handle }
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Render seconds as `m:ss` for the recording badge
#[must_use]
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
