//! Loader screen progress
//!
//! Progress runs linearly from 0 to 100 % over the loader duration. The
//! animation task publishes progress on a watch channel and stops early when
//! its token is cancelled (the user left the screen).

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoaderProgress {
    /// Exact progress in percent, capped at 100
    pub percent: f64,
    /// Progress shown to the user: rounded to a multiple of 5, capped at 100
    pub display: u32,
}

impl LoaderProgress {
    pub fn is_complete(&self) -> bool {
        self.percent >= 100.0
    }
}

/// Progress after `elapsed` of a loader lasting `total`
pub fn loader_progress(elapsed: Duration, total: Duration) -> LoaderProgress {
    if total.is_zero() {
        return LoaderProgress {
            percent: 100.0,
            display: 100,
        };
    }
    let raw = elapsed.as_secs_f64() / total.as_secs_f64() * 100.0;
    let display = ((raw / 5.0).round() * 5.0).min(100.0) as u32;
    LoaderProgress {
        percent: raw.min(100.0),
        display,
    }
}

/// Running loader animation
pub struct LoaderTask {
    cancel: CancellationToken,
    progress: watch::Receiver<LoaderProgress>,
    handle: Option<JoinHandle<bool>>,
    completed: bool,
}

impl LoaderTask {
    /// Start the animation on the current runtime
    pub fn spawn(total: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (tx, progress) = watch::channel(LoaderProgress::default());
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(TICK);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Loader cancelled");
                        return false;
                    }
                    _ = ticker.tick() => {
                        let current = loader_progress(started.elapsed(), total);
                        let _ = tx.send(current);
                        if current.is_complete() {
                            return true;
                        }
                    }
                }
            }
        });

        Self {
            cancel,
            progress,
            handle: Some(handle),
            completed: false,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn progress(&self) -> LoaderProgress {
        *self.progress.borrow()
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> watch::Receiver<LoaderProgress> {
        self.progress.clone()
    }

    /// Wait for the animation to end; true when it ran to completion
    pub async fn finished(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            self.completed = handle.await.unwrap_or(false);
        }
        self.completed
    }
}

impl Drop for LoaderTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
