//! Long-lived worker threads with cooperative cancellation.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct StopInner {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

/// Cancellation flag shared between a worker and whoever owns it.
///
/// Workers poll it once per iteration and use `wait_timeout` for their
/// inter-iteration sleeps so a stop request cuts the sleep short.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Sleep for up to `timeout`. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            let _ = self.inner.cond.wait_for(&mut cancelled, timeout);
        }
        *cancelled
    }
}

/// A named thread plus the means to stop it and wait for it.
pub struct Worker {
    name: String,
    stop: StopToken,
    finished: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new named thread. The body receives the worker's
    /// stop token and is expected to return soon after it is cancelled.
    pub fn spawn<B>(name: &str, body: B) -> std::io::Result<Self>
    where
        B: FnOnce(StopToken) + Send + 'static,
    {
        let stop = StopToken::new();
        let (done_tx, finished) = bounded::<()>(1);

        let token = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(token);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            name: name.to_string(),
            stop,
            finished,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Whether the body has returned (or panicked).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Cancel the worker and wait up to `timeout` for it to exit.
    ///
    /// Returns `false` if the thread did not exit in time; it is then
    /// detached and left to finish on its own.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.stop.cancel();

        match self.finished.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!("{} thread panicked", self.name);
                    }
                }
                info!("{} thread stopped", self.name);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} thread did not stop within {:.1}s, detaching",
                    self.name,
                    timeout.as_secs_f64()
                );
                self.handle.take();
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Dropping without `stop` still asks the thread to wind down.
        self.stop.cancel();
    }
}
