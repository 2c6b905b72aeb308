//! Background worker threads.
//!
//! Each worker gets a [`CancelToken`]. Cancelling drops the sending half of a
//! crossbeam channel, which wakes any sleep in progress, so `stop()` returns
//! within one tick of work rather than one full interval.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::BridgeError;

/// Cancellation signal observed by a worker.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration` or until cancelled. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.is_cancelled();
        }
        matches!(self.rx.recv_timeout(duration), Err(RecvTimeoutError::Disconnected))
    }
}

/// Owner side of a [`CancelToken`].
#[derive(Debug)]
pub struct Canceller {
    tx: Option<Sender<()>>,
}

impl Canceller {
    /// Signal every token created from this canceller.
    pub fn cancel(&mut self) {
        self.tx.take();
    }
}

/// Create a linked canceller and token.
pub fn cancel_pair() -> (Canceller, CancelToken) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (Canceller { tx: Some(tx) }, CancelToken { rx })
}

/// A named background thread that can be cancelled and joined.
#[derive(Debug)]
pub struct Worker {
    name: String,
    canceller: Canceller,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new thread.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, BridgeError>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let (canceller, token) = cancel_pair();
        let handle = thread::Builder::new()
            .name(format!("nowde-{}", name))
            .spawn(move || body(token))
            .map_err(BridgeError::Spawn)?;
        debug!("Worker {} started", name);
        Ok(Worker {
            name: name.to_string(),
            canceller,
            handle: Some(handle),
        })
    }

    /// Spawn a worker that calls `tick` after every `interval()`.
    ///
    /// The interval is re-read before every sleep so it can change at runtime.
    /// The worker exits when cancelled or when `interval` returns `None`.
    pub fn periodic<I, T>(name: &str, mut interval: I, mut tick: T) -> Result<Self, BridgeError>
    where
        I: FnMut() -> Option<Duration> + Send + 'static,
        T: FnMut() + Send + 'static,
    {
        Self::spawn(name, move |token| {
            while let Some(period) = interval() {
                if token.sleep(period) {
                    break;
                }
                tick();
            }
        })
    }

    /// Cancel and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Wait for the thread to finish on its own.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Worker {} panicked", self.name);
            }
        }
    }

    fn shutdown(&mut self) {
        self.canceller.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        // A worker tearing itself down cannot join its own thread.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("Worker {} panicked", self.name);
        } else {
            debug!("Worker {} stopped", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
