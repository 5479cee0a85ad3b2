//! Background expiry sweeper
//!
//! Periodically purges expired records so keys nobody reads again do not
//! linger on disk. Reads already hide and purge expired records on their
//! own; the sweeper only reclaims space.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};

use crate::error::Result;

use super::Store;

/// Handle to a running sweeper thread; stopping is idempotent and also
/// happens on drop
pub struct Sweeper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn(store: Arc<Store>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("flatkv-sweeper".to_string())
            .spawn(move || {
                tracing::debug!(?interval, "expiry sweeper started");
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => match store.purge_expired() {
                            Ok(0) => {}
                            Ok(purged) => tracing::debug!(purged, "expired keys swept"),
                            Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                tracing::debug!("expiry sweeper stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel, which wakes the select
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("expiry sweeper panicked");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
