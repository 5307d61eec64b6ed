//! Fixed-interval automatic backups on a background thread

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use super::orchestrator::Inner;

/// Handle to a running schedule; stopping it joins the thread
pub(crate) struct AutoBackupSchedule {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AutoBackupSchedule {
    /// Spawn the schedule thread; the first run happens one `interval` from now
    pub(crate) fn spawn(inner: Arc<Inner>, interval: Duration) -> io::Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("auto-backup".into())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(cancel_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let run = panic::catch_unwind(AssertUnwindSafe(|| inner.perform_auto_backup()));
                            match run {
                                Ok(count) => tracing::debug!(count, "scheduled backup pass finished"),
                                Err(_) => tracing::error!("scheduled backup pass panicked, schedule continues"),
                            }
                        }
                    }
                }
                tracing::debug!("auto-backup thread exiting");
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Cancel future ticks and wait for an in-flight pass to finish
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel, which also wakes the thread
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("auto-backup thread panicked");
            }
        }
    }
}

impl Drop for AutoBackupSchedule {
    fn drop(&mut self) {
        self.shutdown();
    }
}
