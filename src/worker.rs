use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};

/// A named background thread with a shutdown channel.
///
/// The body receives the shutdown receiver and must return once it reports
/// disconnection. Dropping the worker disconnects the channel and joins the
/// thread, so nothing the body publishes can arrive after the drop returns.
pub(crate) struct Worker {
    name: String,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(shutdown_rx))
            .with_context(|| format!("spawning {name} thread"))?;
        tracing::debug!(worker = name, "worker started");
        Ok(Self {
            name: name.to_string(),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = %self.name, "worker panicked");
            } else {
                tracing::debug!(worker = %self.name, "worker stopped");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn stop_disconnects_and_joins() -> anyhow::Result<()> {
        let loops = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loops);
        let mut worker = Worker::spawn("test-worker", move |shutdown| loop {
            counter.fetch_add(1, Ordering::SeqCst);
            match shutdown.recv_timeout(Duration::from_millis(5)) {
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                _ => break,
            }
        })?;
        std::thread::sleep(Duration::from_millis(20));
        worker.stop();
        let after_stop = loops.load(Ordering::SeqCst);
        assert!(after_stop >= 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(loops.load(Ordering::SeqCst), after_stop);
        Ok(())
    }
}
