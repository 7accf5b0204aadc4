//! Hosts a cpal stream on its own thread
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream is built,
//! started and dropped on a dedicated thread while callers hold a handle
//! that can move freely between tasks.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::StreamTrait;

use crate::{Error, Result};

/// Owns the thread keeping a cpal stream alive
pub struct StreamThread {
    name: String,
    shutdown: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Build and start a stream on a new thread
    ///
    /// Blocks until the stream is playing or failed to start.
    ///
    /// # Errors
    ///
    /// Returns the build or play error reported by the stream thread
    pub fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Returns on explicit stop or when the handle is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio(format!("{name} thread exited before starting")))??;

        tracing::debug!(thread = name, "audio stream started");
        Ok(Self {
            name: name.to_string(),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the stream and join its thread
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(thread = %self.name, "audio stream thread panicked");
            } else {
                tracing::debug!(thread = %self.name, "audio stream stopped");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}
