//! Shutdown signaling for extraction runs.
//!
//! A run holds a [`ShutdownRx`] and stops scheduling new chunks once a shutdown was requested.
//! Requests already in flight are allowed to complete.

use tokio::sync::watch;

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<bool>;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests a shutdown of every run subscribed to this channel.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Returns a new receiver for this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a shutdown channel in the not-requested state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), rx)
}

/// Returns `true` once a shutdown was requested on the channel of `rx`.
pub fn is_shutdown_requested(rx: &ShutdownRx) -> bool {
    *rx.borrow()
}
