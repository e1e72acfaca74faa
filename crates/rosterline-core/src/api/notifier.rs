//! Unauthorized-response notification.
//!
//! The client holds one [`UnauthorizedNotifier`], registered at construction,
//! and calls it synchronously once per rejected call. The session controller
//! listens on the receiving end of [`unauthorized_channel`].

use tokio::sync::mpsc;
use tracing::debug;

pub trait UnauthorizedNotifier: Send + Sync {
    fn notify(&self);
}

/// Ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl UnauthorizedNotifier for NoopNotifier {
    fn notify(&self) {}
}

/// Adapter for a plain closure.
pub struct FnNotifier<F>(pub F);

impl<F> UnauthorizedNotifier for FnNotifier<F>
where
    F: Fn() + Send + Sync,
{
    fn notify(&self) {
        (self.0)()
    }
}

/// Marker sent for each auth rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnauthorizedSignal;

/// Sending half of the pipeline-to-session channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<UnauthorizedSignal>,
}

impl UnauthorizedNotifier for ChannelNotifier {
    fn notify(&self) {
        if self.tx.send(UnauthorizedSignal).is_err() {
            debug!("Unauthorized signal dropped, no session listener");
        }
    }
}

pub fn unauthorized_channel() -> (ChannelNotifier, mpsc::UnboundedReceiver<UnauthorizedSignal>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelNotifier { tx }, rx)
}
