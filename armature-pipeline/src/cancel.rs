//! Cancellation binding.
//!
//! A command admitted with a live [`CancellationToken`] is handed to the
//! queue's [`SignalBinder`]. The binder arranges for the queue to be told when
//! the token fires (ultimately by calling [`crate::CommandsQueue::abort`] with
//! the command's handle) and returns an [`Unregister`] action. The queue runs
//! that action as soon as the command leaves the pending sequence, whether it
//! was written, aborted or flushed, so a late signal never touches a command
//! that is already on the wire.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::command::CommandHandle;

/// One-shot action that detaches a cancellation listener.
pub struct Unregister(Box<dyn FnOnce() + Send>);

impl Unregister {
    /// Wrap a detach action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(action))
    }

    /// Run the action.
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unregister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unregister")
    }
}

/// Registers listeners for cancellation signals.
pub trait SignalBinder: Send {
    /// Start watching `signal` on behalf of the pending command `handle`.
    ///
    /// Returning `None` means nothing was registered; the queue still
    /// notices a fired signal the next time it admits, transmits or flushes.
    fn bind(&mut self, signal: &CancellationToken, handle: CommandHandle) -> Option<Unregister>;
}

/// Binder that registers nothing.
///
/// Fired signals are observed on the next admission, chunk or flush, or
/// earlier if the caller aborts the command by handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedBinder;

impl SignalBinder for DetachedBinder {
    fn bind(&mut self, _signal: &CancellationToken, _handle: CommandHandle) -> Option<Unregister> {
        None
    }
}

impl<F> SignalBinder for F
where
    F: FnMut(&CancellationToken, CommandHandle) -> Option<Unregister> + Send,
{
    fn bind(&mut self, signal: &CancellationToken, handle: CommandHandle) -> Option<Unregister> {
        self(signal, handle)
    }
}
