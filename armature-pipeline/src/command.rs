//! Queued commands, their options and reply futures.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use armature_resp::{Command, Value};
use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::cancel::Unregister;
use crate::error::{PipelineError, PipelineResult};
use crate::list::Key;

// ============================================================================
// Identifiers
// ============================================================================

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(1);

/// Groups commands that form one transaction.
///
/// Only compared for equality. Commands sharing a token that are still
/// pending when the chain is interrupted are discarded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainToken(u64);

impl ChainToken {
    /// Allocate a process-unique token.
    pub fn new() -> Self {
        Self(NEXT_CHAIN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ChainToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a command while it waits to be sent.
///
/// Used to cancel the command through [`crate::CommandsQueue::abort`].
/// Becomes inert once the command is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandHandle(pub(crate) Key);

// ============================================================================
// Options
// ============================================================================

/// Per-command queueing options.
#[derive(Debug, Clone, Default)]
pub struct QueueCommandOptions {
    /// Put the command at the head of the queue instead of the tail.
    pub asap: bool,
    /// Cancel the command while it is still waiting to be sent.
    pub signal: Option<CancellationToken>,
    /// Transaction the command belongs to.
    pub chain: Option<ChainToken>,
}

impl QueueCommandOptions {
    /// Default options: tail insertion, no signal, no chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the head of the queue.
    pub fn asap(mut self) -> Self {
        self.asap = true;
        self
    }

    /// Attach a cancellation signal.
    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attach a chain token.
    pub fn with_chain(mut self, chain: ChainToken) -> Self {
        self.chain = Some(chain);
        self
    }
}

// ============================================================================
// Reply Channel
// ============================================================================

type ReplyResult = PipelineResult<Value>;

/// Settlement side of a command's reply.
#[derive(Debug)]
pub(crate) struct ReplySender(oneshot::Sender<ReplyResult>);

impl ReplySender {
    pub(crate) fn channel() -> (Self, ReplyFuture) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), ReplyFuture { handle: None, rx })
    }

    pub(crate) fn resolve(self, value: Value) {
        self.send(Ok(value));
    }

    pub(crate) fn reject(self, err: PipelineError) {
        self.send(Err(err));
    }

    fn send(self, result: ReplyResult) {
        if self.0.send(result).is_err() {
            trace!("Reply receiver dropped before settlement");
        }
    }
}

/// Future resolving to a command's reply.
///
/// Settled exactly once: by the matching reply, by cancellation, or by a
/// flush. Dropping it does not remove the command from the queue.
#[derive(Debug)]
#[must_use = "a reply future does nothing unless awaited"]
pub struct ReplyFuture {
    handle: Option<CommandHandle>,
    rx: oneshot::Receiver<ReplyResult>,
}

impl ReplyFuture {
    /// Handle for cancelling the command while it is still pending.
    pub fn handle(&self) -> Option<CommandHandle> {
        self.handle
    }

    pub(crate) fn set_handle(&mut self, handle: CommandHandle) {
        self.handle = Some(handle);
    }
}

impl Future for ReplyFuture {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(PipelineError::QueueClosed)))
    }
}

/// Future resolving to a command's shaped reply.
#[derive(Debug)]
#[must_use = "a reply future does nothing unless awaited"]
pub struct TypedReply<C> {
    inner: ReplyFuture,
    _command: PhantomData<fn() -> C>,
}

impl<C: Command> TypedReply<C> {
    pub(crate) fn new(inner: ReplyFuture) -> Self {
        Self {
            inner,
            _command: PhantomData,
        }
    }

    /// Handle for cancelling the command while it is still pending.
    pub fn handle(&self) -> Option<CommandHandle> {
        self.inner.handle()
    }
}

impl<C: Command> Future for TypedReply<C> {
    type Output = PipelineResult<C::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|result| {
                result.and_then(|value| C::transform_reply(value).map_err(PipelineError::from))
            })
    }
}

// ============================================================================
// Queue Entries
// ============================================================================

/// Cancellation signal plus the action that detaches its listener.
pub(crate) struct AbortBinding {
    pub(crate) signal: CancellationToken,
    pub(crate) unregister: Option<Unregister>,
}

impl AbortBinding {
    fn release(self) {
        if let Some(unregister) = self.unregister {
            unregister.run();
        }
    }
}

/// A command waiting to be written.
pub(crate) struct PendingCommand {
    pub(crate) encoded: Bytes,
    pub(crate) chain: Option<ChainToken>,
    pub(crate) abort: Option<AbortBinding>,
    reply: ReplySender,
}

impl PendingCommand {
    pub(crate) fn new(encoded: Bytes, chain: Option<ChainToken>, reply: ReplySender) -> Self {
        Self {
            encoded,
            chain,
            abort: None,
            reply,
        }
    }

    /// Whether the attached signal has already fired.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|abort| abort.signal.is_cancelled())
    }

    /// Detach the cancellation listener and keep only the reply side.
    pub(crate) fn into_in_flight(self) -> InFlightCommand {
        if let Some(abort) = self.abort {
            abort.release();
        }
        InFlightCommand { reply: self.reply }
    }
}

/// A command written to the wire and awaiting its reply.
#[derive(Debug)]
pub(crate) struct InFlightCommand {
    reply: ReplySender,
}

impl InFlightCommand {
    pub(crate) fn resolve(self, value: Value) {
        self.reply.resolve(value);
    }
}

/// Anything that can be failed with an error.
pub(crate) trait Settle {
    fn reject(self, err: PipelineError);
}

impl Settle for PendingCommand {
    fn reject(self, err: PipelineError) {
        if let Some(abort) = self.abort {
            abort.release();
        }
        self.reply.reject(err);
    }
}

impl Settle for InFlightCommand {
    fn reject(self, err: PipelineError) {
        self.reply.reject(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_chain_tokens_are_unique() {
        let a = ChainToken::new();
        let b = ChainToken::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_options_builder() {
        let chain = ChainToken::new();
        let options = QueueCommandOptions::new()
            .asap()
            .with_chain(chain)
            .with_signal(CancellationToken::new());

        assert!(options.asap);
        assert_eq!(options.chain, Some(chain));
        assert!(options.signal.is_some());
    }

    #[test]
    fn test_reply_future_resolves() {
        let (tx, rx) = ReplySender::channel();
        tx.resolve(Value::Integer(1));
        assert_eq!(rx.now_or_never(), Some(Ok(Value::Integer(1))));
    }

    #[test]
    fn test_dropped_sender_closes_future() {
        let (tx, rx) = ReplySender::channel();
        drop(tx);
        assert_eq!(rx.now_or_never(), Some(Err(PipelineError::QueueClosed)));
    }

    #[test]
    fn test_promotion_releases_binding() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();

        let (tx, _rx) = ReplySender::channel();
        let mut pending = PendingCommand::new(Bytes::from_static(b"x"), None, tx);
        pending.abort = Some(AbortBinding {
            signal: CancellationToken::new(),
            unregister: Some(Unregister::new(move || flag.store(true, Ordering::SeqCst))),
        });

        let _in_flight = pending.into_in_flight();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reject_pending() {
        let (tx, rx) = ReplySender::channel();
        let pending = PendingCommand::new(Bytes::from_static(b"x"), None, tx);
        pending.reject(PipelineError::Aborted);
        assert_eq!(rx.now_or_never(), Some(Err(PipelineError::Aborted)));
    }
}
