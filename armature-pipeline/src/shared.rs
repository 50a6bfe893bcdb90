//! Thread-safe queue handle with signal-driven cancellation.

use std::sync::{Arc, Weak};

use armature_resp::Command;
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::cancel::{SignalBinder, Unregister};
use crate::command::{ChainToken, CommandHandle, QueueCommandOptions, ReplyFuture, TypedReply};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::queue::{ChunkReport, CommandsQueue};
use crate::stats::QueueStats;

/// Cloneable handle to a [`CommandsQueue`] behind a mutex.
///
/// Cancellation signals are watched by tokio tasks, so a pending command is
/// aborted as soon as its token fires rather than when the next chunk is
/// built. Outside a tokio runtime signals are still honoured, only later.
///
/// # Example
///
/// ```
/// use armature_pipeline::{PipelineConfig, PipelineError, QueueCommandOptions, SharedQueue};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let queue = SharedQueue::new(&PipelineConfig::default(), |_chunk| true);
///
/// let signal = CancellationToken::new();
/// let options = QueueCommandOptions::new().with_signal(signal.clone());
/// let reply = queue.add_command(["GET", "k"], options).unwrap();
/// signal.cancel();
///
/// assert_eq!(reply.await, Err(PipelineError::Aborted));
/// # });
/// ```
#[derive(Clone)]
pub struct SharedQueue {
    inner: Arc<Mutex<CommandsQueue>>,
}

impl SharedQueue {
    /// Create a shared queue from configuration.
    pub fn new(
        config: &PipelineConfig,
        transmit: impl FnMut(Bytes) -> bool + Send + 'static,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| {
            let binder = TaskBinder {
                queue: weak.clone(),
            };
            Mutex::new(CommandsQueue::with_config(config, transmit).with_binder(binder))
        });
        Self { inner }
    }

    /// Lock the queue for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, CommandsQueue> {
        self.inner.lock()
    }

    /// See [`CommandsQueue::add_command`].
    pub fn add_command<I, A>(
        &self,
        args: I,
        options: QueueCommandOptions,
    ) -> PipelineResult<ReplyFuture>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.inner.lock().add_command(args, options)
    }

    /// See [`CommandsQueue::add_encoded_command`].
    pub fn add_encoded_command(
        &self,
        encoded: Bytes,
        options: QueueCommandOptions,
    ) -> PipelineResult<ReplyFuture> {
        self.inner.lock().add_encoded_command(encoded, options)
    }

    /// See [`CommandsQueue::add_typed_command`].
    pub fn add_typed_command<C: Command>(
        &self,
        command: &C,
        options: QueueCommandOptions,
    ) -> PipelineResult<TypedReply<C>> {
        self.inner.lock().add_typed_command(command, options)
    }

    /// See [`CommandsQueue::add_chain`].
    pub fn add_chain<I, C, A>(
        &self,
        commands: I,
        options: QueueCommandOptions,
    ) -> PipelineResult<(ChainToken, Vec<ReplyFuture>)>
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.inner.lock().add_chain(commands, options)
    }

    /// See [`CommandsQueue::abort`].
    pub fn abort(&self, handle: CommandHandle) -> bool {
        self.inner.lock().abort(handle)
    }

    /// See [`CommandsQueue::transmit_chunk`].
    pub fn transmit_chunk(&self, byte_budget: usize) -> Option<ChunkReport> {
        self.inner.lock().transmit_chunk(byte_budget)
    }

    /// See [`CommandsQueue::transmit_pending`].
    pub fn transmit_pending(&self) -> usize {
        self.inner.lock().transmit_pending()
    }

    /// See [`CommandsQueue::feed`].
    pub fn feed(&self, data: &[u8]) -> PipelineResult<()> {
        self.inner.lock().feed(data)
    }

    /// See [`CommandsQueue::flush_in_flight`].
    pub fn flush_in_flight(&self, err: PipelineError) {
        self.inner.lock().flush_in_flight(err);
    }

    /// See [`CommandsQueue::flush_all`].
    pub fn flush_all(&self, err: PipelineError) {
        self.inner.lock().flush_all(err);
    }

    /// See [`CommandsQueue::len`].
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// See [`CommandsQueue::is_empty`].
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// See [`CommandsQueue::stats`].
    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats()
    }
}

/// Watches each signal with a spawned task that aborts the command.
struct TaskBinder {
    queue: Weak<Mutex<CommandsQueue>>,
}

impl SignalBinder for TaskBinder {
    fn bind(&mut self, signal: &CancellationToken, handle: CommandHandle) -> Option<Unregister> {
        let Ok(runtime) = Handle::try_current() else {
            trace!("No tokio runtime, signal will be checked at transmit time");
            return None;
        };

        let queue = self.queue.clone();
        let signal = signal.clone();
        let task = runtime.spawn(async move {
            signal.cancelled().await;
            if let Some(queue) = queue.upgrade() {
                let aborted = queue.lock().abort(handle);
                debug!(aborted, "Cancellation signal fired");
            }
        });

        Some(Unregister::new(move || task.abort()))
    }
}
