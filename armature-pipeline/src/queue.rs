//! The command queue engine.
//!
//! Commands move through two ordered sequences:
//!
//! ```text
//! add_command ──► waiting_to_be_sent ──transmit_chunk──► waiting_for_reply ──feed──► settled
//!                      │                                        │
//!                abort / flush                                flush
//! ```
//!
//! The protocol carries no request ids. The n-th reply decoded from the wire
//! belongs to the n-th command written, so `waiting_for_reply` must mirror
//! transmission order exactly. Promotion only ever moves a contiguous prefix
//! of `waiting_to_be_sent`, in order.

use std::collections::VecDeque;

use armature_resp::{Command, DecodeEvent, ReplyDecoder, RespDecoder, encode_command};
use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::cancel::{DetachedBinder, SignalBinder};
use crate::command::{
    AbortBinding, ChainToken, CommandHandle, InFlightCommand, PendingCommand,
    QueueCommandOptions, ReplyFuture, ReplySender, Settle, TypedReply,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::list::{Key, LinkedSlab};
use crate::stats::QueueStats;

/// Transport write function. Receives one chunk; the return value reports
/// whether the transport can take more right away.
pub type Transmit = Box<dyn FnMut(Bytes) -> bool + Send>;

/// Outcome of one [`CommandsQueue::transmit_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReport {
    /// Commands written in the chunk
    pub commands: usize,
    /// Size of the chunk in bytes
    pub bytes: usize,
    /// What the transport returned
    pub accepted: bool,
}

// ============================================================================
// Commands Queue
// ============================================================================

/// Pipelining engine for one connection.
///
/// All methods run to completion; the transport and the decoder are invoked
/// synchronously from inside them and cannot re-enter the queue.
///
/// # Example
///
/// ```
/// use armature_pipeline::{CommandsQueue, QueueCommandOptions};
/// use futures::FutureExt;
///
/// let mut queue = CommandsQueue::new(None, |chunk| {
///     assert_eq!(&chunk[..], b"*1\r\n$4\r\nPING\r\n");
///     true
/// });
///
/// let reply = queue.add_command(["PING"], QueueCommandOptions::new()).unwrap();
/// queue.transmit_chunk(1024);
/// queue.feed(b"+PONG\r\n").unwrap();
///
/// let value = reply.now_or_never().unwrap().unwrap();
/// assert_eq!(value.as_str(), Some("PONG"));
/// ```
pub struct CommandsQueue {
    max_length: Option<usize>,
    chunk_size: usize,
    transmit: Transmit,
    decoder: Box<dyn ReplyDecoder + Send>,
    binder: Box<dyn SignalBinder>,
    waiting_to_be_sent: LinkedSlab<PendingCommand>,
    waiting_for_reply: VecDeque<InFlightCommand>,
    watched: Vec<Key>,
    chain_in_execution: Option<ChainToken>,
    stats: QueueStats,
}

impl CommandsQueue {
    /// Create a queue bounded by `max_length` (`None` or `Some(0)` = unbounded).
    pub fn new(
        max_length: Option<usize>,
        transmit: impl FnMut(Bytes) -> bool + Send + 'static,
    ) -> Self {
        let config = PipelineConfig::new(max_length);
        Self::with_config(&config, transmit)
    }

    /// Create a queue from configuration.
    pub fn with_config(
        config: &PipelineConfig,
        transmit: impl FnMut(Bytes) -> bool + Send + 'static,
    ) -> Self {
        debug!(
            max_length = ?config.max_length,
            chunk_size = config.chunk_size,
            "Creating commands queue"
        );

        Self {
            max_length: config.max_length.filter(|&n| n > 0),
            chunk_size: config.chunk_size,
            transmit: Box::new(transmit),
            decoder: Box::new(RespDecoder::new()),
            binder: Box::new(DetachedBinder),
            waiting_to_be_sent: LinkedSlab::new(),
            waiting_for_reply: VecDeque::new(),
            watched: Vec::new(),
            chain_in_execution: None,
            stats: QueueStats::default(),
        }
    }

    /// Replace the reply decoder.
    pub fn with_decoder(mut self, decoder: impl ReplyDecoder + Send + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// Replace the cancellation binder.
    pub fn with_binder(mut self, binder: impl SignalBinder + 'static) -> Self {
        self.binder = Box::new(binder);
        self
    }

    /// Encode an argument list into its wire form.
    pub fn encode_command<I, A>(args: I) -> Bytes
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        encode_command(args)
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    /// Queue a command given as an argument list.
    pub fn add_command<I, A>(
        &mut self,
        args: I,
        options: QueueCommandOptions,
    ) -> PipelineResult<ReplyFuture>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.admit(1)?;
        self.add_encoded_command(encode_command(args), options)
    }

    /// Queue an already encoded command.
    pub fn add_encoded_command(
        &mut self,
        encoded: Bytes,
        options: QueueCommandOptions,
    ) -> PipelineResult<ReplyFuture> {
        self.admit(1)?;
        check_signal(&options)?;

        let QueueCommandOptions {
            asap,
            signal,
            chain,
        } = options;
        Ok(self.enqueue(encoded, chain, asap, signal))
    }

    /// Queue a typed command; the future yields its shaped reply.
    pub fn add_typed_command<C: Command>(
        &mut self,
        command: &C,
        options: QueueCommandOptions,
    ) -> PipelineResult<TypedReply<C>> {
        self.add_command(command.args(), options)
            .map(TypedReply::new)
    }

    /// Queue several commands as one chain, all or nothing.
    ///
    /// Uses the chain token from `options` or allocates a new one. With
    /// `asap` the whole chain goes to the head, keeping its internal order.
    pub fn add_chain<I, C, A>(
        &mut self,
        commands: I,
        options: QueueCommandOptions,
    ) -> PipelineResult<(ChainToken, Vec<ReplyFuture>)>
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let encoded: Vec<Bytes> = commands.into_iter().map(encode_command::<C, A>).collect();
        self.admit(encoded.len())?;
        check_signal(&options)?;

        let chain = options.chain.unwrap_or_default();
        let mut replies = Vec::with_capacity(encoded.len());

        if options.asap {
            for command in encoded.into_iter().rev() {
                replies.push(self.enqueue(command, Some(chain), true, options.signal.clone()));
            }
            replies.reverse();
        } else {
            for command in encoded {
                replies.push(self.enqueue(command, Some(chain), false, options.signal.clone()));
            }
        }

        debug!(commands = replies.len(), chain = ?chain, "Queued chain");
        Ok((chain, replies))
    }

    /// Backpressure guard. Runs before anything is built or enqueued.
    ///
    /// Commands whose signal already fired are aborted first so they never
    /// count against the bound.
    fn admit(&mut self, incoming: usize) -> PipelineResult<()> {
        self.reap_cancelled();
        if let Some(max_length) = self.max_length
            && self.len() + incoming > max_length
        {
            self.stats.rejected += incoming as u64;
            warn!(
                max_length,
                pending = self.waiting_to_be_sent.len(),
                in_flight = self.waiting_for_reply.len(),
                "Queue full, rejecting command"
            );
            return Err(PipelineError::QueueFull);
        }
        Ok(())
    }

    fn enqueue(
        &mut self,
        encoded: Bytes,
        chain: Option<ChainToken>,
        asap: bool,
        signal: Option<CancellationToken>,
    ) -> ReplyFuture {
        let (reply, mut future) = ReplySender::channel();
        let command = PendingCommand::new(encoded, chain, reply);

        let key = if asap {
            self.waiting_to_be_sent.push_front(command)
        } else {
            self.waiting_to_be_sent.push_back(command)
        };
        let handle = CommandHandle(key);
        future.set_handle(handle);

        if let Some(signal) = signal {
            let unregister = self.binder.bind(&signal, handle);
            if let Some(command) = self.waiting_to_be_sent.get_mut(key) {
                command.abort = Some(AbortBinding { signal, unregister });
            }
            self.watched.push(key);
        }

        self.stats.enqueued += 1;
        trace!(asap, chain = ?chain, pending = self.waiting_to_be_sent.len(), "Queued command");
        future
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Cancel a command that has not been written yet.
    ///
    /// Returns `false` if the command already left the pending sequence; once
    /// on the wire a command can no longer be recalled.
    pub fn abort(&mut self, handle: CommandHandle) -> bool {
        let Some(command) = self.waiting_to_be_sent.remove(handle.0) else {
            return false;
        };

        command.reject(PipelineError::Aborted);
        self.stats.aborted += 1;
        debug!(pending = self.waiting_to_be_sent.len(), "Aborted pending command");
        true
    }

    /// Whether the command is still waiting to be written.
    pub fn is_pending(&self, handle: CommandHandle) -> bool {
        self.waiting_to_be_sent.contains(handle.0)
    }

    /// Abort every pending command whose signal has fired but whose listener
    /// has not run yet.
    ///
    /// Only commands admitted with a signal are visited. Keys of commands
    /// that already left the pending sequence are dropped on the way.
    fn reap_cancelled(&mut self) {
        if self.watched.is_empty() {
            return;
        }

        let pending = &self.waiting_to_be_sent;
        let mut fired = Vec::new();
        self.watched.retain(|&key| match pending.get(key) {
            Some(command) if command.is_cancelled() => {
                fired.push(key);
                false
            }
            Some(_) => true,
            None => false,
        });

        for key in fired {
            self.abort(CommandHandle(key));
        }
    }

    // ------------------------------------------------------------------------
    // Transmission
    // ------------------------------------------------------------------------

    /// Write a prefix of the pending sequence as one chunk of at most
    /// `byte_budget` bytes.
    ///
    /// The walk stops before the first command that would push the chunk
    /// over budget; a head command larger than the budget is sent alone.
    /// The chain of the command the walk stopped at (or of the last pending
    /// command when everything fit) is recorded as the chain in execution.
    ///
    /// Returns `None` when nothing was pending.
    pub fn transmit_chunk(&mut self, byte_budget: usize) -> Option<ChunkReport> {
        self.reap_cancelled();
        if self.waiting_to_be_sent.is_empty() {
            return None;
        }

        let mut size = 0;
        let mut count = 0;
        let mut stopped_at = None;
        for (_, command) in self.waiting_to_be_sent.iter() {
            let len = command.encoded.len();
            if count > 0 && size + len > byte_budget {
                stopped_at = Some(command.chain);
                break;
            }
            size += len;
            count += 1;
        }

        let boundary = match stopped_at {
            Some(chain) => chain,
            None => self.waiting_to_be_sent.back().and_then(|command| command.chain),
        };

        let mut chunk = BytesMut::with_capacity(size);
        for (_, command) in self.waiting_to_be_sent.iter().take(count) {
            chunk.extend_from_slice(&command.encoded);
        }

        let accepted = (self.transmit)(chunk.freeze());

        for _ in 0..count {
            let Some(command) = self.waiting_to_be_sent.pop_front() else {
                break;
            };
            self.waiting_for_reply.push_back(command.into_in_flight());
        }
        self.chain_in_execution = boundary;

        self.stats.chunks += 1;
        self.stats.bytes_transmitted += size as u64;
        debug!(
            commands = count,
            bytes = size,
            accepted,
            chain = ?boundary,
            in_flight = self.waiting_for_reply.len(),
            "Transmitted chunk"
        );

        Some(ChunkReport {
            commands: count,
            bytes: size,
            accepted,
        })
    }

    /// Write every pending command in chunks of the configured size.
    ///
    /// Stops early when the transport reports it cannot take more.
    /// Returns the number of chunks written.
    pub fn transmit_pending(&mut self) -> usize {
        let mut chunks = 0;
        while let Some(report) = self.transmit_chunk(self.chunk_size) {
            chunks += 1;
            if !report.accepted {
                break;
            }
        }
        chunks
    }

    // ------------------------------------------------------------------------
    // Replies
    // ------------------------------------------------------------------------

    /// Feed bytes read from the connection.
    ///
    /// Every complete reply settles the oldest in-flight command. A reply
    /// with nothing in flight yields [`PipelineError::Desync`]: correlation is
    /// lost and the connection must be torn down.
    pub fn feed(&mut self, data: &[u8]) -> PipelineResult<()> {
        let Self {
            decoder,
            waiting_for_reply,
            stats,
            ..
        } = self;

        let mut desync = false;
        let decoded = decoder.feed(data, &mut |event| {
            if desync {
                return;
            }
            let Some(command) = waiting_for_reply.pop_front() else {
                desync = true;
                return;
            };

            match event {
                DecodeEvent::Reply(value) => {
                    stats.replies += 1;
                    command.resolve(value);
                }
                DecodeEvent::Error(err) => {
                    stats.error_replies += 1;
                    command.reject(PipelineError::Server(err));
                }
            }
        });

        if desync {
            error!(
                pending = self.waiting_to_be_sent.len(),
                "Got an unexpected reply with nothing in flight"
            );
            return Err(PipelineError::Desync);
        }

        decoded.map_err(|err| {
            error!(error = %err, in_flight = self.waiting_for_reply.len(), "Failed to decode reply");
            PipelineError::from(err)
        })
    }

    /// Drop partially received reply bytes, e.g. after reconnecting.
    pub fn reset_decoder(&mut self) {
        self.decoder.reset();
    }

    // ------------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------------

    /// Fail every in-flight command after a connection loss.
    ///
    /// Pending commands that continue the chain which was being written are
    /// failed too, so a transaction whose first part is lost is never
    /// finished on its own. Other pending commands stay queued.
    pub fn flush_in_flight(&mut self, err: PipelineError) {
        self.reap_cancelled();
        let in_flight = flush_queue(&mut self.waiting_for_reply, &err);

        let mut chain_tail = 0;
        if let Some(chain) = self.chain_in_execution.take() {
            while self
                .waiting_to_be_sent
                .front()
                .is_some_and(|command| command.chain == Some(chain))
            {
                let Some(command) = self.waiting_to_be_sent.pop_front() else {
                    break;
                };
                command.reject(err.clone());
                chain_tail += 1;
            }
        }

        self.decoder.reset();
        self.stats.flushed += in_flight + chain_tail;
        warn!(
            in_flight,
            chain_tail,
            pending = self.waiting_to_be_sent.len(),
            error = %err,
            "Flushed commands waiting for reply"
        );
    }

    /// Fail every queued command. Used when the queue is being discarded.
    pub fn flush_all(&mut self, err: PipelineError) {
        self.reap_cancelled();
        let in_flight = flush_queue(&mut self.waiting_for_reply, &err);
        let pending = flush_queue(&mut self.waiting_to_be_sent, &err);
        self.watched.clear();
        self.chain_in_execution = None;
        self.decoder.reset();

        self.stats.flushed += in_flight + pending;
        warn!(in_flight, pending, error = %err, "Flushed all commands");
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Pending plus in-flight commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.waiting_to_be_sent.len() + self.waiting_for_reply.len()
    }

    /// Whether both sequences are empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commands waiting to be written.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.waiting_to_be_sent.len()
    }

    /// Commands written and awaiting a reply.
    #[inline]
    pub fn in_flight_len(&self) -> usize {
        self.waiting_for_reply.len()
    }

    /// Admission bound, if any.
    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Byte budget used by [`Self::transmit_pending`].
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chain recorded by the last transmitted chunk.
    pub fn chain_in_execution(&self) -> Option<ChainToken> {
        self.chain_in_execution
    }

    /// Lifetime counters.
    pub fn stats(&self) -> QueueStats {
        self.stats
    }
}

impl Drop for CommandsQueue {
    fn drop(&mut self) {
        if self.is_empty() {
            return;
        }
        self.reap_cancelled();
        flush_queue(&mut self.waiting_for_reply, &PipelineError::QueueClosed);
        flush_queue(&mut self.waiting_to_be_sent, &PipelineError::QueueClosed);
    }
}

fn check_signal(options: &QueueCommandOptions) -> PipelineResult<()> {
    if options
        .signal
        .as_ref()
        .is_some_and(|signal| signal.is_cancelled())
    {
        debug!("Signal already cancelled, not queueing command");
        return Err(PipelineError::Aborted);
    }
    Ok(())
}

// ============================================================================
// Flush Helper
// ============================================================================

/// A sequence whose entries can be failed one by one from the front.
trait CommandSequence {
    type Entry: Settle;

    fn shift(&mut self) -> Option<Self::Entry>;
}

impl CommandSequence for VecDeque<InFlightCommand> {
    type Entry = InFlightCommand;

    fn shift(&mut self) -> Option<InFlightCommand> {
        self.pop_front()
    }
}

impl CommandSequence for LinkedSlab<PendingCommand> {
    type Entry = PendingCommand;

    fn shift(&mut self) -> Option<PendingCommand> {
        self.pop_front()
    }
}

/// Reject every entry, in order. Returns how many were rejected.
fn flush_queue<Q: CommandSequence>(queue: &mut Q, err: &PipelineError) -> u64 {
    let mut flushed = 0;
    while let Some(entry) = queue.shift() {
        entry.reject(err.clone());
        flushed += 1;
    }
    flushed
}

// ============================================================================
// Tests
// ============================================================================
