//! # Armature Pipeline
//!
//! Ordered command pipelining over a single Redis-compatible connection.
//!
//! ## Features
//!
//! - **Backpressure**: Bounded admission across pending and in-flight commands
//! - **Priority Insertion**: `asap` commands jump to the head of the queue
//! - **Chunked Writes**: Pending commands batched into byte-budgeted chunks
//! - **Reply Correlation**: Replies matched to commands by wire order
//! - **Cancellation**: Pending commands aborted by signal or handle
//! - **Chain Flushing**: Interrupted transactions are failed as a unit
//!
//! ## Quick Start
//!
//! ```
//! use armature_pipeline::{CommandsQueue, PipelineError, QueueCommandOptions};
//! use futures::FutureExt;
//!
//! let mut queue = CommandsQueue::new(Some(128), |_chunk| true);
//!
//! let set = queue.add_command(["SET", "k", "v"], QueueCommandOptions::new()).unwrap();
//! let get = queue.add_command(["GET", "missing"], QueueCommandOptions::new()).unwrap();
//! queue.transmit_pending();
//!
//! // Replies arrive in write order and may be split anywhere.
//! queue.feed(b"+OK\r").unwrap();
//! queue.feed(b"\n$-1\r\n").unwrap();
//!
//! assert_eq!(set.now_or_never().unwrap().unwrap().as_str(), Some("OK"));
//! assert!(get.now_or_never().unwrap().unwrap().is_nil());
//!
//! // Connection dropped: everything on the wire fails.
//! let lost = queue.add_command(["PING"], QueueCommandOptions::new()).unwrap();
//! queue.transmit_pending();
//! queue.flush_in_flight(PipelineError::connection_lost("reset by peer"));
//! assert!(lost.now_or_never().unwrap().is_err());
//! ```
//!
//! ## Configuration
//!
//! ```
//! use armature_pipeline::PipelineConfig;
//!
//! let config = PipelineConfig::builder()
//!     .max_length(1000)
//!     .chunk_size(32 * 1024)
//!     .build();
//!
//! // Or from ARMATURE_PIPELINE_MAX_LENGTH / ARMATURE_PIPELINE_CHUNK_SIZE
//! let from_env = PipelineConfig::from_env().build();
//! # let _ = (config, from_env);
//! ```

mod cancel;
mod command;
mod config;
mod error;
mod list;
mod queue;
mod shared;
mod stats;

pub use cancel::{DetachedBinder, SignalBinder, Unregister};
pub use command::{ChainToken, CommandHandle, QueueCommandOptions, ReplyFuture, TypedReply};
pub use config::{DEFAULT_CHUNK_SIZE, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, PipelineResult};
pub use queue::{ChunkReport, CommandsQueue, Transmit};
pub use shared::SharedQueue;
pub use stats::QueueStats;

pub use armature_resp::{Value, encode_command};

/// Prelude for common imports.
///
/// ```
/// use armature_pipeline::prelude::*;
/// ```
pub mod prelude {
    pub use crate::command::{ChainToken, CommandHandle, QueueCommandOptions, ReplyFuture};
    pub use crate::config::PipelineConfig;
    pub use crate::error::{PipelineError, PipelineResult};
    pub use crate::queue::CommandsQueue;
    pub use crate::shared::SharedQueue;
    pub use armature_resp::Value;
}
