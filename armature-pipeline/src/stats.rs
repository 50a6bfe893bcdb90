//! Queue counters.

use serde::Serialize;

/// Lifetime counters for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Commands admitted to the pending sequence
    pub enqueued: u64,
    /// Commands rejected because the queue was full
    pub rejected: u64,
    /// Commands cancelled before transmission
    pub aborted: u64,
    /// Chunks handed to the transport
    pub chunks: u64,
    /// Bytes handed to the transport
    pub bytes_transmitted: u64,
    /// Commands settled with a regular reply
    pub replies: u64,
    /// Commands settled with a server error reply
    pub error_replies: u64,
    /// Commands rejected by a flush
    pub flushed: u64,
}

impl QueueStats {
    /// Average chunk size in bytes.
    pub fn avg_chunk_size(&self) -> f64 {
        if self.chunks == 0 {
            0.0
        } else {
            self.bytes_transmitted as f64 / self.chunks as f64
        }
    }

    /// Commands settled so far, by any path.
    pub fn settled(&self) -> u64 {
        self.aborted + self.replies + self.error_replies + self.flushed
    }
}
