//! # Armature RESP
//!
//! Wire-level building blocks for talking to Redis-compatible servers.
//!
//! ## Features
//!
//! - **Command Encoding**: Argument lists to `*N` / `$len` frames, byte-exact
//! - **Incremental Decoding**: Replies decoded from arbitrarily split reads
//! - **Command Builders**: Typed argument lists with reply shaping
//!
//! ## Quick Start
//!
//! ```
//! use armature_resp::{encode_command, DecodeEvent, ReplyDecoder, RespDecoder, Value};
//!
//! let wire = encode_command(["SET", "k", "v"]);
//! assert_eq!(&wire[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
//!
//! let mut decoder = RespDecoder::new();
//! let mut events = Vec::new();
//! decoder.feed(b"+OK\r\n-ERR nope\r\n", &mut |event| events.push(event)).unwrap();
//!
//! assert_eq!(events[0], DecodeEvent::Reply(Value::SimpleString("OK".into())));
//! assert!(matches!(events[1], DecodeEvent::Error(_)));
//! ```

pub mod commands;
mod decoder;
mod encoder;
mod error;
mod value;

pub use commands::{Command, CommandArgs};
pub use decoder::{DecodeEvent, MAX_BULK_LEN, MAX_DEPTH, ReplyDecoder, RespDecoder};
pub use encoder::encode_command;
pub use error::{RespError, RespResult, ServerError};
pub use value::Value;

/// Prelude for common imports.
///
/// ```
/// use armature_resp::prelude::*;
/// ```
pub mod prelude {
    pub use crate::commands::{Command, CommandArgs};
    pub use crate::decoder::{DecodeEvent, ReplyDecoder, RespDecoder};
    pub use crate::encoder::encode_command;
    pub use crate::error::{RespError, RespResult, ServerError};
    pub use crate::value::Value;
}
