//! Command argument builders.
//!
//! Each command is a plain struct that knows how to turn itself into an
//! argument list and how to shape the raw reply. Builders never touch a
//! connection; the pipeline encodes and queues what they produce.
//!
//! ```
//! use armature_resp::commands::{Command, Exists};
//!
//! let cmd = Exists::keys(["a", "b"]);
//! let args: Vec<String> = cmd
//!     .args()
//!     .iter()
//!     .map(|a| String::from_utf8_lossy(a).into_owned())
//!     .collect();
//! assert_eq!(args, ["EXISTS", "a", "b"]);
//! ```

mod bloom;
mod keys;

pub use bloom::{BfExists, CfInfo, CfLoadChunk, CmsMerge, CuckooInfo, TopKCount};
pub use keys::Exists;

use bytes::Bytes;
use std::fmt::Display;

use crate::error::{RespError, RespResult};
use crate::value::Value;

// ============================================================================
// Arguments
// ============================================================================

/// An ordered list of byte-string arguments, command name first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    args: Vec<Bytes>,
}

impl CommandArgs {
    /// Start an argument list with the command name.
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![Bytes::copy_from_slice(name.as_ref())],
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append the decimal rendering of a number (or anything displayable).
    pub fn arg_display(mut self, arg: impl Display) -> Self {
        self.args.push(Bytes::from(arg.to_string()));
        self
    }

    /// Append every argument from an iterator.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args
            .extend(args.into_iter().map(|a| Bytes::copy_from_slice(a.as_ref())));
        self
    }

    /// Append either a single argument or a list of them.
    pub fn push_verdict<A: AsRef<[u8]>>(self, verdict: Verdict<A>) -> Self {
        match verdict {
            Verdict::One(arg) => self.arg(arg),
            Verdict::Many(args) => self.args(args),
        }
    }

    /// Number of arguments, including the command name.
    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Iterate over the arguments.
    pub fn iter(&self) -> std::slice::Iter<'_, Bytes> {
        self.args.iter()
    }

    /// Take the arguments out.
    pub fn into_vec(self) -> Vec<Bytes> {
        self.args
    }
}

impl IntoIterator for CommandArgs {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommandArgs {
    type Item = &'a Bytes;
    type IntoIter = std::slice::Iter<'a, Bytes>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

/// A single argument or a list of them.
#[derive(Debug, Clone)]
pub enum Verdict<A> {
    /// Exactly one argument
    One(A),
    /// Any number of arguments
    Many(Vec<A>),
}

// ============================================================================
// Command Trait
// ============================================================================

/// A command that can be queued on a pipeline.
pub trait Command {
    /// Shaped reply type.
    type Output;

    /// Index of the first key argument (0 when the command has no keys).
    const FIRST_KEY_INDEX: usize;

    /// Whether the command only reads data.
    const IS_READ_ONLY: bool = false;

    /// Build the argument list.
    fn args(&self) -> CommandArgs;

    /// Shape the raw reply.
    fn transform_reply(reply: Value) -> RespResult<Self::Output>;
}

// ============================================================================
// Reply Transformers
// ============================================================================

/// `:1` → `true`, `:0` → `false`.
pub fn transform_boolean_reply(reply: Value) -> RespResult<bool> {
    match reply {
        Value::Integer(n) => Ok(n == 1),
        other => Err(RespError::unexpected("integer", other)),
    }
}

/// `+OK` → `()`.
pub fn transform_ok_reply(reply: Value) -> RespResult<()> {
    match reply.as_str() {
        Some("OK") => Ok(()),
        _ => Err(RespError::unexpected("OK", reply)),
    }
}

/// Array of integers → `Vec<i64>`.
pub fn transform_integer_array_reply(reply: Value) -> RespResult<Vec<i64>> {
    reply
        .into_array()
        .map_err(|other| RespError::unexpected("array", other))?
        .into_iter()
        .map(|item| match item {
            Value::Integer(n) => Ok(n),
            other => Err(RespError::unexpected("integer", other)),
        })
        .collect()
}
