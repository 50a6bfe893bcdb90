//! Generic key commands.

use bytes::Bytes;

use super::{Command, CommandArgs, Verdict, transform_boolean_reply};
use crate::error::RespResult;
use crate::value::Value;

/// `EXISTS key [key ...]`
///
/// With several keys the server counts how many exist; the reply is `true`
/// only when the count is exactly one, matching the single-key form.
#[derive(Debug, Clone)]
pub struct Exists {
    keys: Verdict<Bytes>,
}

impl Exists {
    /// Check a single key.
    pub fn key(key: impl AsRef<[u8]>) -> Self {
        Self {
            keys: Verdict::One(Bytes::copy_from_slice(key.as_ref())),
        }
    }

    /// Check several keys at once.
    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        Self {
            keys: Verdict::Many(
                keys.into_iter()
                    .map(|k| Bytes::copy_from_slice(k.as_ref()))
                    .collect(),
            ),
        }
    }
}

impl Command for Exists {
    type Output = bool;

    const FIRST_KEY_INDEX: usize = 1;
    const IS_READ_ONLY: bool = true;

    fn args(&self) -> CommandArgs {
        CommandArgs::new("EXISTS").push_verdict(self.keys.clone())
    }

    fn transform_reply(reply: Value) -> RespResult<bool> {
        transform_boolean_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exists_single_key() {
        let args = Exists::key("key").args().into_vec();
        assert_eq!(args, vec![Bytes::from("EXISTS"), Bytes::from("key")]);
    }

    #[test]
    fn test_exists_many_keys() {
        let args = Exists::keys(["1", "2"]).args().into_vec();
        assert_eq!(
            args,
            vec![Bytes::from("EXISTS"), Bytes::from("1"), Bytes::from("2")]
        );
    }

    #[test]
    fn test_exists_metadata() {
        assert_eq!(Exists::FIRST_KEY_INDEX, 1);
        assert!(Exists::IS_READ_ONLY);
    }
}
