//! Command encoding.
//!
//! A command is sent as a RESP array of bulk strings:
//!
//! ```text
//! *<N>\r\n
//! $<len>\r\n<bytes>\r\n   (repeated N times)
//! ```
//!
//! `<len>` is always the byte length of the argument, so multi-byte UTF-8
//! text is framed correctly.

use bytes::{BufMut, Bytes, BytesMut};

/// Bytes added per argument on top of its payload: `$`, two CRLFs.
const ARG_OVERHEAD: usize = 5;

/// Encode an argument list into its wire form.
///
/// # Example
///
/// ```
/// use armature_resp::encode_command;
///
/// let wire = encode_command(["SET", "k", "v"]);
/// assert_eq!(&wire[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
/// ```
pub fn encode_command<I, A>(args: I) -> Bytes
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let args: Vec<A> = args.into_iter().collect();

    let payload: usize = args
        .iter()
        .map(|arg| arg.as_ref().len() + ARG_OVERHEAD + decimal_len(arg.as_ref().len()))
        .sum();
    let mut buf = BytesMut::with_capacity(payload + 3 + decimal_len(args.len()));

    put_header(&mut buf, b'*', args.len());
    for arg in &args {
        let arg = arg.as_ref();
        put_header(&mut buf, b'$', arg.len());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }

    buf.freeze()
}

fn put_header(buf: &mut BytesMut, prefix: u8, n: usize) {
    buf.put_u8(prefix);
    buf.put_slice(n.to_string().as_bytes());
    buf.put_slice(b"\r\n");
}

#[inline]
fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
