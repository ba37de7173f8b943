//! Frames
//!
//! The value type written to the append-only log and returned by the
//! command-line front end. The encoding is RESP:
//!
//! - `+` simple string, `-` error, `:` integer
//! - `$` bulk string (`$-1` is null)
//! - `*` array
//!
//! Every element ends with CRLF. Log records only ever use an array of
//! bulk strings; the other kinds exist for replies.
//!
//! ```text
//! SET user:1 ariz   =>   *3\r\n$3\r\nSET\r\n$6\r\nuser:1\r\n$4\r\nariz\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

pub const CRLF: &[u8] = b"\r\n";

/// Type prefix bytes.
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// One encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+<string>\r\n`, no CR or LF allowed inside.
    Simple(String),

    /// `-<message>\r\n`
    Error(String),

    /// `:<integer>\r\n`
    Integer(i64),

    /// `$<length>\r\n<bytes>\r\n`, binary safe.
    Bulk(Bytes),

    /// `$-1\r\n`
    Null,

    /// `*<count>\r\n<element>...`
    Array(Vec<Frame>),
}

impl Frame {
    pub fn simple(s: impl Into<String>) -> Self {
        Frame::Simple(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Frame::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Frame::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// A bulk string, or null for `None`.
    pub fn optional(value: Option<String>) -> Self {
        value.map_or(Frame::Null, Frame::bulk)
    }

    /// Floats travel as bulk strings in their shortest round-trip form.
    pub fn float(value: f64) -> Self {
        Frame::bulk(value.to_string())
    }

    /// An array of bulk strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Frame::Array(items.into_iter().map(|s| Frame::bulk(s.into())).collect())
    }

    /// Writes the encoded frame to the end of `buf`.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                buf.put_u8(prefix::SIMPLE_STRING);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Frame::Error(s) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            Frame::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            Frame::Bulk(data) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            Frame::Null => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(b"-1");
                buf.put_slice(CRLF);
            }
            Frame::Array(items) => {
                buf.put_u8(prefix::ARRAY);
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for item in items {
                    item.serialize_into(buf);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// The text of a simple or bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Frame::Simple(s) => Some(s),
            Frame::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<crate::Error> for Frame {
    fn from(err: crate::Error) -> Self {
        match err {
            // Already carries its own prefix
            crate::Error::WrongType { .. } => Frame::Error(err.to_string()),
            _ => Frame::Error(format!("ERR {}", err)),
        }
    }
}

/// redis-cli style rendering.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(s) => write!(f, "(error) {}", s),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{:?}", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Frame::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_and_error_serialize() {
        assert_eq!(&Frame::ok().to_bytes()[..], b"+OK\r\n");
        assert_eq!(
            &Frame::error("ERR unknown command").to_bytes()[..],
            b"-ERR unknown command\r\n"
        );
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(&Frame::integer(1000).to_bytes()[..], b":1000\r\n");
        assert_eq!(&Frame::integer(-42).to_bytes()[..], b":-42\r\n");
    }

    #[test]
    fn test_bulk_and_null_serialize() {
        assert_eq!(&Frame::bulk("hello").to_bytes()[..], b"$5\r\nhello\r\n");
        assert_eq!(&Frame::bulk("").to_bytes()[..], b"$0\r\n\r\n");
        assert_eq!(&Frame::Null.to_bytes()[..], b"$-1\r\n");
    }

    #[test]
    fn test_record_serialize() {
        let frame = Frame::strings(["SET", "user:1", "ariz"]);
        assert_eq!(
            &frame.to_bytes()[..],
            b"*3\r\n$3\r\nSET\r\n$6\r\nuser:1\r\n$4\r\nariz\r\n"
        );
    }

    #[test]
    fn test_multibyte_length_is_bytes() {
        assert_eq!(&Frame::bulk("héllo").to_bytes()[..], "$6\r\nhéllo\r\n".as_bytes());
    }

    #[test]
    fn test_display() {
        assert_eq!(Frame::integer(3).to_string(), "(integer) 3");
        assert_eq!(Frame::bulk("value").to_string(), "\"value\"");
        assert_eq!(Frame::Null.to_string(), "(nil)");
        assert_eq!(Frame::ok().to_string(), "OK");
        assert_eq!(Frame::error("ERR boom").to_string(), "(error) ERR boom");
        assert_eq!(Frame::Array(vec![]).to_string(), "(empty array)");
        assert_eq!(
            Frame::strings(["a", "b"]).to_string(),
            "1) \"a\"\n2) \"b\""
        );
    }

    #[test]
    fn test_optional_and_float() {
        assert_eq!(Frame::optional(None), Frame::Null);
        assert_eq!(Frame::optional(Some("x".into())), Frame::bulk("x"));
        assert_eq!(Frame::float(1.5), Frame::bulk("1.5"));
        assert_eq!(Frame::float(3.0), Frame::bulk("3"));
    }
}
