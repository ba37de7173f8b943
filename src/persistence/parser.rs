//! Incremental frame parser.
//!
//! [`FrameParser::parse`] looks at the start of a buffer and returns:
//!
//! - `Ok(Some((frame, consumed)))` - one complete frame, `consumed` bytes long
//! - `Ok(None)` - the buffer ends in the middle of a frame
//! - `Err(ParseError)` - the bytes are not a valid frame
//!
//! Log replay relies on that split: `None` at the end of the file is a torn
//! final write, while an error means the bytes from there on are garbage.

use crate::persistence::frame::{prefix, Frame, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing frames.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative but not -1.
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative but not -1.
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Missing CRLF, nesting too deep, and the like.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest accepted bulk string (512 MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Deepest accepted array nesting.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Default)]
pub struct FrameParser {
    depth: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one frame from the front of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((frame, consumed)))` - a complete frame
    /// - `Ok(None)` - more bytes are needed
    /// - `Err(e)` - invalid data
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match first {
            prefix::SIMPLE_STRING => Ok(parse_line(buf)?.map(|(s, n)| (Frame::Simple(s), n))),
            prefix::ERROR => Ok(parse_line(buf)?.map(|(s, n)| (Frame::Error(s), n))),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        Ok(parse_header(buf)?.map(|(n, consumed)| (Frame::Integer(n), consumed)))
    }

    /// `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let Some((length, header)) = parse_header(buf)? else {
            return Ok(None);
        };

        if length == -1 {
            return Ok(Some((Frame::Null, header)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::TooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total = header + length + CRLF.len();
        if buf.len() < total {
            return Ok(None);
        }
        if &buf[header + length..total] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header..header + length]);
        Ok(Some((Frame::Bulk(data), total)))
    }

    /// `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
        let Some((count, header)) = parse_header(buf)? else {
            return Ok(None);
        };

        if count == -1 {
            return Ok(Some((Frame::Null, header)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        // Each element needs at least 3 bytes; don't trust a huge count
        let count = count as usize;
        let mut elements = Vec::with_capacity(count.min(buf.len() / 3));
        let mut consumed = header;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((frame, used)) => {
                    elements.push(frame);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((Frame::Array(elements), consumed)))
    }
}

/// Reads the text between the prefix byte and the first CRLF.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    let Some(pos) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + pos])
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    Ok(Some((text.to_string(), 1 + pos + CRLF.len())))
}

/// Reads a prefix line holding an integer.
fn parse_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let Some((text, consumed)) = parse_line(buf)? else {
        return Ok(None);
    };
    let n = text
        .parse::<i64>()
        .map_err(|e| ParseError::InvalidInteger(format!("{:?}: {}", text, e)))?;
    Ok(Some((n, consumed)))
}

/// Position of the `\r` of the first CRLF.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == CRLF)
}

/// Parses a single frame with a fresh parser.
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(Frame, usize)>> {
    FrameParser::new().parse(buf)
}
