// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;
use std::str;

use bytes::{Buf, Bytes};
use itertools::Itertools;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// Requests are arrays of bulk strings; anything nested deeper than this is rejected rather than
/// recursed into.
const MAX_NESTING: usize = 32;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("Protocol error: invalid frame data type '{0}'")]
    InvalidDataType(char),
    #[error("Protocol error: invalid length '{0}'")]
    InvalidLength(String),
    #[error("Protocol error: expected CRLF after bulk string payload")]
    MissingTerminator,
    #[error("Protocol error: arrays nested deeper than {0} levels")]
    TooDeep(usize),
    /// The peer closed the stream in the middle of a frame.
    #[error("Protocol error: connection closed in the middle of a frame")]
    Truncated,
    #[error("Protocol error: frame of {size} bytes exceeds the {limit} bytes limit")]
    FrameTooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error came from the bytes the client sent, as opposed to the socket itself.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Incomplete)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    NullArray,
    Array(Vec<Frame>),
}

impl Frame {
    /// Parses a single request frame. Only arrays and bulk strings are understood, which is all a
    /// client ever sends.
    ///
    /// On success the cursor is left at the first byte after the frame. On
    /// [`Error::Incomplete`] the cursor position is unspecified and the caller is expected to
    /// retry from the start once more bytes have arrived.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        parse_nested(src, 0)
    }

    /// Builds the array reply used for lists: one bulk string per element.
    pub fn bulk_array<I>(items: I) -> Frame
    where
        I: IntoIterator<Item = Bytes>,
    {
        Frame::Array(items.into_iter().map(Frame::Bulk).collect())
    }

    /// Number of bytes [`Frame::serialize`] produces for this frame.
    pub fn encoded_len(&self) -> usize {
        let line = |content: usize| 1 + content + CRLF.len();

        match self {
            Frame::Simple(s) | Frame::Error(s) => line(s.len()),
            Frame::Integer(i) => line(i.to_string().len()),
            Frame::Bulk(data) => line(data.len().to_string().len()) + data.len() + CRLF.len(),
            Frame::Null | Frame::NullArray => line(2),
            Frame::Array(arr) => {
                line(arr.len().to_string().len()) + arr.iter().map(Frame::encoded_len).sum::<usize>()
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => line(b'+', s.as_bytes()),
            Frame::Error(s) => line(b'-', s.as_bytes()),
            Frame::Integer(i) => line(b':', i.to_string().as_bytes()),
            // $<length>\r\n<data>\r\n
            Frame::Bulk(data) => {
                let mut bytes = line(b'$', data.len().to_string().as_bytes());
                bytes.reserve(data.len() + CRLF.len());
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::NullArray => b"*-1\r\n".to_vec(),
            // *<number-of-elements>\r\n<element-1>...<element-n>
            Frame::Array(arr) => {
                let mut bytes = line(b'*', arr.len().to_string().as_bytes());
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "(nil)"),
            Frame::NullArray => write!(f, "(nil array)"),
            Frame::Array(arr) => write!(f, "[{}]", arr.iter().join(", ")),
        }
    }
}

fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Frame, Error> {
    if depth > MAX_NESTING {
        return Err(Error::TooDeep(MAX_NESTING));
    }

    // The first byte in an RESP-serialized payload always identifies its type.
    match get_byte(src)? {
        // *<number-of-elements>\r\n<element-1>...<element-n>
        b'*' => {
            let Some(length) = get_length(src)? else {
                return Ok(Frame::NullArray);
            };

            // The declared length is untrusted, never reserve more than what is buffered.
            let mut frames = Vec::with_capacity(length.min(src.remaining()));
            for _ in 0..length {
                frames.push(parse_nested(src, depth + 1)?);
            }

            Ok(Frame::Array(frames))
        }
        // $<length>\r\n<data>\r\n
        b'$' => {
            let Some(length) = get_length(src)? else {
                return Ok(Frame::Null);
            };

            let start = src.position() as usize;
            let buf = *src.get_ref();
            let end = start.saturating_add(length);

            if buf.len() < end.saturating_add(CRLF.len()) {
                return Err(Error::Incomplete);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(Error::MissingTerminator);
            }

            src.set_position((end + CRLF.len()) as u64);

            Ok(Frame::Bulk(Bytes::from(buf[start..end].to_vec())))
        }
        byte => Err(Error::InvalidDataType(char::from(byte))),
    }
}

fn line(prefix: u8, content: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + content.len() + CRLF.len());
    bytes.push(prefix);
    bytes.extend_from_slice(content);
    bytes.extend_from_slice(CRLF);
    bytes
}

/// Reads a declared length. `-1` is the protocol's null marker and maps to `None`.
fn get_length(src: &mut Cursor<&[u8]>) -> Result<Option<usize>, Error> {
    let line = get_line(src)?;
    let invalid = || Error::InvalidLength(String::from_utf8_lossy(line).into_owned());

    let length = str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(invalid)?;

    match length {
        -1 => Ok(None),
        length if length >= 0 => usize::try_from(length).map(Some).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    let end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}
