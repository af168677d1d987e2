use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Error, Frame};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(Error::Incomplete) => {
                // Check if the pending frame exceeds the limit to prevent unbounded buffering.
                if src.len() > self.max_frame_size {
                    return Err(Error::FrameTooLarge {
                        size: src.len(),
                        limit: self.max_frame_size,
                    });
                }
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        // Remove the parsed frame from the buffer.
        let position = cursor.position() as usize;
        src.advance(position);

        Ok(Some(frame))
    }

    /// A stream ending between two frames is an ordinary close; ending inside one is not.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(Error::Truncated),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame.serialize());
        Ok(())
    }
}
