use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{Error, Frame};

pub struct Connection {
    pub id: Uuid,
    // Data is read from the socket into the codec's buffer. When a frame is parsed, the
    // corresponding data is removed from the buffer.
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Self::with_codec(stream, FrameCodec::default())
    }

    pub fn with_codec(stream: TcpStream, codec: FrameCodec) -> Connection {
        let (reader, writer) = stream.into_split();

        Connection {
            id: Uuid::new_v4(),
            reader: FramedRead::new(reader, codec),
            writer: FramedWrite::new(writer, codec),
        }
    }

    /// Reads the next frame. `Ok(None)` means the peer closed the connection between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.reader.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        self.writer.send(frame).await
    }
}
