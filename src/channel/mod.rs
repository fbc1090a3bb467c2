//! Length-delimited framing of envelopes over a TCP stream.
mod codec;

pub use codec::{decode, encode, DecodeError};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

pub type Reader = FramedRead<OwnedReadHalf, LengthDelimitedCodec>;

pub type Writer = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

/// A frame codec with a 4 byte big-endian length prefix.
pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

pub struct Receiver {
    reader: Reader,
}

impl Receiver {
    /// Reads the next raw frame, `None` on end of stream.
    pub async fn recv(&mut self) -> std::io::Result<Option<BytesMut>> {
        self.reader.next().await.transpose()
    }
}

pub struct Sender {
    writer: Writer,
}

impl Sender {
    pub async fn send(&mut self, frame: Bytes) -> std::io::Result<()> {
        self.writer.send(frame).await
    }

    /// Flushes pending frames and shuts the write direction of the socket down.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        SinkExt::<Bytes>::flush(&mut self.writer).await?;
        self.writer.get_mut().shutdown().await
    }
}

pub struct Channel {
    socket: TcpStream,
    max_frame_length: usize,
}

impl Channel {
    pub fn wrap(socket: TcpStream, max_frame_length: usize) -> Channel {
        Channel { socket, max_frame_length }
    }

    pub fn split(self) -> (Sender, Receiver) {
        let (reader, writer) = self.socket.into_split();
        let reader = FramedRead::new(reader, frame_codec(self.max_frame_length));
        let writer = FramedWrite::new(writer, frame_codec(self.max_frame_length));
        (Sender { writer }, Receiver { reader })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NetworkEnvelope, Payload, Ping};

    use tokio::net::TcpListener;

    #[actix_rt::test]
    async fn test_send_recv_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (_sender, mut receiver) = Channel::wrap(socket, 1024).split();
            let frame = receiver.recv().await.unwrap().unwrap();
            let envelope = decode(&frame).unwrap();
            assert_eq!(envelope.payload, Payload::Ping(Ping::new(7, 12)));
            // end of stream after the peer shut down its write half
            assert!(receiver.recv().await.unwrap().is_none());
        });

        let socket = TcpStream::connect(address).await.unwrap();
        let (mut sender, _receiver) = Channel::wrap(socket, 1024).split();
        let envelope = NetworkEnvelope::new(Payload::Ping(Ping::new(7, 12)));
        sender.send(encode(&envelope).unwrap()).await.unwrap();
        sender.shutdown().await.unwrap();

        handle.await.unwrap();
    }

    #[actix_rt::test]
    async fn test_frame_above_maximum_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (_sender, mut receiver) = Channel::wrap(socket, 16).split();
            let err = receiver.recv().await.unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        });

        let socket = TcpStream::connect(address).await.unwrap();
        let (mut sender, _receiver) = Channel::wrap(socket, 1024).split();
        sender.send(Bytes::from(vec![0u8; 64])).await.unwrap();

        handle.await.unwrap();
    }
}
