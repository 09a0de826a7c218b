//! Stream plumbing shared by the server and client sides of the protocol

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Marker trait for streams used for sending data
pub trait SendingStream: AsyncWrite + Send + Unpin {}
impl SendingStream for OwnedWriteHalf {}
impl SendingStream for BufWriter<OwnedWriteHalf> {}

#[cfg(test)]
impl SendingStream for tokio_test::io::Mock {}

/// Marker trait for streams used for receiving data
pub trait ReceivingStream: AsyncRead + Send + Unpin {}
impl ReceivingStream for OwnedReadHalf {}

#[cfg(test)]
impl ReceivingStream for tokio_test::io::Mock {}

/// Syntactic sugar helper type
#[derive(Debug)]
pub struct SendReceivePair<S: SendingStream, R: ReceivingStream> {
    /// outbound data
    pub send: S,
    /// inbound data
    pub recv: R,
}

impl<S: SendingStream, R: ReceivingStream> From<(S, R)> for SendReceivePair<S, R> {
    fn from(value: (S, R)) -> Self {
        Self {
            send: value.0,
            recv: value.1,
        }
    }
}

/// The stream pair used on a real connection.
///
/// Writes are buffered; every complete response (or request) is followed by a flush.
pub type TcpStreamPair = SendReceivePair<BufWriter<OwnedWriteHalf>, OwnedReadHalf>;

impl TcpStreamPair {
    /// Splits a connected socket into a buffered stream pair
    #[must_use]
    pub fn from_tcp(stream: tokio::net::TcpStream) -> Self {
        let (recv, send) = stream.into_split();
        (BufWriter::new(send), recv).into()
    }
}

impl<S: SendingStream, R: ReceivingStream> SendReceivePair<S, R> {
    /// Flushes any buffered outbound data
    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.send.flush().await
    }

    /// Flushes and closes the outbound half
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.send.shutdown().await
    }
}
