//! File transfer sub-protocol
//!
//! A file body is a `u32` size followed by exactly that many raw bytes.
//! The sender reads its source in chunks of a fixed size; the receiver
//! writes each chunk to its destination as it arrives. Neither side needs to hold
//! the whole file in memory.

use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::trace;

use super::common::{ReceivingStream, SendingStream};
use super::frame::{read_u32, write_u32};
use super::ProtocolError;

/// Chunk size used when the configuration does not say otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Sends a file body: `size`, then exactly `size` bytes read from `source`.
///
/// If `source` ends, or fails, before `size` bytes have been read, the peer has already been
/// promised bytes we cannot deliver; the result is [`ProtocolError::SourceTruncated`] and the
/// connection cannot continue.
pub async fn send_body<F, W>(
    source: &mut F,
    sink: &mut W,
    size: u32,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    F: AsyncRead + Unpin,
    W: SendingStream,
{
    write_u32(sink, size).await?;
    let declared = u64::from(size);
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    while sent < declared {
        let want = usize::try_from(declared - sent).map_or(buf.len(), |r| r.min(buf.len()));
        let n = match source.read(&mut buf[..want]).await {
            Ok(0) | Err(_) => return Err(ProtocolError::SourceTruncated { sent, declared }),
            Ok(n) => n,
        };
        sink.write_all(&buf[..n]).await?;
        sent += n as u64;
    }
    trace!("sent body of {sent} bytes");
    Ok(sent)
}

/// Receives a file body, writing it to `dest`. Returns the number of bytes received.
///
/// A stream that ends early is a transport error. A failure to write `dest`
/// is [`ProtocolError::LocalIo`]; the remainder of the body is not consumed.
pub async fn receive_body<R, D>(
    stream: &mut R,
    dest: &mut D,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    R: ReceivingStream,
    D: AsyncWrite + Unpin,
{
    let size = u64::from(read_u32(stream).await?);
    receive_sized(stream, dest, size, chunk_size).await
}

/// Receives the bytes of a file body whose size has already been read
pub async fn receive_sized<R, D>(
    stream: &mut R,
    dest: &mut D,
    size: u64,
    chunk_size: usize,
) -> Result<u64, ProtocolError>
where
    R: ReceivingStream,
    D: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut received = 0u64;
    while received < size {
        let want = usize::try_from(size - received).map_or(buf.len(), |r| r.min(buf.len()));
        let n = stream.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        dest.write_all(&buf[..n])
            .await
            .map_err(ProtocolError::LocalIo)?;
        received += n as u64;
    }
    dest.flush().await.map_err(ProtocolError::LocalIo)?;
    trace!("received body of {received} bytes");
    Ok(received)
}

/// Reads and discards a file body, keeping the stream in step when there is nowhere to put it.
pub async fn discard_body<R: ReceivingStream>(
    stream: &mut R,
    chunk_size: usize,
) -> Result<u64, ProtocolError> {
    receive_body(stream, &mut tokio::io::sink(), chunk_size).await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{discard_body, receive_body, send_body};
    use crate::protocol::ProtocolError;
    use crate::util::test_protocol::test_plumbing;
    use pretty_assertions::assert_eq;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn body_is_chunked() {
        let data = b"0123456789";
        let mut sink = Builder::new()
            .write(&[0, 0, 0, 10])
            .write(b"0123")
            .write(b"4567")
            .write(b"89")
            .build();
        let n = send_body(&mut &data[..], &mut sink, 10, 4).await.unwrap();
        assert_eq!(n, 10);
    }

    #[tokio::test]
    async fn empty_body() {
        let mut sink = Builder::new().write(&[0, 0, 0, 0]).build();
        let n = send_body(&mut &b""[..], &mut sink, 0, 1024).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn source_shorter_than_declared() {
        let mut sink = Builder::new().write(&[0, 0, 0, 8]).write(b"abc").build();
        let e = send_body(&mut &b"abc"[..], &mut sink, 8, 1024)
            .await
            .unwrap_err();
        assert!(matches!(
            e,
            ProtocolError::SourceTruncated {
                sent: 3,
                declared: 8
            }
        ));
    }

    #[tokio::test]
    async fn body_round_trip() {
        let (mut a, mut b) = test_plumbing();
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let sender = {
            let data = data.clone();
            tokio::spawn(async move {
                let len = u32::try_from(data.len()).unwrap();
                send_body(&mut data.as_slice(), &mut a.send, len, 1024)
                    .await
                    .unwrap()
            })
        };
        let mut out = Vec::new();
        let n = receive_body(&mut b.recv, &mut out, 1024).await.unwrap();
        assert_eq!(sender.await.unwrap(), 5000);
        assert_eq!(n, 5000);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn stream_ends_early() {
        let mut stream = Builder::new().read(&[0, 0, 0, 6]).read(b"abc").build();
        let mut out = Vec::new();
        let e = receive_body(&mut stream, &mut out, 1024).await.unwrap_err();
        assert!(e.is_disconnect());
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn discard_keeps_stream_in_step() {
        let mut stream = Builder::new()
            .read(&[0, 0, 0, 4])
            .read(b"wxyz")
            .read(&[0, 0, 0, 9])
            .build();
        assert_eq!(discard_body(&mut stream, 2).await.unwrap(), 4);
        assert_eq!(crate::protocol::frame::read_u32(&mut stream).await.unwrap(), 9);
    }
}
