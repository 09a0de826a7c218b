//! Stream wrapper that bounds every blocked read or write
//!
//! A [`Watched`] stream fails any operation that makes no progress for the idle
//! timeout, and every operation once shutdown has been signalled. The failure is an
//! ordinary I/O error carrying an [`Interrupted`], so request handlers unwind through
//! their usual error paths (removing partial uploads and so on).

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;
use tokio::time::{Instant, Sleep};

use crate::protocol::common::{ReceivingStream, SendingStream};

/// Why a [`Watched`] stream gave up
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum Interrupted {
    /// Nothing moved for the idle timeout
    #[error("no progress within the idle timeout")]
    Idle,
    /// The server is shutting down
    #[error("server is shutting down")]
    Shutdown,
}

impl Interrupted {
    /// Recovers the reason from an error raised by a [`Watched`] stream
    pub(crate) fn from_io(e: &io::Error) -> Option<Self> {
        e.get_ref()?.downcast_ref::<Self>().copied()
    }

    fn into_io(self) -> io::Error {
        let kind = match self {
            Interrupted::Idle => io::ErrorKind::TimedOut,
            Interrupted::Shutdown => io::ErrorKind::ConnectionAborted,
        };
        io::Error::new(kind, self)
    }
}

type StopSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One half of a session's stream, watched for stalls and shutdown
pub(crate) struct Watched<T> {
    inner: T,
    idle: Duration,
    deadline: Pin<Box<Sleep>>,
    /// An operation is blocked and the deadline is running
    waiting: bool,
    stop: Option<StopSignal>,
}

impl<T> std::fmt::Debug for Watched<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watched")
            .field("idle", &self.idle)
            .field("waiting", &self.waiting)
            .field("stopped", &self.stop.is_none())
            .finish_non_exhaustive()
    }
}

impl<T: Unpin> Watched<T> {
    pub(crate) fn new(inner: T, idle: Duration, mut shutdown: watch::Receiver<bool>) -> Self {
        Self {
            inner,
            idle,
            deadline: Box::pin(tokio::time::sleep(idle)),
            waiting: false,
            stop: Some(Box::pin(async move {
                super::shutdown_requested(&mut shutdown).await;
            })),
        }
    }

    pub(crate) fn into_inner(self) -> T {
        self.inner
    }

    fn guard<V>(
        &mut self,
        cx: &mut Context<'_>,
        op: impl FnOnce(Pin<&mut T>, &mut Context<'_>) -> Poll<io::Result<V>>,
    ) -> Poll<io::Result<V>> {
        if let Some(stop) = self.stop.as_mut() {
            if stop.as_mut().poll(cx).is_ready() {
                self.stop = None;
            }
        }
        if self.stop.is_none() {
            return Poll::Ready(Err(Interrupted::Shutdown.into_io()));
        }
        match op(Pin::new(&mut self.inner), cx) {
            Poll::Ready(r) => {
                self.waiting = false;
                Poll::Ready(r)
            }
            Poll::Pending => {
                if !self.waiting {
                    self.waiting = true;
                    let when = Instant::now() + self.idle;
                    self.deadline.as_mut().reset(when);
                }
                match self.deadline.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        self.waiting = false;
                        Poll::Ready(Err(Interrupted::Idle.into_io()))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Watched<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().guard(cx, |io, cx| io.poll_read(cx, buf))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Watched<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.get_mut().guard(cx, |io, cx| io.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().guard(cx, |io, cx| io.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().guard(cx, |io, cx| io.poll_shutdown(cx))
    }
}

impl<S: SendingStream> SendingStream for Watched<S> {}
impl<R: ReceivingStream> ReceivingStream for Watched<R> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::sync::watch;

    use super::{Interrupted, Watched};

    #[tokio::test]
    async fn stalled_read_times_out() {
        let (_tx, rx) = watch::channel(false);
        let (_peer, ours) = tokio::io::duplex(64);
        let mut w = Watched::new(ours, Duration::from_millis(50), rx);
        let mut buf = [0u8; 4];
        let e = w.read_exact(&mut buf).await.unwrap_err();
        assert_eq!(Interrupted::from_io(&e), Some(Interrupted::Idle));
    }

    #[tokio::test]
    async fn progress_restarts_the_deadline() {
        let (_tx, rx) = watch::channel(false);
        let (mut peer, ours) = tokio::io::duplex(64);
        let mut w = Watched::new(ours, Duration::from_millis(200), rx);
        let feeder = tokio::spawn(async move {
            for b in b"abcd" {
                tokio::time::sleep(Duration::from_millis(120)).await;
                peer.write_all(&[*b]).await.unwrap();
            }
            peer
        });
        let mut buf = [0u8; 4];
        let _ = w.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abcd");
        drop(feeder.await.unwrap());
    }

    #[tokio::test]
    async fn stalled_write_times_out() {
        let (_tx, rx) = watch::channel(false);
        let (_peer, ours) = tokio::io::duplex(16);
        let mut w = Watched::new(ours, Duration::from_millis(50), rx);
        let e = w.write_all(&[0u8; 64]).await.unwrap_err();
        assert_eq!(Interrupted::from_io(&e), Some(Interrupted::Idle));
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_blocked_read() {
        let (tx, rx) = watch::channel(false);
        let (_peer, ours) = tokio::io::duplex(64);
        let mut w = Watched::new(ours, Duration::from_secs(30), rx);
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 1];
            w.read_exact(&mut buf).await.unwrap_err()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let e = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Interrupted::from_io(&e), Some(Interrupted::Shutdown));
    }

    #[test]
    fn other_errors_are_not_interruptions() {
        let e = std::io::Error::from(std::io::ErrorKind::TimedOut);
        assert_eq!(Interrupted::from_io(&e), None);
    }
}
