//! Client side of the protocol: one method per request

use std::path::{Path, PathBuf};

use bytes::Bytes;
use indicatif::ProgressBar;
use tracing::{debug, trace, warn};

use crate::protocol::common::{ReceivingStream, SendReceivePair, SendingStream};
use crate::protocol::frame::{read_u32, write_string};
use crate::protocol::transfer::{receive_sized, send_body};
use crate::protocol::{
    ListingRow, MAX_CREDENTIAL_LEN, MAX_ECHO_LEN, MAX_UPLOAD_NAME_LEN, ProtocolError, Request,
    Response, Tag,
};

/// Something a single client command could not do.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A local file could not be used. Nothing is out of step; the connection remains usable.
    #[error("{}: {source}", path.display())]
    Local {
        /// The file concerned
        path: PathBuf,
        /// What went wrong
        #[source]
        source: std::io::Error,
    },
    /// An argument exceeds what the server accepts. Nothing was sent.
    #[error("{what} is too long ({len} bytes; the limit is {max})")]
    TooLong {
        /// Which argument
        what: &'static str,
        /// Its length
        len: usize,
        /// The server's limit
        max: u32,
    },
    /// The connection cannot continue
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// Whether the connection must be abandoned
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }

    fn local(path: &Path, source: std::io::Error) -> Self {
        ClientError::Local {
            path: path.to_owned(),
            source,
        }
    }
}

type Result<T> = std::result::Result<T, ClientError>;

/// How a download request turned out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fetched {
    /// The body was saved; this many bytes
    Saved(u64),
    /// The server has no such file, or could not read it
    NoFile,
    /// Not logged in
    Denied,
}

/// How an upload request turned out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stored {
    /// Committed to the catalog with this id
    As(u32),
    /// Refused, either up front (not logged in) or after the body was sent
    Denied,
}

/// A connected client
#[derive(Debug)]
pub struct Client<S: SendingStream, R: ReceivingStream> {
    stream: SendReceivePair<S, R>,
    chunk_size: usize,
}

fn check_len(what: &'static str, value: &[u8], max: u32) -> Result<()> {
    if value.len() > max as usize {
        return Err(ClientError::TooLong {
            what,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

impl<S: SendingStream, R: ReceivingStream> Client<S, R> {
    /// Wraps a connected stream pair
    pub fn new(stream: SendReceivePair<S, R>, chunk_size: usize) -> Self {
        Self { stream, chunk_size }
    }

    async fn send(&mut self, request: Request) -> Result<()> {
        trace!("send {}", request.tag());
        request.write_to(&mut self.stream.send).await?;
        self.stream.flush().await.map_err(ProtocolError::from)?;
        Ok(())
    }

    async fn receive(&mut self, expected: &[Tag], what: &'static str) -> Result<Response> {
        let response = Response::read_from(&mut self.stream.recv, expected, what).await?;
        trace!("received {}", response.tag());
        Ok(response)
    }

    /// Sends ECHO; returns what came back
    pub async fn echo(&mut self, text: &str) -> Result<Bytes> {
        check_len("echo text", text.as_bytes(), MAX_ECHO_LEN)?;
        self.send(Request::Echo(Bytes::copy_from_slice(text.as_bytes())))
            .await?;
        match self.receive(&[Tag::Echo], "an echo").await? {
            Response::Echo(b) => Ok(b),
            other => Err(unexpected(&other, "an echo")),
        }
    }

    /// Fetches the whole catalog listing
    pub async fn list(&mut self) -> Result<Vec<ListingRow>> {
        self.send(Request::List).await?;
        let count = match self.receive(&[Tag::List], "a listing").await? {
            Response::ListCount(n) => n,
            other => return Err(unexpected(&other, "a listing")),
        };
        debug!("listing has {count} rows");
        let mut rows = Vec::new();
        for _ in 0..count {
            match self.receive(&[Tag::Row], "a listing row").await? {
                Response::Row(row) => rows.push(row),
                other => return Err(unexpected(&other, "a listing row")),
            }
        }
        Ok(rows)
    }

    /// Announces a username. There is no response.
    pub async fn user(&mut self, username: &str) -> Result<()> {
        check_len("username", username.as_bytes(), MAX_CREDENTIAL_LEN)?;
        self.send(Request::User(Bytes::copy_from_slice(username.as_bytes())))
            .await
    }

    /// Submits a secret for the announced username. Returns whether it was accepted.
    pub async fn pass(&mut self, secret: &str) -> Result<bool> {
        check_len("secret", secret.as_bytes(), MAX_CREDENTIAL_LEN)?;
        self.send(Request::Pass(Bytes::copy_from_slice(secret.as_bytes())))
            .await?;
        let r = self
            .receive(&[Tag::Accept, Tag::Deny], "a login response")
            .await?;
        Ok(r == Response::Accept)
    }

    /// Downloads catalog entry `id` to `dest`.
    ///
    /// `dest` is created only once the server has committed to sending a body.
    pub async fn download(
        &mut self,
        id: u32,
        dest: &Path,
        progress: &ProgressBar,
    ) -> Result<Fetched> {
        self.send(Request::File(id)).await?;
        self.receive_file(dest, progress).await
    }

    /// Downloads a randomly chosen entry to `dest`.
    ///
    /// Returns the id the server chose, if it chose one.
    pub async fn random(
        &mut self,
        dest: &Path,
        progress: &ProgressBar,
    ) -> Result<(Option<u32>, Fetched)> {
        self.send(Request::Random).await?;
        let id = match self
            .receive(&[Tag::Random, Tag::NoFile, Tag::Deny], "a random pick")
            .await?
        {
            Response::Random(id) => id,
            Response::NoFile => return Ok((None, Fetched::NoFile)),
            _ => return Ok((None, Fetched::Denied)),
        };
        debug!("server picked {id}");
        let fetched = self.receive_file(dest, progress).await?;
        Ok((Some(id), fetched))
    }

    async fn receive_file(&mut self, dest: &Path, progress: &ProgressBar) -> Result<Fetched> {
        match self
            .receive(&[Tag::File, Tag::NoFile, Tag::Deny], "a file response")
            .await?
        {
            Response::File => (),
            Response::NoFile => return Ok(Fetched::NoFile),
            _ => return Ok(Fetched::Denied),
        }
        let size = u64::from(read_u32(&mut self.stream.recv).await?);
        let file = match tokio::fs::File::create(dest).await {
            Ok(f) => f,
            Err(e) => {
                // Keep the stream in step before giving up on this command
                let _ = receive_sized(
                    &mut self.stream.recv,
                    &mut tokio::io::sink(),
                    size,
                    self.chunk_size,
                )
                .await?;
                return Err(ClientError::local(dest, e));
            }
        };
        progress.set_length(size);
        let mut sink = progress.wrap_async_write(file);
        let received =
            match receive_sized(&mut self.stream.recv, &mut sink, size, self.chunk_size).await {
                Ok(n) => n,
                Err(e) => {
                    // Part way through a body there is no way back into step
                    drop(sink);
                    if let Err(rm) = tokio::fs::remove_file(dest).await {
                        warn!("could not remove partial download {}: {rm}", dest.display());
                    }
                    return Err(e.into());
                }
            };
        progress.finish_and_clear();
        Ok(Fetched::Saved(received))
    }

    /// Uploads the local file `source` under the display name `name`
    pub async fn upload(
        &mut self,
        name: &str,
        source: &Path,
        progress: &ProgressBar,
    ) -> Result<Stored> {
        check_len("upload name", name.as_bytes(), MAX_UPLOAD_NAME_LEN)?;
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| ClientError::local(source, e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| ClientError::local(source, e))?;
        if !meta.is_file() {
            return Err(ClientError::local(
                source,
                std::io::Error::other("not a regular file"),
            ));
        }
        let size = u32::try_from(meta.len()).map_err(|_| {
            ClientError::local(source, std::io::Error::other("too large to upload"))
        })?;

        self.send(Request::Upload).await?;
        if self
            .receive(&[Tag::Accept, Tag::Deny], "an upload response")
            .await?
            == Response::Deny
        {
            return Ok(Stored::Denied);
        }

        write_string(&mut self.stream.send, name.as_bytes()).await?;
        progress.set_length(meta.len());
        let mut reader = progress.wrap_async_read(file);
        let _ = send_body(&mut reader, &mut self.stream.send, size, self.chunk_size).await?;
        self.stream.flush().await.map_err(ProtocolError::from)?;
        progress.finish_and_clear();

        match self
            .receive(&[Tag::Upload, Tag::Deny], "an upload acknowledgement")
            .await?
        {
            Response::Uploaded(id) => Ok(Stored::As(id)),
            _ => Ok(Stored::Denied),
        }
    }

    /// Sends CLOSE and shuts down our side of the connection
    pub async fn close(mut self) -> Result<()> {
        self.send(Request::Close).await?;
        self.stream.shutdown().await.map_err(ProtocolError::from)?;
        Ok(())
    }

    /// Shuts down our side of the connection without CLOSE.
    ///
    /// For when an exchange was cut short and the stream is no longer in step.
    pub async fn abandon(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("shutting down the connection: {e}");
        }
    }
}

fn unexpected(response: &Response, expected: &'static str) -> ClientError {
    ProtocolError::UnexpectedTag {
        expected,
        got: response.tag(),
    }
    .into()
}
