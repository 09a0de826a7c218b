//! UPLOAD
//!
//! After ACCEPT, the client sends a display name and a file body. The body is written
//! under the upload directory, synced, then registered in the catalog. The final
//! answer is `UPLOAD` with the new id, or `DENY` if anything on our side failed.
//! Either way the whole body is consumed, so the session stays in step.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Session;
use crate::catalog::run_blocking;
use crate::protocol::common::{ReceivingStream, SendingStream};
use crate::protocol::frame::read_string;
use crate::protocol::transfer::{discard_body, receive_body};
use crate::protocol::{MAX_UPLOAD_NAME_LEN, ProtocolError, Response};

impl<S: SendingStream, R: ReceivingStream> Session<S, R> {
    pub(super) async fn handle_upload(&mut self) -> Result<(), ProtocolError> {
        if !self.state.is_authenticated() {
            debug!("UPLOAD denied: not logged in");
            return Response::Deny.write_to(&mut self.stream.send).await;
        }
        Response::Accept.write_to(&mut self.stream.send).await?;
        self.stream.flush().await?;

        let name = read_string(&mut self.stream.recv, MAX_UPLOAD_NAME_LEN).await?;
        let name = String::from_utf8_lossy(&name).into_owned();
        let dest = storage_path(&self.options.upload_dir, &name);
        debug!("UPLOAD {name:?} to {}", dest.display());

        let mut file = match create_destination(&dest).await {
            Ok(file) => file,
            Err(e) => {
                warn!("UPLOAD {name:?}: cannot create {}: {e}", dest.display());
                let _ = discard_body(&mut self.stream.recv, self.options.chunk_size).await?;
                return Response::Deny.write_to(&mut self.stream.send).await;
            }
        };
        let received = match receive_body(&mut self.stream.recv, &mut file, self.options.chunk_size)
            .await
        {
            Ok(n) => n,
            Err(ProtocolError::LocalIo(e)) => {
                // The rest of the body is still in flight; we cannot tell how much, so this is fatal
                warn!("UPLOAD {name:?}: write to {} failed: {e}", dest.display());
                drop(file);
                remove_quietly(&dest).await;
                return Err(ProtocolError::LocalIo(e));
            }
            Err(e) => {
                drop(file);
                remove_quietly(&dest).await;
                return Err(e);
            }
        };
        if let Err(e) = file.sync_all().await {
            warn!("UPLOAD {name:?}: sync of {} failed: {e}", dest.display());
            drop(file);
            remove_quietly(&dest).await;
            return Response::Deny.write_to(&mut self.stream.send).await;
        }
        drop(file);

        let storage = dest.to_string_lossy().into_owned();
        let record_name = name.clone();
        let inserted =
            run_blocking(&self.catalog, move |c| c.insert(&record_name, &storage)).await;
        let id = match inserted.map(u32::try_from) {
            Ok(Ok(id)) => id,
            Ok(Err(_)) => {
                warn!("UPLOAD {name:?}: assigned id does not fit the wire");
                // The record exists, but the peer cannot be told its id
                return Response::Deny.write_to(&mut self.stream.send).await;
            }
            Err(e) => {
                warn!("UPLOAD {name:?}: catalog insert failed: {e}");
                remove_quietly(&dest).await;
                return Response::Deny.write_to(&mut self.stream.send).await;
            }
        };
        info!("UPLOAD {name:?} stored as {id} ({received} bytes)");
        Response::Uploaded(id).write_to(&mut self.stream.send).await
    }
}

/// Chooses where an upload lands.
///
/// Only the final path component of the client's name is used, with anything
/// outside a conservative character set replaced. A random prefix keeps uploads
/// with the same name apart.
fn storage_path(upload_dir: &Path, name: &str) -> PathBuf {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean.trim_matches('.').is_empty() {
        clean = "upload".into();
    }
    let prefix: u64 = rand::random();
    upload_dir.join(format!("{prefix:016x}-{clean}"))
}

async fn create_destination(dest: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(dir) = dest.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .await
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("could not remove partial upload {}: {e}", path.display());
    }
}
