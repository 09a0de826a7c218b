//! FILE and RANDOM

use tracing::{debug, info, warn};

use super::Session;
use crate::catalog::{CatalogRecord, run_blocking};
use crate::protocol::common::{ReceivingStream, SendingStream};
use crate::protocol::transfer::send_body;
use crate::protocol::{ProtocolError, Response};

impl<S: SendingStream, R: ReceivingStream> Session<S, R> {
    pub(super) async fn handle_file(&mut self, id: u32) -> Result<(), ProtocolError> {
        if !self.state.is_authenticated() {
            debug!("FILE {id} denied: not logged in");
            return Response::Deny.write_to(&mut self.stream.send).await;
        }
        let record = run_blocking(&self.catalog, move |c| c.find_by_id(i64::from(id))).await;
        match record {
            Ok(Some(record)) => self.send_record(&record).await,
            Ok(None) => {
                info!("FILE {id}: no such record");
                Response::NoFile.write_to(&mut self.stream.send).await
            }
            Err(e) => {
                warn!("FILE {id}: catalog lookup failed: {e}");
                Response::NoFile.write_to(&mut self.stream.send).await
            }
        }
    }

    pub(super) async fn handle_random(&mut self) -> Result<(), ProtocolError> {
        if !self.state.is_authenticated() {
            debug!("RANDOM denied: not logged in");
            return Response::Deny.write_to(&mut self.stream.send).await;
        }
        let record = match run_blocking(&self.catalog, |c| c.pick_random()).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("RANDOM: catalog is empty");
                return Response::NoFile.write_to(&mut self.stream.send).await;
            }
            Err(e) => {
                warn!("RANDOM: catalog lookup failed: {e}");
                return Response::NoFile.write_to(&mut self.stream.send).await;
            }
        };
        let Ok(wire_id) = u32::try_from(record.id) else {
            warn!("RANDOM picked id {} which does not fit the wire", record.id);
            return Response::NoFile.write_to(&mut self.stream.send).await;
        };
        info!("RANDOM picked {wire_id} ({:?})", record.name);
        Response::Random(wire_id)
            .write_to(&mut self.stream.send)
            .await?;
        self.send_record(&record).await
    }

    /// Sends FILE and the body of a record's file, or NOFILE if it cannot be opened.
    ///
    /// Once the size has been declared, a short read is fatal.
    async fn send_record(&mut self, record: &CatalogRecord) -> Result<(), ProtocolError> {
        let opened = match tokio::fs::File::open(&record.storage_path).await {
            Ok(file) => file.metadata().await.map(|meta| (file, meta)),
            Err(e) => Err(e),
        };
        let (mut file, meta) = match opened {
            Ok(res) => res,
            Err(e) => {
                warn!("record {}: cannot open {}: {e}", record.id, record.storage_path);
                return Response::NoFile.write_to(&mut self.stream.send).await;
            }
        };
        if !meta.is_file() {
            warn!("record {}: {} is not a regular file", record.id, record.storage_path);
            return Response::NoFile.write_to(&mut self.stream.send).await;
        }
        let Ok(size) = u32::try_from(meta.len()) else {
            warn!(
                "record {}: {} is too large to send ({} bytes)",
                record.id,
                record.storage_path,
                meta.len()
            );
            return Response::NoFile.write_to(&mut self.stream.send).await;
        };
        Response::File.write_to(&mut self.stream.send).await?;
        let sent = send_body(
            &mut file,
            &mut self.stream.send,
            size,
            self.options.chunk_size,
        )
        .await?;
        info!("sent record {} ({sent} bytes)", record.id);
        Ok(())
    }
}
