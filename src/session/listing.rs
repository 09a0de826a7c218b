//! ECHO and LIST. Neither needs authentication.

use bytes::Bytes;
use tracing::{debug, error, warn};

use super::Session;
use crate::catalog::run_blocking;
use crate::protocol::common::{ReceivingStream, SendingStream};
use crate::protocol::{ListingRow, MAX_RESPONSE_STRING_LEN, ProtocolError, Response};

impl<S: SendingStream, R: ReceivingStream> Session<S, R> {
    pub(super) async fn handle_echo(&mut self, data: Bytes) -> Result<(), ProtocolError> {
        debug!("ECHO of {} bytes", data.len());
        Response::Echo(data).write_to(&mut self.stream.send).await
    }

    /// A listing has no way to report failure part way, so a catalog error ends the session.
    ///
    /// Rows with a column too long for a client to accept are left out.
    pub(super) async fn handle_list(&mut self) -> Result<(), ProtocolError> {
        let records = run_blocking(&self.catalog, |c| c.list_all())
            .await
            .inspect_err(|e| error!("catalog listing failed: {e}"))?;
        let rows: Vec<ListingRow> = records
            .into_iter()
            .map(|rec| ListingRow {
                id: rec.id.to_string(),
                name: rec.name,
                path: rec.storage_path,
            })
            .filter(|row| {
                let fits = fits_on_the_wire(row);
                if !fits {
                    warn!("LIST: record {} is too long to send; skipped", row.id);
                }
                fits
            })
            .collect();
        let count = u32::try_from(rows.len()).map_err(|_| ProtocolError::FrameTooLarge {
            declared: rows.len() as u64,
            limit: u64::from(u32::MAX),
        })?;
        debug!("LIST: {count} rows");
        Response::ListCount(count)
            .write_to(&mut self.stream.send)
            .await?;
        for row in rows {
            Response::Row(row).write_to(&mut self.stream.send).await?;
        }
        Ok(())
    }
}

fn fits_on_the_wire(row: &ListingRow) -> bool {
    [&row.id, &row.name, &row.path]
        .iter()
        .all(|s| s.len() <= MAX_RESPONSE_STRING_LEN as usize)
}
