//! USER and PASS

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::Session;
use crate::catalog::run_blocking;
use crate::protocol::common::{ReceivingStream, SendingStream};
use crate::protocol::{ProtocolError, Response};

impl<S: SendingStream, R: ReceivingStream> Session<S, R> {
    /// Usernames are stored as text, so a name that is not UTF-8 matches nobody
    pub(super) fn handle_user(&mut self, name: &[u8]) {
        match std::str::from_utf8(name) {
            Ok(name) => {
                debug!("USER {name:?}");
                self.state.set_username(name.to_owned());
            }
            Err(_) => {
                debug!("USER is not UTF-8 ({} bytes)", name.len());
                self.state.forget_username();
            }
        }
    }

    pub(super) async fn handle_pass(&mut self, secret: Bytes) -> Result<(), ProtocolError> {
        let Some(username) = self.state.pending_username().map(str::to_owned) else {
            debug!("PASS with no usable USER");
            self.state.set_authenticated(false);
            return Response::Deny.write_to(&mut self.stream.send).await;
        };
        let lookup = username.clone();
        let granted = match run_blocking(&self.catalog, move |c| {
            c.verify_credential(&lookup, &secret)
        })
        .await
        {
            Ok(granted) => granted,
            Err(e) => {
                warn!("credential check for {username:?} failed: {e}");
                false
            }
        };
        self.state.set_authenticated(granted);
        if granted {
            info!("user {username:?} logged in");
            Response::Accept.write_to(&mut self.stream.send).await
        } else {
            info!("login failed for {username:?}");
            Response::Deny.write_to(&mut self.stream.send).await
        }
    }
}
