//! Authentication state of one session

use tracing::debug;

/// What a session knows about its peer.
///
/// Created unauthenticated at accept, destroyed with the connection, never shared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    authenticated: bool,
    pending_username: Option<String>,
}

impl SessionState {
    /// Has the peer completed a successful USER/PASS exchange?
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The username most recently announced, if any
    #[must_use]
    pub fn pending_username(&self) -> Option<&str> {
        self.pending_username.as_deref()
    }

    /// Records a USER announcement. A new login is now in progress, so any previous
    /// authentication is dropped.
    pub fn set_username(&mut self, username: String) {
        if self.authenticated {
            debug!("new USER while authenticated; dropping back to unauthenticated");
        }
        self.authenticated = false;
        self.pending_username = Some(username);
    }

    /// Records a USER announcement that named nobody we could look up.
    /// Like any USER, it drops previous authentication.
    pub fn forget_username(&mut self) {
        self.authenticated = false;
        self.pending_username = None;
    }

    /// Records the outcome of a PASS check
    pub fn set_authenticated(&mut self, granted: bool) {
        self.authenticated = granted;
    }
}
