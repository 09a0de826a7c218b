//! Protocol error types

use super::Tag;
use crate::catalog::CatalogError;

/// Everything that can go wrong on a connection.
///
/// Every variant is fatal to the session or connection it occurred on.
/// Recoverable outcomes (a denied request, a missing file) are ordinary
/// responses and never appear here.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The connection failed, or the peer closed it part way through a frame
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// A length prefix exceeded the limit for its field
    #[error("declared length {declared} exceeds the limit of {limit} bytes")]
    FrameTooLarge {
        /// What the peer claimed
        declared: u64,
        /// What we accept for this field
        limit: u64,
    },
    /// A tag value outside the protocol's vocabulary
    #[error("unknown message tag {0}")]
    UnknownTag(u32),
    /// A valid tag, but not one that may appear at this point
    #[error("unexpected {got} message (expected {expected})")]
    UnexpectedTag {
        /// What the receiver was prepared to accept
        expected: &'static str,
        /// What actually arrived
        got: Tag,
    },
    /// A file being sent ended before its declared size was reached
    #[error("source ended after {sent} of {declared} bytes")]
    SourceTruncated {
        /// Bytes already on the wire
        sent: u64,
        /// Size promised to the peer
        declared: u64,
    },
    /// A local file could not be written part way through a transfer
    #[error("local I/O error during transfer: {0}")]
    LocalIo(std::io::Error),
    /// The catalog failed during a request whose response cannot express failure
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl ProtocolError {
    /// Did the peer go away cleanly at a frame boundary?
    ///
    /// The session treats this as an ordinary disconnect rather than a failure.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ProtocolError::Transport(e) if matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
        ))
    }
}
