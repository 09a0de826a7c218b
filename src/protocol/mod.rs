//! The smdp wire protocol
//!
//! A connection carries a sequence of frames over TCP. Each frame is a [`Tag`]
//! followed by a payload whose shape is fixed by the tag and direction.
//!
//! ## Primitives
//!
//! | Primitive | Encoding |
//! |-----------|----------|
//! | uint32    | 4 bytes, big-endian |
//! | string    | uint32 length, then that many raw bytes (no terminator) |
//!
//! ## Requests and their responses
//!
//! | Request | Payload | Response |
//! |---------|---------|----------|
//! | `ECHO` | string | `ECHO` string |
//! | `LIST` | | `LIST` count, then `count` × `ROW` (id, name, path) |
//! | `USER` | string | none |
//! | `PASS` | string | `ACCEPT` or `DENY` |
//! | `FILE` | uint32 id | `DENY`, `NOFILE`, or `FILE` + body |
//! | `RANDOM` | | `DENY`, `NOFILE`, or `RANDOM` id followed by (`FILE` + body, or `NOFILE`) |
//! | `UPLOAD` | | `DENY`; or `ACCEPT`, then client sends string name + body, then `UPLOAD` id or `DENY` |
//! | `CLOSE` | | none; the server closes the connection |
//!
//! A *body* is described in [`transfer`]: a uint32 size followed by exactly that many bytes.
//!
//! `LIST` and `ECHO` do not require authentication. `FILE`, `RANDOM` and `UPLOAD` do.
//!
//! ## Errors
//!
//! There is no error frame. An unknown tag, a tag the receiver may not receive, or a string
//! longer than the receiver's limit ends the session. See [`ProtocolError`].

pub mod common;
mod error;
pub use error::ProtocolError;
pub mod frame;
mod message;
pub use message::{ListingRow, Request, Response};
mod tag;
pub use tag::{
    MAX_CREDENTIAL_LEN, MAX_ECHO_LEN, MAX_RESPONSE_STRING_LEN, MAX_UPLOAD_NAME_LEN, Primitive, Tag,
};
pub mod transfer;

/// Default TCP port for the service
pub const DEFAULT_PORT: u16 = 3535;
