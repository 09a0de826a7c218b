//! Message tags and the fixed shape of the payload each one carries

use super::ProtocolError;

/// The first field of every frame. Values are fixed by the wire format.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::FromRepr,
    strum::EnumIter,
)]
#[repr(u32)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Tag {
    /// Diagnostic echo; client and server
    Echo = 0,
    /// Catalog listing request, and the row count that answers it
    List = 1,
    /// Username announcement (client only)
    User = 2,
    /// Secret submission (client only)
    Pass = 3,
    /// Request granted (server only)
    Accept = 4,
    /// Request refused (server only)
    Deny = 5,
    /// One catalog row (server only)
    Row = 6,
    /// Download by id; a file body in response
    File = 7,
    /// Download a random entry; its id in response
    Random = 8,
    /// No such file, or it could not be read (server only)
    NoFile = 9,
    /// Upload request; the assigned id in response
    Upload = 10,
    /// Orderly end of session (client only)
    Close = 11,
}

/// One primitive field of a frame payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    /// Four bytes, big-endian
    Uint32,
    /// Length-prefixed byte string, with the largest length the receiver accepts
    Str {
        /// Upper bound on the declared length
        max_len: u32,
    },
}

/// Longest username or secret the server accepts
pub const MAX_CREDENTIAL_LEN: u32 = 255;
/// Longest ECHO payload the server accepts
pub const MAX_ECHO_LEN: u32 = 1023;
/// Longest upload display name the server accepts
pub const MAX_UPLOAD_NAME_LEN: u32 = 255;
/// Longest string the client accepts in any response
pub const MAX_RESPONSE_STRING_LEN: u32 = 4096;

const NOTHING: &[Primitive] = &[];
const ONE_UINT: &[Primitive] = &[Primitive::Uint32];

impl Tag {
    /// Decodes a wire value
    pub fn from_wire(value: u32) -> Result<Self, ProtocolError> {
        Self::from_repr(value).ok_or(ProtocolError::UnknownTag(value))
    }

    /// Wire value of this tag
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        self as u32
    }

    /// Payload that follows this tag when a client sends it, or `None` if clients may not send it.
    #[must_use]
    pub const fn request_shape(self) -> Option<&'static [Primitive]> {
        Some(match self {
            Tag::Echo => &[Primitive::Str {
                max_len: MAX_ECHO_LEN,
            }],
            Tag::User | Tag::Pass => &[Primitive::Str {
                max_len: MAX_CREDENTIAL_LEN,
            }],
            Tag::File => ONE_UINT,
            Tag::List | Tag::Random | Tag::Upload | Tag::Close => NOTHING,
            Tag::Accept | Tag::Deny | Tag::Row | Tag::NoFile => return None,
        })
    }

    /// Payload that follows this tag when the server sends it, or `None` if servers may not send it.
    ///
    /// A [`Tag::File`] response is additionally followed by a transfer body
    /// (see [`response_has_body`](Self::response_has_body)).
    #[must_use]
    pub const fn response_shape(self) -> Option<&'static [Primitive]> {
        const ANY_STRING: Primitive = Primitive::Str {
            max_len: MAX_RESPONSE_STRING_LEN,
        };
        Some(match self {
            Tag::Echo => &[ANY_STRING],
            Tag::Row => &[ANY_STRING, ANY_STRING, ANY_STRING],
            Tag::List | Tag::Random | Tag::Upload => ONE_UINT,
            Tag::Accept | Tag::Deny | Tag::NoFile | Tag::File => NOTHING,
            Tag::User | Tag::Pass | Tag::Close => return None,
        })
    }

    /// Whether a response with this tag carries a size-prefixed file body
    #[must_use]
    pub const fn response_has_body(self) -> bool {
        matches!(self, Tag::File)
    }
}
