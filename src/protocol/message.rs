//! Typed requests and responses

use bytes::Bytes;

use super::common::{ReceivingStream, SendingStream};
use super::frame::{Field, read_fields, read_tag, write_frame};
use super::{ProtocolError, Tag};

/// A message sent by a client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Diagnostic; the server answers with the same bytes
    Echo(Bytes),
    /// Catalog listing
    List,
    /// Announces the username for a later [`Request::Pass`]
    User(Bytes),
    /// Submits the secret for the pending username
    Pass(Bytes),
    /// Download the catalog entry with this id
    File(u32),
    /// Download a catalog entry chosen at random
    Random,
    /// Begin an upload; the name and body follow only if the server accepts
    Upload,
    /// Orderly end of session. No response is sent.
    Close,
}

impl Request {
    /// The tag that introduces this request
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Request::Echo(_) => Tag::Echo,
            Request::List => Tag::List,
            Request::User(_) => Tag::User,
            Request::Pass(_) => Tag::Pass,
            Request::File(_) => Tag::File,
            Request::Random => Tag::Random,
            Request::Upload => Tag::Upload,
            Request::Close => Tag::Close,
        }
    }

    /// Reads one complete request
    pub async fn read_from<R: ReceivingStream>(r: &mut R) -> Result<Self, ProtocolError> {
        let tag = read_tag(r).await?;
        let Some(shape) = tag.request_shape() else {
            return Err(ProtocolError::UnexpectedTag {
                expected: "a client request",
                got: tag,
            });
        };
        let fields = read_fields(r, shape).await?;
        Ok(match (tag, fields.as_slice()) {
            (Tag::Echo, [Field::Str(s)]) => Request::Echo(s.clone()),
            (Tag::User, [Field::Str(s)]) => Request::User(s.clone()),
            (Tag::Pass, [Field::Str(s)]) => Request::Pass(s.clone()),
            (Tag::File, [Field::Uint32(id)]) => Request::File(*id),
            (Tag::List, []) => Request::List,
            (Tag::Random, []) => Request::Random,
            (Tag::Upload, []) => Request::Upload,
            (Tag::Close, []) => Request::Close,
            (got, _) => {
                return Err(ProtocolError::UnexpectedTag {
                    expected: "a client request",
                    got,
                });
            }
        })
    }

    /// Writes this request. Does not flush.
    pub async fn write_to<W: SendingStream>(&self, w: &mut W) -> Result<(), ProtocolError> {
        let fields = match self {
            Request::Echo(s) | Request::User(s) | Request::Pass(s) => vec![Field::Str(s.clone())],
            Request::File(id) => vec![Field::Uint32(*id)],
            Request::List | Request::Random | Request::Upload | Request::Close => vec![],
        };
        write_frame(w, self.tag(), &fields).await
    }
}

/// One catalog entry as it appears in a listing.
///
/// All three columns travel as strings; the id is its decimal rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingRow {
    /// Decimal record id
    pub id: String,
    /// Display name
    pub name: String,
    /// Storage path on the server
    pub path: String,
}

/// A message sent by the server
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Reply to [`Request::Echo`]
    Echo(Bytes),
    /// Number of [`Response::Row`]s that follow
    ListCount(u32),
    /// One catalog row
    Row(ListingRow),
    /// Request granted
    Accept,
    /// Request refused
    Deny,
    /// A file body follows
    File,
    /// Id of the randomly chosen entry; a file response follows
    Random(u32),
    /// The file does not exist or could not be read
    NoFile,
    /// Upload committed with this id
    Uploaded(u32),
}

impl Response {
    /// The tag that introduces this response
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Response::Echo(_) => Tag::Echo,
            Response::ListCount(_) => Tag::List,
            Response::Row(_) => Tag::Row,
            Response::Accept => Tag::Accept,
            Response::Deny => Tag::Deny,
            Response::File => Tag::File,
            Response::Random(_) => Tag::Random,
            Response::NoFile => Tag::NoFile,
            Response::Uploaded(_) => Tag::Upload,
        }
    }

    /// Writes this response. Does not flush.
    pub async fn write_to<W: SendingStream>(&self, w: &mut W) -> Result<(), ProtocolError> {
        let fields = match self {
            Response::Echo(s) => vec![Field::Str(s.clone())],
            Response::ListCount(n) | Response::Random(n) | Response::Uploaded(n) => {
                vec![Field::Uint32(*n)]
            }
            Response::Row(row) => vec![
                Field::Str(Bytes::copy_from_slice(row.id.as_bytes())),
                Field::Str(Bytes::copy_from_slice(row.name.as_bytes())),
                Field::Str(Bytes::copy_from_slice(row.path.as_bytes())),
            ],
            Response::Accept | Response::Deny | Response::File | Response::NoFile => vec![],
        };
        write_frame(w, self.tag(), &fields).await
    }

    /// Reads one response, which must carry one of the `expected` tags.
    ///
    /// `what` describes the expectation for error reporting.
    pub async fn read_from<R: ReceivingStream>(
        r: &mut R,
        expected: &[Tag],
        what: &'static str,
    ) -> Result<Self, ProtocolError> {
        let tag = read_tag(r).await?;
        let shape = match tag.response_shape() {
            Some(shape) if expected.contains(&tag) => shape,
            _ => {
                return Err(ProtocolError::UnexpectedTag {
                    expected: what,
                    got: tag,
                });
            }
        };
        let fields = read_fields(r, shape).await?;
        Ok(match (tag, fields.as_slice()) {
            (Tag::Echo, [Field::Str(s)]) => Response::Echo(s.clone()),
            (Tag::List, [Field::Uint32(n)]) => Response::ListCount(*n),
            (Tag::Row, [Field::Str(id), Field::Str(name), Field::Str(path)]) => {
                Response::Row(ListingRow {
                    id: String::from_utf8_lossy(id).into_owned(),
                    name: String::from_utf8_lossy(name).into_owned(),
                    path: String::from_utf8_lossy(path).into_owned(),
                })
            }
            (Tag::Accept, []) => Response::Accept,
            (Tag::Deny, []) => Response::Deny,
            (Tag::File, []) => Response::File,
            (Tag::Random, [Field::Uint32(id)]) => Response::Random(*id),
            (Tag::NoFile, []) => Response::NoFile,
            (Tag::Upload, [Field::Uint32(id)]) => Response::Uploaded(*id),
            (got, _) => {
                return Err(ProtocolError::UnexpectedTag {
                    expected: what,
                    got,
                });
            }
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{ListingRow, Request, Response};
    use crate::protocol::{ProtocolError, Tag};
    use crate::util::test_protocol::test_plumbing;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn file_request_layout() {
        let mut mock = Builder::new().write(&[0, 0, 0, 7]).write(&[0, 0, 0, 3]).build();
        Request::File(3).write_to(&mut mock).await.unwrap();
    }

    #[tokio::test]
    async fn user_request_decodes() {
        let mut mock = Builder::new()
            .read(&[0, 0, 0, 2, 0, 0, 0, 5])
            .read(b"alice")
            .build();
        assert_eq!(
            Request::read_from(&mut mock).await.unwrap(),
            Request::User(Bytes::from_static(b"alice"))
        );
    }

    #[tokio::test]
    async fn clients_may_not_send_server_tags() {
        for tag in [Tag::Accept, Tag::Deny, Tag::Row, Tag::NoFile] {
            let mut mock = Builder::new().read(&tag.to_wire().to_be_bytes()).build();
            let e = Request::read_from(&mut mock).await.unwrap_err();
            assert!(matches!(e, ProtocolError::UnexpectedTag { got, .. } if got == tag));
        }
    }

    #[tokio::test]
    async fn oversized_username() {
        let mut mock = Builder::new().read(&[0, 0, 0, 2, 0, 0, 1, 0]).build();
        assert!(matches!(
            Request::read_from(&mut mock).await,
            Err(ProtocolError::FrameTooLarge { declared: 256, .. })
        ));
    }

    #[tokio::test]
    async fn requests_survive_the_wire() {
        let (mut a, mut b) = test_plumbing();
        let sent = [
            Request::Echo(Bytes::from_static(b"ping")),
            Request::List,
            Request::Pass(Bytes::new()),
            Request::File(u32::MAX),
            Request::Close,
        ];
        for r in &sent {
            r.write_to(&mut a.send).await.unwrap();
        }
        for r in sent {
            assert_eq!(Request::read_from(&mut b.recv).await.unwrap(), r);
        }
    }

    #[tokio::test]
    async fn row_response() {
        let (mut a, mut b) = test_plumbing();
        let row = ListingRow {
            id: "12".into(),
            name: "Song".into(),
            path: "/music/song.mp3".into(),
        };
        Response::Row(row.clone()).write_to(&mut a.send).await.unwrap();
        let got = Response::read_from(&mut b.recv, &[Tag::Row], "ROW")
            .await
            .unwrap();
        assert_eq!(got, Response::Row(row));
    }

    #[tokio::test]
    async fn unexpected_response_tag() {
        let (mut a, mut b) = test_plumbing();
        Response::NoFile.write_to(&mut a.send).await.unwrap();
        let e = Response::read_from(&mut b.recv, &[Tag::Accept, Tag::Deny], "ACCEPT or DENY")
            .await
            .unwrap_err();
        assert!(matches!(
            e,
            ProtocolError::UnexpectedTag {
                got: Tag::NoFile,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn uploaded_uses_upload_tag() {
        let mut mock = Builder::new()
            .write(&[0, 0, 0, 10])
            .write(&[0, 0, 0, 9])
            .build();
        Response::Uploaded(9).write_to(&mut mock).await.unwrap();
    }
}
