//! Primitive wire encoding
//!
//! * Integers are 4 bytes, unsigned, big-endian.
//! * Strings are a `u32` length followed by exactly that many raw bytes,
//!   with no terminator and no declared character encoding.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

use super::common::{ReceivingStream, SendingStream};
use super::tag::{Primitive, Tag};
use super::ProtocolError;

/// One decoded payload field
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// See [`Primitive::Uint32`]
    Uint32(u32),
    /// See [`Primitive::Str`]
    Str(Bytes),
}

/// Writes a single integer
pub async fn write_u32<W: SendingStream>(w: &mut W, value: u32) -> Result<(), ProtocolError> {
    w.write_all(&value.to_be_bytes()).await?;
    Ok(())
}

/// Reads a single integer
pub async fn read_u32<R: ReceivingStream>(r: &mut R) -> Result<u32, ProtocolError> {
    let mut buf = [0u8; 4];
    let _ = r.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Writes a length-prefixed string
pub async fn write_string<W: SendingStream>(w: &mut W, s: &[u8]) -> Result<(), ProtocolError> {
    let len = u32::try_from(s.len()).map_err(|_| ProtocolError::FrameTooLarge {
        declared: s.len() as u64,
        limit: u64::from(u32::MAX),
    })?;
    write_u32(w, len).await?;
    w.write_all(s).await?;
    Ok(())
}

/// Reads a length-prefixed string.
///
/// The declared length is checked against `max_len` before any payload is read,
/// so a hostile length costs us nothing.
pub async fn read_string<R: ReceivingStream>(
    r: &mut R,
    max_len: u32,
) -> Result<Bytes, ProtocolError> {
    let len = read_u32(r).await?;
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge {
            declared: u64::from(len),
            limit: u64::from(max_len),
        });
    }
    let mut buf = BytesMut::zeroed(len as usize);
    let _ = r.read_exact(&mut buf).await?;
    Ok(buf.freeze())
}

/// Reads a tag value and decodes it
pub async fn read_tag<R: ReceivingStream>(r: &mut R) -> Result<Tag, ProtocolError> {
    Tag::from_wire(read_u32(r).await?)
}

/// Writes a tag
pub async fn write_tag<W: SendingStream>(w: &mut W, tag: Tag) -> Result<(), ProtocolError> {
    write_u32(w, tag.to_wire()).await
}

/// Reads the fields described by `shape`, in order
pub async fn read_fields<R: ReceivingStream>(
    r: &mut R,
    shape: &[Primitive],
) -> Result<Vec<Field>, ProtocolError> {
    let mut fields = Vec::with_capacity(shape.len());
    for p in shape {
        fields.push(match p {
            Primitive::Uint32 => Field::Uint32(read_u32(r).await?),
            Primitive::Str { max_len } => Field::Str(read_string(r, *max_len).await?),
        });
    }
    Ok(fields)
}

/// Writes a tag and its fields.
///
/// The fields must match the tag's shape in the given direction; that is a programming error, not a wire error.
pub async fn write_frame<W: SendingStream>(
    w: &mut W,
    tag: Tag,
    fields: &[Field],
) -> Result<(), ProtocolError> {
    write_tag(w, tag).await?;
    for f in fields {
        match f {
            Field::Uint32(v) => write_u32(w, *v).await?,
            Field::Str(s) => write_string(w, s).await?,
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{Field, read_fields, read_string, read_tag, read_u32, write_string, write_u32};
    use crate::protocol::{Primitive, ProtocolError};
    use pretty_assertions::assert_eq;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn u32_is_big_endian() {
        let mut mock = Builder::new().write(&[0, 0, 0x0d, 0xcf]).build();
        write_u32(&mut mock, 3535).await.unwrap();

        let mut mock = Builder::new().read(&[0x01, 0x02, 0x03, 0x04]).build();
        assert_eq!(read_u32(&mut mock).await.unwrap(), 0x0102_0304);
    }

    #[tokio::test]
    async fn string_has_no_terminator() {
        let mut mock = Builder::new()
            .write(&[0, 0, 0, 5])
            .write(b"hello")
            .build();
        write_string(&mut mock, b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn empty_string() {
        let mut mock = Builder::new().read(&[0, 0, 0, 0]).build();
        let s = read_string(&mut mock, 10).await.unwrap();
        assert!(s.is_empty());
    }

    #[tokio::test]
    async fn string_may_arrive_in_pieces() {
        let mut mock = Builder::new()
            .read(&[0, 0])
            .read(&[0, 3, b'a'])
            .read(b"bc")
            .build();
        let s = read_string(&mut mock, 10).await.unwrap();
        assert_eq!(&s[..], b"abc");
    }

    #[tokio::test]
    async fn oversized_string_rejected_before_payload() {
        // Only the length is supplied; reading any payload would fail the mock
        let mut mock = Builder::new().read(&[0, 0, 1, 0]).build();
        let e = read_string(&mut mock, 255).await.unwrap_err();
        assert!(matches!(
            e,
            ProtocolError::FrameTooLarge {
                declared: 256,
                limit: 255
            }
        ));
    }

    #[tokio::test]
    async fn truncated_string_is_transport_error() {
        let mut mock = Builder::new().read(&[0, 0, 0, 5]).read(b"ab").build();
        let e = read_string(&mut mock, 10).await.unwrap_err();
        assert!(e.is_disconnect());
    }

    #[tokio::test]
    async fn unknown_tag() {
        let mut mock = Builder::new().read(&[0, 0, 0, 42]).build();
        assert!(matches!(
            read_tag(&mut mock).await,
            Err(ProtocolError::UnknownTag(42))
        ));
    }

    #[tokio::test]
    async fn shaped_read() {
        let mut mock = Builder::new()
            .read(&[0, 0, 0, 7])
            .read(&[0, 0, 0, 2, b'h', b'i'])
            .build();
        let fields = read_fields(
            &mut mock,
            &[Primitive::Uint32, Primitive::Str { max_len: 8 }],
        )
        .await
        .unwrap();
        assert_eq!(
            fields,
            vec![Field::Uint32(7), Field::Str(bytes::Bytes::from_static(b"hi"))]
        );
    }
}
