//! Test helpers for functions dealing with on-wire protocols

use crate::protocol::common::{ReceivingStream, SendReceivePair, SendingStream};

use tokio::io::{ReadHalf, SimplexStream, WriteHalf, simplex};

pub(crate) type TestStreamPair = SendReceivePair<WriteHalf<SimplexStream>, ReadHalf<SimplexStream>>;

impl SendingStream for WriteHalf<SimplexStream> {}
impl ReceivingStream for ReadHalf<SimplexStream> {}

const STREAM_BUFFER_SIZE: usize = 65_536;

/// Two cross-connected stream pairs.
///
/// Each side of the function under test takes one reader and the _opposite_ writer.
pub(crate) fn test_plumbing() -> (TestStreamPair, TestStreamPair) {
    let p1 = simplex(STREAM_BUFFER_SIZE);
    let p2 = simplex(STREAM_BUFFER_SIZE);
    let r1 = (p1.1, p2.0).into();
    let r2 = (p2.1, p1.0).into();
    (r1, r2)
}
