//! Splits the contiguous byte stream into length-prefixed response frames.
//!
//! Each frame is `length:int32 | correlationId:int32 | body`. Decoding peels
//! off the length prefix and hands the remaining bytes (correlation id still
//! attached) to the caller, which is the `CallbackQueue`'s job to split
//! further and resolve.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::errors::{Error, Result};

/// A decoded response frame: the correlation id it is addressed to, plus
/// the response body bytes (header already stripped of the length prefix).
#[derive(Debug, Clone)]
pub struct Frame {
    pub correlation_id: i32,
    pub body: Bytes,
}

const LENGTH_FIELD_BYTES: usize = 4;
const CORRELATION_ID_BYTES: usize = 4;

/// Frames outbound requests and parses inbound responses. Outbound frames
/// are pre-encoded (the caller already wrote the length prefix, api key,
/// api version, correlation id, and client id), so `encode` is a raw
/// passthrough; only `decode` does real framing work.
#[derive(Default)]
pub struct KafkaFrameCodec;

impl Decoder for KafkaFrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < LENGTH_FIELD_BYTES {
            return Ok(None);
        }

        let len = i32::from_be_bytes(src[..LENGTH_FIELD_BYTES].try_into().unwrap());
        if len < CORRELATION_ID_BYTES as i32 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame length {len} too small to contain a correlation id"),
            )));
        }
        let len = len as usize;

        if src.len() < LENGTH_FIELD_BYTES + len {
            src.reserve(LENGTH_FIELD_BYTES + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_BYTES);
        let mut frame = src.split_to(len);

        let correlation_id = i32::from_be_bytes(frame[..CORRELATION_ID_BYTES].try_into().unwrap());
        frame.advance(CORRELATION_ID_BYTES);

        Ok(Some(Frame {
            correlation_id,
            body: frame.freeze(),
        }))
    }
}

impl Encoder<Bytes> for KafkaFrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_one_complete_frame() {
        let mut codec = KafkaFrameCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&8i32.to_be_bytes());
        buf.extend_from_slice(&123i32.to_be_bytes());
        buf.extend_from_slice(b"ab");

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.correlation_id, 123);
        assert_eq!(&frame.body[..], b"ab");
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_more_bytes_on_partial_frame() {
        let mut codec = KafkaFrameCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&8i32.to_be_bytes());
        buf.extend_from_slice(&123i32.to_be_bytes());
        // only 1 of 2 body bytes arrived
        buf.extend_from_slice(b"a");

        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn splits_two_pipelined_frames_in_one_buffer() {
        let mut codec = KafkaFrameCodec;
        let mut buf = BytesMut::new();
        for (corr, body) in [(1i32, &b"x"[..]), (2i32, &b"yy"[..])] {
            buf.extend_from_slice(&((4 + body.len()) as i32).to_be_bytes());
            buf.extend_from_slice(&corr.to_be_bytes());
            buf.extend_from_slice(body);
        }

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.correlation_id, 1);
        assert_eq!(second.correlation_id, 2);
        assert!(buf.is_empty());
    }
}
