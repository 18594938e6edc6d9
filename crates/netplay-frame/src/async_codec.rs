//! `tokio_util::codec` adapter for the envelope wire format.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Envelope};
use crate::error::FrameError;

/// Frames a tokio byte stream into [`Envelope`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec;

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src)? {
            Some(envelope) => Ok(Some(envelope)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item.type_id(), item.options(), item.payload(), dst)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::options::Options;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(64);
        let mut writer = FramedWrite::new(left, EnvelopeCodec);
        let mut reader = FramedRead::new(right, EnvelopeCodec);

        let sent = vec![
            Envelope::new(1, Bytes::from_static(b"hello")),
            Envelope::with_options(2, Options::COMPRESSED, Bytes::from_static(b"")),
            Envelope::new(3, Bytes::from(vec![7u8; 300])),
        ];
        let to_send = sent.clone();
        let send_task = tokio::spawn(async move {
            for envelope in to_send {
                writer.send(envelope).await.unwrap();
            }
        });

        for expected in &sent {
            let got = reader.next().await.unwrap().unwrap();
            assert_eq!(&got, expected);
        }
        send_task.await.unwrap();
    }

    #[test]
    fn decode_eof_with_partial_frame_is_an_error() {
        let mut codec = EnvelopeCodec;
        let mut buf = BytesMut::from(&[0x00, 0x05, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn decode_eof_on_empty_buffer_is_clean() {
        let mut codec = EnvelopeCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }
}
