use std::fmt::Write as _;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::options::Options;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Frame header: length (2) + options (1) + type id (2) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Smallest valid declared length: options + type id, empty payload.
pub const MIN_FRAME_LENGTH: u16 = 3;

/// Largest payload that fits behind a u16 length prefix.
pub const MAX_PAYLOAD: usize = u16::MAX as usize - MIN_FRAME_LENGTH as usize;

/// A typed message with its option flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    type_id: u16,
    options: Options,
    payload: Bytes,
}

impl Envelope {
    /// Create an envelope with no options set.
    pub fn new(type_id: u16, payload: impl Into<Bytes>) -> Self {
        Self::with_options(type_id, Options::NONE, payload)
    }

    /// Create an envelope with explicit options.
    pub fn with_options(type_id: u16, options: Options, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            options,
            payload: payload.into(),
        }
    }

    pub fn type_id(&self) -> u16 {
        self.type_id
    }

    pub fn options(&self) -> Options {
        self.options
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Value of the length prefix for this envelope: options + type id + payload.
    pub fn frame_length(&self) -> usize {
        MIN_FRAME_LENGTH as usize + self.payload.len()
    }

    /// The total wire size of this envelope (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a standalone frame buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.type_id, self.options, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Hex dump of the payload, for diagnostics.
    pub fn to_hex(&self) -> String {
        hex_dump(&self.payload)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌─────────────┬─────────────┬──────────────┬─────────────────┐
/// │ Length (2B) │ Options (1B)│ Type id (2B) │ Payload          │
/// │ 3 + payload │ bit0 = zip  │              │ (Length-3 bytes) │
/// └─────────────┴─────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_frame(type_id: u16, options: Options, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16((MIN_FRAME_LENGTH as usize + payload.len()) as u16);
    dst.put_u8(options.bits());
    dst.put_u16(type_id);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; the
/// buffer is left untouched in that case. On success, consumes exactly the
/// frame bytes.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Envelope>> {
    if src.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let declared = u16::from_be_bytes([src[0], src[1]]);
    if declared < MIN_FRAME_LENGTH {
        return Err(FrameError::MalformedLength {
            declared,
            min: MIN_FRAME_LENGTH,
        });
    }

    let total = LENGTH_PREFIX_SIZE + declared as usize;
    if src.len() < total {
        return Ok(None);
    }

    let mut frame = src.split_to(total);
    frame.advance(LENGTH_PREFIX_SIZE);
    let options = Options::from_bits(frame.get_u8());
    let type_id = frame.get_u16();

    Ok(Some(Envelope {
        type_id,
        options,
        payload: frame.freeze(),
    }))
}

/// Space-separated lowercase hex, e.g. `00 05 00 00 01`.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, netplay!";

        encode_frame(7, Options::NONE, payload, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + payload.len());

        let envelope = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.type_id(), 7);
        assert_eq!(envelope.options(), Options::NONE);
        assert_eq!(envelope.payload().as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_wire_layout_string_payload() {
        // Payload is a length-prefixed "hi": 00 02 68 69.
        let envelope = Envelope::new(1, Bytes::from_static(&[0x00, 0x02, 0x68, 0x69]));
        let wire = envelope.encode().unwrap();
        assert_eq!(
            wire.as_ref(),
            &[0x00, 0x07, 0x00, 0x00, 0x01, 0x00, 0x02, 0x68, 0x69]
        );
    }

    #[test]
    fn test_wire_layout_raw_payload() {
        let envelope = Envelope::new(1, Bytes::from_static(b"hi"));
        let wire = envelope.encode().unwrap();
        assert_eq!(hex_dump(&wire), "00 05 00 00 01 68 69");
        assert_eq!(envelope.frame_length(), 5);
        assert_eq!(envelope.wire_size(), 7);
    }

    #[test]
    fn test_options_byte_is_preserved() {
        let envelope = Envelope::with_options(0xBEEF, Options::from_bits(0x81), &b"x"[..]);
        let mut wire = BytesMut::from(envelope.encode().unwrap().as_ref());
        assert_eq!(wire[2], 0x81);
        assert_eq!(&wire[3..5], &[0xBE, 0xEF]);

        let decoded = decode_frame(&mut wire).unwrap().unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_decode_incomplete_payload_leaves_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(1, Options::NONE, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn test_decode_malformed_length() {
        for declared in 0u16..MIN_FRAME_LENGTH {
            let mut buf = BytesMut::new();
            buf.put_u16(declared);
            buf.put_slice(&[0, 0, 0]);
            let result = decode_frame(&mut buf);
            assert!(matches!(
                result,
                Err(FrameError::MalformedLength { declared: d, .. }) if d == declared
            ));
        }
    }

    #[test]
    fn test_encode_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let mut buf = BytesMut::new();
        let result = encode_frame(1, Options::NONE, &payload, &mut buf);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_payload_fits() {
        let payload = vec![0xAB; MAX_PAYLOAD];
        let mut buf = BytesMut::new();
        encode_frame(2, Options::NONE, &payload, &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0xFF, 0xFF]);

        let envelope = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.payload().len(), MAX_PAYLOAD);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, Options::NONE, b"first", &mut buf).unwrap();
        encode_frame(2, Options::COMPRESSED, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(f1.type_id(), 1);
        assert_eq!(f1.payload().as_ref(), b"first");

        let f2 = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(f2.type_id(), 2);
        assert!(f2.options().is_compressed());
        assert_eq!(f2.payload().as_ref(), b"second");

        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(0, Options::NONE, b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x00, 0x03, 0x00, 0x00, 0x00]);

        let envelope = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.type_id(), 0);
        assert!(envelope.payload().is_empty());
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[]), "");
        assert_eq!(hex_dump(&[0x0a, 0xff]), "0a ff");
        assert_eq!(Envelope::new(1, &b"hi"[..]).to_hex(), "68 69");
    }
}
