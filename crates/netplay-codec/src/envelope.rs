//! Wrapping typed records into frame envelopes and back.

use netplay_frame::{Envelope, FrameError, Options, PayloadFilter, MAX_PAYLOAD};

use crate::error::Result;
use crate::record::NetworkRecord;

/// Encode `record` as the payload of an uncompressed envelope.
pub fn to_envelope<T: NetworkRecord>(type_id: u16, record: &T) -> Result<Envelope> {
    let payload = record.to_bytes()?;
    check_payload(payload.len())?;
    Ok(Envelope::new(type_id, payload))
}

/// Encode `record`, run it through `filter` and mark the envelope compressed.
pub fn to_compressed_envelope<T: NetworkRecord>(
    type_id: u16,
    record: &T,
    filter: &dyn PayloadFilter,
) -> Result<Envelope> {
    let payload = filter.compress(&record.to_bytes()?)?;
    check_payload(payload.len())?;
    Ok(Envelope::with_options(type_id, Options::COMPRESSED, payload))
}

/// Decode the payload of `envelope`, decompressing it first if flagged.
pub fn from_envelope<T: NetworkRecord>(
    envelope: &Envelope,
    filter: &dyn PayloadFilter,
) -> Result<T> {
    if envelope.options().is_compressed() {
        let payload = filter.decompress(envelope.payload())?;
        T::from_bytes(&payload)
    } else {
        T::from_bytes(envelope.payload())
    }
}

fn check_payload(size: usize) -> Result<()> {
    if size > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD,
        }
        .into());
    }
    Ok(())
}
