//! Segment payload decoding

use prost::Message;
use thiserror::Error;

use super::wire::SegmentObject;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed segment payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("segment has no segment id")]
    MissingSegmentId,

    #[error("segment has no spans")]
    Empty,
}

/// Decode a segment payload. Malformed payloads are terminal: the caller
/// counts them and moves on, there is nothing to retry.
pub fn decode_segment(bytes: &[u8]) -> Result<SegmentObject, DecodeError> {
    let segment = SegmentObject::decode(bytes)?;
    if segment
        .segment_id
        .as_ref()
        .is_none_or(|id| id.id_parts.is_empty())
    {
        return Err(DecodeError::MissingSegmentId);
    }
    if segment.spans.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::wire::{SpanObject, UniqueId};

    fn valid_segment() -> SegmentObject {
        SegmentObject {
            segment_id: Some(UniqueId {
                id_parts: vec![1, 2, 3],
            }),
            service_id: 1,
            instance_id: 1,
            spans: vec![SpanObject::default()],
        }
    }

    #[test]
    fn test_decode_valid() {
        let bytes = valid_segment().encode_to_vec();
        let segment = decode_segment(&bytes).unwrap();
        assert_eq!(segment.segment_id.unwrap().joined(), "1.2.3");
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        let err = decode_segment(&[0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_segment_id() {
        let mut segment = valid_segment();
        segment.segment_id = None;
        let err = decode_segment(&segment.encode_to_vec()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingSegmentId));
    }

    #[test]
    fn test_decode_empty_segment() {
        let mut segment = valid_segment();
        segment.spans.clear();
        let err = decode_segment(&segment.encode_to_vec()).unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }
}
