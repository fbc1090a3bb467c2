use crate::message::NetworkEnvelope;
use crate::Result;

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame names a payload kind this node does not know.
    #[error("unknown payload kind: {0}")]
    UnknownKind(String),
    #[error("invalid envelope: {0}")]
    InvalidData(String),
}

pub fn encode(envelope: &NetworkEnvelope) -> Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(envelope)?))
}

pub fn decode(frame: &[u8]) -> std::result::Result<NetworkEnvelope, DecodeError> {
    bincode::deserialize(frame).map_err(|err| match *err {
        bincode::ErrorKind::Custom(msg) if msg.contains("variant index") => {
            DecodeError::UnknownKind(msg)
        }
        other => DecodeError::InvalidData(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CloseConnectionMessage, Payload};

    #[test]
    fn test_decode_encoded_envelope() {
        let envelope = NetworkEnvelope::new(Payload::CloseConnection(CloseConnectionMessage::new(
            "RULE_VIOLATION",
        )));
        let frame = encode(&envelope).unwrap();
        assert_eq!(decode(&frame).unwrap(), envelope);
    }

    #[test]
    fn test_decode_unknown_kind() {
        // message version 1, payload variant 99
        let frame = [1u8, 0, 0, 0, 99, 0, 0, 0];
        assert!(matches!(decode(&frame), Err(DecodeError::UnknownKind(_))));
    }

    #[test]
    fn test_decode_truncated() {
        // message version 1, a ping without its fields
        let frame = [1u8, 0, 0, 0, 2, 0, 0, 0];
        assert!(matches!(decode(&frame), Err(DecodeError::InvalidData(_))));
        assert!(matches!(decode(&[]), Err(DecodeError::InvalidData(_))));
    }
}
