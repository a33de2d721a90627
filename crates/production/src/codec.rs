//! Message encoding for network transport.
//!
//! # Wire Format
//!
//! Each length-delimited frame carries:
//!
//! ```text
//! [version: u8][payload: bincode-encoded Envelope]
//! ```
//!
//! Frames are produced and consumed through `tokio_util`'s
//! `LengthDelimitedCodec`; this module handles the payload inside a frame.

use hawklock_messages::Envelope;
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("frame too short")]
    FrameTooShort,

    #[error("encode error: {0}")]
    Encode(#[source] bincode::Error),

    #[error("decode error: {0}")]
    Decode(#[source] bincode::Error),
}

/// Encode an envelope into a frame payload.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(envelope).map_err(CodecError::Encode)?;
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    Ok(bytes)
}

/// Decode a frame payload into an envelope.
pub fn decode(data: &[u8]) -> Result<Envelope, CodecError> {
    let (&version, payload) = data.split_first().ok_or(CodecError::FrameTooShort)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    bincode::deserialize(payload).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawklock_messages::Message;
    use hawklock_types::{LockMode, NodeId, ResourceId, TransactionId, WaitForGraph};

    #[test]
    fn envelope_round_trips() {
        let envelope = Envelope {
            sender: NodeId(2),
            receiver: NodeId(1),
            message: Message::LockRequest {
                txn: TransactionId::new(NodeId(2), 7),
                resource: ResourceId(42),
                mode: LockMode::Exclusive,
            },
        };
        let bytes = encode(&envelope).unwrap();
        assert_eq!(decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn wfg_report_round_trips() {
        let mut wfg = WaitForGraph::new();
        wfg.add_edge(
            TransactionId::new(NodeId(1), 1),
            TransactionId::new(NodeId(2), 1),
        );
        let envelope = Envelope {
            sender: NodeId(1),
            receiver: NodeId(3),
            message: Message::WfgReport { wfg },
        };
        let bytes = encode(&envelope).unwrap();
        assert_eq!(decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let envelope = Envelope {
            sender: NodeId(1),
            receiver: NodeId(2),
            message: Message::PagRequest,
        };
        let mut bytes = encode(&envelope).unwrap();
        bytes[0] = 99;
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::UnknownVersion(99))
        ));
    }

    #[test]
    fn empty_frame_is_rejected() {
        assert!(matches!(decode(&[]), Err(CodecError::FrameTooShort)));
    }
}
