//! Frame encoding
//!
//! Text WebSocket frames carry JSON, binary frames carry MessagePack with
//! named fields. Decoding picks the format from the frame kind, so a peer can
//! use either without negotiation.

use serde::{de::DeserializeOwned, Serialize};
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// Encoding used for outgoing frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// JSON in text frames
    #[default]
    Json,
    /// MessagePack in binary frames
    MessagePack,
}

impl FromStr for Codec {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "msgpack" | "messagepack" => Ok(Codec::MessagePack),
            other => Err(ProtocolError::Decode(format!("Unknown codec: {}", other))),
        }
    }
}

/// Transport-neutral data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload
    Text(String),
    /// Binary payload
    Binary(Vec<u8>),
}

impl Codec {
    /// Serialize `value` into a frame of this codec's kind
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Frame> {
        match self {
            Codec::Json => serde_json::to_string(value)
                .map(Frame::Text)
                .map_err(|e| ProtocolError::Encode(e.to_string())),
            Codec::MessagePack => rmp_serde::to_vec_named(value)
                .map(Frame::Binary)
                .map_err(|e| ProtocolError::Encode(e.to_string())),
        }
    }
}

impl Frame {
    /// Codec implied by the frame kind
    pub fn codec(&self) -> Codec {
        match self {
            Frame::Text(_) => Codec::Json,
            Frame::Binary(_) => Codec::MessagePack,
        }
    }

    /// Parse the frame payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Frame::Text(text) => {
                serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
            }
            Frame::Binary(data) => {
                rmp_serde::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
            }
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientFrame;
    use crate::Identity;

    #[test]
    fn test_codec_from_str() {
        assert_eq!("json".parse::<Codec>().unwrap(), Codec::Json);
        assert_eq!("MsgPack".parse::<Codec>().unwrap(), Codec::MessagePack);
        assert!("xml".parse::<Codec>().is_err());
    }

    #[test]
    fn test_frame_kind_follows_codec() {
        let frame = ClientFrame::Register { username: Identity::new("alice").unwrap() };
        assert!(matches!(Codec::Json.encode(&frame).unwrap(), Frame::Text(_)));

        let packed = Codec::MessagePack.encode(&frame).unwrap();
        assert!(matches!(packed, Frame::Binary(_)));
        assert_eq!(packed.codec(), Codec::MessagePack);
        assert_eq!(packed.decode::<ClientFrame>().unwrap(), frame);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let text = Frame::Text("{not json".to_string());
        assert!(matches!(text.decode::<ClientFrame>(), Err(ProtocolError::Decode(_))));

        let binary = Frame::Binary(vec![0xc1, 0x00, 0xff]);
        assert!(matches!(binary.decode::<ClientFrame>(), Err(ProtocolError::Decode(_))));
    }
}
