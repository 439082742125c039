//! Codec module - serialization/deserialization for frame payloads.
//!
//! Two interchangeable formats are supported:
//!
//! - [`JsonCodec`] - JSON via `serde_json`, carried in text frames
//! - [`MsgPackCodec`] - MessagePack via `rmp-serde` (`to_vec_named`), carried
//!   in binary frames
//!
//! The active format is a single server-wide setting. [`Codec`] binds a
//! [`Format`] so callers never pick the frame kind by hand: whatever the codec
//! encodes goes out in the frame kind that matches, letting clients detect the
//! format from the frame alone.
//!
//! # Example
//!
//! ```
//! use wsrpc::codec::{Codec, Format};
//! use wsrpc::protocol::FrameKind;
//!
//! let codec = Codec::new(Format::MsgPack);
//! let frame = codec.encode(&"hello").unwrap();
//! assert_eq!(frame.kind(), FrameKind::Binary);
//!
//! let decoded: String = codec.decode(frame.payload()).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod json;
mod msgpack;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::Result;
use crate::protocol::{Frame, FrameKind, Request};

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// Serialization format for requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON in text frames.
    #[default]
    Json,
    /// MessagePack in binary frames.
    #[serde(alias = "binary")]
    MsgPack,
}

impl Format {
    /// Frame kind that carries this format.
    pub fn frame_kind(self) -> FrameKind {
        match self {
            Self::Json => FrameKind::Text,
            Self::MsgPack => FrameKind::Binary,
        }
    }

    /// Canonical configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "binary" => Ok(Self::MsgPack),
            _ => Err(ConfigError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Codec bound to one [`Format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    format: Format,
}

impl Codec {
    /// Create a codec for the given format.
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    /// The format this codec speaks.
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Encode a value into a frame of the matching kind.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Frame> {
        let bytes = match self.format {
            Format::Json => JsonCodec::encode(value)?,
            Format::MsgPack => MsgPackCodec::encode(value)?,
        };
        Ok(Frame::new(self.format.frame_kind(), bytes))
    }

    /// Decode payload bytes in the configured format.
    pub fn decode<T: serde::de::DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            Format::Json => JsonCodec::decode(bytes),
            Format::MsgPack => MsgPackCodec::decode(bytes),
        }
    }

    /// Decode a request record.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request> {
        self.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;
    use serde_json::json;

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("msgpack".parse::<Format>().unwrap(), Format::MsgPack);
        assert_eq!("binary".parse::<Format>().unwrap(), Format::MsgPack);
        assert_eq!(" JSON ".parse::<Format>().unwrap(), Format::Json);
        assert!("yaml".parse::<Format>().is_err());
    }

    #[test]
    fn test_format_deserialize_alias() {
        let f: Format = serde_json::from_str(r#""binary""#).unwrap();
        assert_eq!(f, Format::MsgPack);
        let f: Format = serde_json::from_str(r#""msgpack""#).unwrap();
        assert_eq!(f, Format::MsgPack);
        assert!(serde_json::from_str::<Format>(r#""xml""#).is_err());
    }

    #[test]
    fn test_frame_kind_matches_format() {
        let json = Codec::new(Format::Json).encode(&json!({"a": 1})).unwrap();
        assert_eq!(json.kind(), FrameKind::Text);
        assert_eq!(json.payload(), br#"{"a":1}"#);

        let msgpack = Codec::new(Format::MsgPack).encode(&json!({"a": 1})).unwrap();
        assert_eq!(msgpack.kind(), FrameKind::Binary);
    }

    #[test]
    fn test_formats_are_not_interchangeable_on_decode() {
        let json_frame = Codec::new(Format::Json)
            .encode(&Request::new("echo", json!(1)))
            .unwrap();
        assert!(Codec::new(Format::MsgPack)
            .decode_request(json_frame.payload())
            .is_err());
    }

    #[test]
    fn test_decode_request_both_formats() {
        for format in [Format::Json, Format::MsgPack] {
            let codec = Codec::new(format);
            let frame = codec.encode(&Request::new("echo", json!({"a": 1}))).unwrap();
            let req = codec.decode_request(frame.payload()).unwrap();
            assert_eq!(req.function.as_deref(), Some("echo"), "{format}");
            assert_eq!(req.data, json!({"a": 1}), "{format}");

            let value: Payload = codec.decode(frame.payload()).unwrap();
            assert_eq!(value["function"], "echo");
        }
    }
}
