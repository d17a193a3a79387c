use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sample encoding of a chunk payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// 32-bit little-endian float
    F32,
    /// 16-bit little-endian signed integer
    I16,
}

impl WireFormat {
    /// Byte width of one sample.
    pub fn sample_width(self) -> usize {
        match self {
            WireFormat::F32 => 4,
            WireFormat::I16 => 2,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::F32 => write!(f, "f32"),
            WireFormat::I16 => write!(f, "i16"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "f32le" | "32f" => Ok(WireFormat::F32),
            "i16" | "i16le" | "16" => Ok(WireFormat::I16),
            other => Err(format!("unknown sample format tag: {other}")),
        }
    }
}

/// Control messages sent by the recording client over the duplex
/// channel. Every binary frame is preceded by a `chunk_meta` carrying
/// its sequence number; ordering on the server never depends on
/// arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Register {
        #[serde(default)]
        session_id: Option<String>,
        sample_rate: u32,
        channels: u16,
        format: WireFormat,
        /// Samples per full chunk, when the client segments uniformly.
        /// Lets the assembler pad sequence gaps with silence.
        #[serde(default)]
        chunk_samples: Option<usize>,
    },
    ChunkMeta {
        seq: u64,
        #[serde(default)]
        valid_samples: Option<usize>,
    },
    Finish {
        #[serde(default)]
        last_seq: Option<u64>,
        #[serde(default)]
        target_sample_rate: Option<u32>,
    },
    Ping,
}

/// Replies sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Registered {
        session_id: String,
    },
    Saved {
        seq: u64,
    },
    Processing,
    Result {
        session_id: String,
        url: String,
        total_samples: u64,
        sample_rate: u32,
        channels: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    Error {
        message: String,
    },
    Pong,
}

/// JSON body returned by the HTTP finish endpoint (and consumed by the
/// HTTP uploader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishResponse {
    pub session_id: String,
    pub url: String,
    pub total_samples: u64,
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_round_trip_with_stable_tags() {
        let register = ClientMessage::Register {
            session_id: Some("rec-1".into()),
            sample_rate: 48_000,
            channels: 1,
            format: WireFormat::F32,
            chunk_samples: Some(96_000),
        };
        let json = serde_json::to_value(&register).unwrap();
        assert_eq!(json["type"], "register");
        assert_eq!(json["format"], "f32");
        let back: ClientMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, register);

        let meta = ClientMessage::ChunkMeta {
            seq: 7,
            valid_samples: None,
        };
        assert_eq!(serde_json::to_value(&meta).unwrap()["type"], "chunk_meta");
    }

    #[test]
    fn server_result_omits_missing_transcript() {
        let result = ServerMessage::Result {
            session_id: "rec-1".into(),
            url: "/recordings/rec-1/final/rec-1.wav".into(),
            total_samples: 88_200,
            sample_rate: 44_100,
            channels: 1,
            transcript: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "result");
        assert!(json.get("transcript").is_none());
    }

    #[test]
    fn format_tags_parse_from_header_values() {
        assert_eq!("f32".parse::<WireFormat>().unwrap(), WireFormat::F32);
        assert_eq!("32f".parse::<WireFormat>().unwrap(), WireFormat::F32);
        assert_eq!("I16".parse::<WireFormat>().unwrap(), WireFormat::I16);
        assert!("pcm24".parse::<WireFormat>().is_err());
    }
}
