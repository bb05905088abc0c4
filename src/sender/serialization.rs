use crate::event::Event;
use bytes::Bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("msgpack encoding failed: {0}")]
    Msgpack(#[from] rmp_serde::encode::Error),
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-the-wire encoding for forwarded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Compact binary MessagePack (default).
    #[default]
    Msgpack,
    /// Newline-delimited JSON arrays.
    Json,
}

/// Serializes one event to its wire record. Records are framed implicitly:
/// msgpack values are self-delimiting, JSON records carry a trailing
/// newline.
pub fn encode(event: &Event, format: WireFormat) -> Result<Bytes, SerializationError> {
    let bytes = match format {
        WireFormat::Msgpack => rmp_serde::to_vec(event)?,
        WireFormat::Json => {
            let mut buf = serde_json::to_vec(event)?;
            buf.push(b'\n');
            buf
        }
    };
    Ok(Bytes::from(bytes))
}
