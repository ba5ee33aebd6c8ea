//! Reconfigure envelope: the gzip-compressed JSON object pushed to data
//! planes.

use std::collections::BTreeMap;
use std::io::Read;
use std::io::Write;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::constants::ENVELOPE_TYPE_RECONFIGURE;
use crate::CompatError;
use crate::SnapshotError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub config_table: Map<String, Value>,
    pub config_hash: String,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

impl Envelope {
    pub fn reconfigure(
        config_table: Map<String, Value>,
        config_hash: String,
        hashes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind: ENVELOPE_TYPE_RECONFIGURE.to_string(),
            config_table,
            config_hash,
            hashes,
        }
    }

    /// Serializes and gzips the envelope
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        let json = serde_json::to_vec(self)?;
        Ok(gzip(&json)?)
    }

    /// Inverse of [`Envelope::encode`]. Distinguishes undecodable bytes
    /// from a well-compressed document of the wrong shape.
    pub fn decode(compressed: &[u8]) -> Result<Self, CompatError> {
        let json = gunzip(compressed).map_err(|e| CompatError::CorruptPayload(e.to_string()))?;
        let value: Value = serde_json::from_slice(&json).map_err(|e| CompatError::CorruptPayload(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| CompatError::InvalidDocument(e.to_string()))
    }
}

pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 4), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Decompressed envelope as a JSON value, used for RPC pushes
pub fn decode_value(compressed: &[u8]) -> Result<Value, CompatError> {
    let json = gunzip(compressed).map_err(|e| CompatError::CorruptPayload(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| CompatError::CorruptPayload(e.to_string()))
}
