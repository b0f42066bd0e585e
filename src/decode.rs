use crate::models::PointSample;
use base64::prelude::*;
use flate2::read::GzDecoder;
use std::io::Read;

#[derive(Debug)]
pub enum DecodeError {
    Base64(base64::DecodeError),
    Decompress(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Base64(e) => write!(f, "point blob is not valid base64: {e}"),
            DecodeError::Decompress(e) => write!(f, "point blob failed to decompress: {e}"),
            DecodeError::Json(e) => write!(f, "decompressed point data is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode the vendor's compressed point stream: a base64 text wrapping a
/// gzip stream wrapping a JSON array of point objects. Point order is the
/// recording order and is preserved.
pub fn decode_point_stream(blob: &str) -> Result<Vec<PointSample>, DecodeError> {
    let compressed = BASE64_STANDARD
        .decode(blob.trim())
        .map_err(DecodeError::Base64)?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(DecodeError::Decompress)?;

    serde_json::from_slice(&raw).map_err(DecodeError::Json)
}
