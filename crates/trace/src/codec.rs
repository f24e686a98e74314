use std::io::{Read, Write};

use apm_core::{ApmError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|e| ApmError::Codec(format!("failed to serialize payload: {e}")))?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

pub fn decode(text: &str) -> Result<Value> {
    decode_as(text)
}

pub fn decode_as<T: DeserializeOwned>(text: &str) -> Result<T> {
    let compressed = STANDARD
        .decode(text.trim())
        .map_err(|e| ApmError::Codec(format!("invalid base64 payload: {e}")))?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| ApmError::Codec(format!("invalid deflate stream: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| ApmError::Codec(format!("invalid json: {e}")))
}

pub async fn encode_async<T>(value: T) -> Result<String>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || encode(&value))
        .await
        .map_err(|e| ApmError::Internal(format!("codec task failed: {e}")))?
}

pub async fn decode_async(text: String) -> Result<Value> {
    tokio::task::spawn_blocking(move || decode(&text))
        .await
        .map_err(|e| ApmError::Internal(format!("codec task failed: {e}")))?
}
