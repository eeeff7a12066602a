//! Format registry: maps a format tag to encode/decode functions.
//!
//! The tag of a path is its lowercase extension, see [`format_of`].

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{BlobError, BlobResult};
use crate::DataObject;

/// Encoder for one format
pub type EncodeFn = fn(&DataObject) -> Result<Vec<u8>, String>;

/// Decoder for one format
pub type DecodeFn = fn(&[u8]) -> Result<DataObject, String>;

#[derive(Clone, Copy)]
struct Codec {
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Registry of codecs keyed by format tag
#[derive(Clone)]
pub struct FormatRegistry {
    codecs: HashMap<String, Codec>,
}

impl FormatRegistry {
    /// Empty registry, nothing can be serialized
    #[must_use]
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registry with `json`, `jsonl` and `txt`
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("json", encode_json, decode_json);
        registry.register("jsonl", encode_jsonl, decode_jsonl);
        registry.register("txt", encode_txt, decode_txt);
        registry
    }

    /// Register a codec, replacing any previous one for the tag
    pub fn register(&mut self, tag: impl Into<String>, encode: EncodeFn, decode: DecodeFn) {
        self.codecs
            .insert(tag.into().to_lowercase(), Codec { encode, decode });
    }

    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.codecs.contains_key(tag)
    }

    /// Registered tags, sorted
    #[must_use]
    pub fn formats(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.codecs.keys().cloned().collect();
        tags.sort();
        tags
    }

    fn codec(&self, tag: &str) -> BlobResult<Codec> {
        self.codecs
            .get(tag)
            .copied()
            .ok_or_else(|| BlobError::UnknownFormat(tag.to_string()))
    }

    /// # Errors
    ///
    /// `UnknownFormat` if no codec is registered, `Serialization` if the codec rejects the object.
    pub fn serialize(&self, object: &DataObject, tag: &str) -> BlobResult<Vec<u8>> {
        let codec = self.codec(tag)?;
        (codec.encode)(object).map_err(|e| BlobError::serialization(tag, e))
    }

    /// # Errors
    ///
    /// `UnknownFormat` if no codec is registered, `Deserialization` on malformed payload.
    pub fn deserialize(&self, content: &[u8], tag: &str) -> BlobResult<DataObject> {
        let codec = self.codec(tag)?;
        (codec.decode)(content).map_err(|e| BlobError::deserialization(tag, e))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

/// Format tag of a path: the lowercase extension without the dot.
///
/// # Errors
///
/// `MissingExtension` if the last segment has no extension.
pub fn format_of(path: &str) -> BlobResult<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
        .ok_or_else(|| BlobError::MissingExtension(path.to_string()))
}

fn encode_json(object: &DataObject) -> Result<Vec<u8>, String> {
    serde_json::to_vec(object).map_err(|e| e.to_string())
}

fn decode_json(content: &[u8]) -> Result<DataObject, String> {
    serde_json::from_slice(content).map_err(|e| e.to_string())
}

fn encode_jsonl(object: &DataObject) -> Result<Vec<u8>, String> {
    let Value::Array(items) = object else {
        return Err("jsonl content must be an array".to_string());
    };
    let mut out = Vec::new();
    for item in items {
        serde_json::to_writer(&mut out, item).map_err(|e| e.to_string())?;
        out.push(b'\n');
    }
    Ok(out)
}

fn decode_jsonl(content: &[u8]) -> Result<DataObject, String> {
    let text = std::str::from_utf8(content).map_err(|e| e.to_string())?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn encode_txt(object: &DataObject) -> Result<Vec<u8>, String> {
    match object {
        Value::String(text) => Ok(text.clone().into_bytes()),
        _ => Err("txt content must be a string".to_string()),
    }
}

fn decode_txt(content: &[u8]) -> Result<DataObject, String> {
    String::from_utf8(content.to_vec())
        .map(Value::String)
        .map_err(|e| e.to_string())
}
