//! Resolved image payloads used by the rasterizer.
//!
//! Capture never touches the network. Every `<img>` in a region must either
//! carry a `data:` URL or have its source preloaded into an [`ImageStore`].

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// An image source resolved to a data-embedded payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    /// The `src` as written in the markup
    pub source: String,
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
}

impl EmbeddedImage {
    pub fn new(source: impl Into<String>, mime: &str, bytes: &[u8]) -> Self {
        Self {
            source: source.into(),
            data_url: encode_data_url(mime, bytes),
        }
    }
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split a `data:` URL into its mime type and decoded payload
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::CaptureError("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::CaptureError("malformed data URL: missing ','".into()))?;

    let (mime, is_base64) = match meta.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (meta, false),
    };
    let mime = if mime.is_empty() { "text/plain" } else { mime };

    let bytes = if is_base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::CaptureError(format!("invalid base64 in data URL: {}", e)))?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok((mime.to_string(), bytes))
}

/// Encoded image bytes keyed by the `src` they were loaded from
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    entries: HashMap<String, Arc<Vec<u8>>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from preloaded payloads
    pub fn from_embedded(images: &[EmbeddedImage]) -> Result<Self> {
        let mut store = Self::new();
        for img in images {
            let (_, bytes) = decode_data_url(&img.data_url)?;
            store.insert(img.source.clone(), bytes);
        }
        Ok(store)
    }

    pub fn insert(&mut self, source: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(source.into(), Arc::new(bytes));
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode the image referenced by `src`. Only raster formats decode;
    /// vector sources such as SVG fail with a capture error.
    pub fn resolve(&self, src: &str) -> Result<DynamicImage> {
        if src.starts_with("data:") {
            let (_, bytes) = decode_data_url(src)?;
            return decode(src, &bytes);
        }
        let bytes = self
            .entries
            .get(src)
            .ok_or_else(|| Error::CaptureError(format!("image was not preloaded: {}", src)))?;
        decode(src, bytes)
    }
}

fn decode(src: &str, bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| {
        let shown: String = src.chars().take(64).collect();
        Error::CaptureError(format!("failed to decode image {}: {}", shown, e))
    })
}
