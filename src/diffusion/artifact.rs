// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generated image artifact

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;

pub const PNG_MIME_TYPE: &str = "image/png";

/// Encoded image produced by a pipeline. The gateway never looks at the
/// pixels, it only carries the bytes and their mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ImageArtifact {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn png(bytes: impl Into<Bytes>) -> Self {
        Self::new(PNG_MIME_TYPE, bytes)
    }

    /// Decode a base64 payload as returned by OpenAI-compatible image APIs
    pub fn from_base64(mime_type: &str, payload: &str) -> Result<Self, base64::DecodeError> {
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self::new(mime_type, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Self-describing `data:` URL, the form the web client renders directly
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}
