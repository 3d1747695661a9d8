//! Release payload decoding
//!
//! Helm stores each revision as `base64(gzip(json))` in the `release` key of a
//! Secret. Older Helm versions and some plugins wrap that in a second layer of
//! base64, and a few producers skip gzip entirely. [`decode`] accepts all
//! three shapes:
//!
//! ```text
//! GzipBase64        base64 -> gzip -> text
//! GzipDoubleBase64  base64 -> base64 -> gzip -> text
//! PlainBase64       base64 -> text
//! ```

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Serialize;
use std::io::{Read, Write};

use crate::error::{CoreError, Result};

/// First two bytes of every gzip stream
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Standard alphabet, padding optional (some producers strip it)
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encoding pipeline a payload was recognised as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadFormat {
    /// `base64(gzip(text))`, the Helm 3 default
    GzipBase64,
    /// `base64(base64(gzip(text)))`
    GzipDoubleBase64,
    /// `base64(text)` without compression
    PlainBase64,
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadFormat::GzipBase64 => write!(f, "gzip+base64"),
            PayloadFormat::GzipDoubleBase64 => write!(f, "gzip+base64+base64"),
            PayloadFormat::PlainBase64 => write!(f, "base64"),
        }
    }
}

/// Plaintext produced by [`decode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedManifest {
    text: String,
    format: PayloadFormat,
}

impl DecodedManifest {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Decode a raw `release` payload into text
pub fn decode(payload: &[u8]) -> Result<DecodedManifest> {
    let once = base64_decode(payload)
        .map_err(|e| CoreError::decode(format!("payload is not base64: {}", e)))?;

    if once.starts_with(&GZIP_MAGIC) {
        match gunzip_text(&once) {
            Ok(text) => return Ok(decoded(text, PayloadFormat::GzipBase64)),
            Err(reason) => {
                tracing::debug!(%reason, "gzip layer after one base64 decode rejected");
                return Err(CoreError::decode("unrecognized payload encoding"));
            }
        }
    } else {
        match base64_decode(&once) {
            Ok(twice) if twice.starts_with(&GZIP_MAGIC) => match gunzip_text(&twice) {
                Ok(text) => return Ok(decoded(text, PayloadFormat::GzipDoubleBase64)),
                Err(reason) => {
                    tracing::debug!(%reason, "gzip layer after two base64 decodes rejected");
                    return Err(CoreError::decode("unrecognized payload encoding"));
                }
            },
            Ok(_) => tracing::debug!("second base64 layer is not gzip"),
            Err(_) => tracing::debug!("no second base64 layer"),
        }
    }

    // Some producers skip compression entirely
    match String::from_utf8(once) {
        Ok(text) => Ok(decoded(text, PayloadFormat::PlainBase64)),
        Err(_) => Err(CoreError::decode("unrecognized payload encoding")),
    }
}

/// Encode text with the given pipeline, producing the bytes a Secret would hold
pub fn encode(text: &str, format: PayloadFormat) -> Result<Vec<u8>> {
    let encoded = match format {
        PayloadFormat::GzipBase64 => BASE64.encode(gzip(text.as_bytes())?),
        PayloadFormat::GzipDoubleBase64 => BASE64.encode(BASE64.encode(gzip(text.as_bytes())?)),
        PayloadFormat::PlainBase64 => BASE64.encode(text),
    };
    Ok(encoded.into_bytes())
}

fn decoded(text: String, format: PayloadFormat) -> DecodedManifest {
    tracing::debug!(%format, bytes = text.len(), "decoded release payload");
    DecodedManifest { text, format }
}

/// Base64 decode, ignoring ASCII whitespace (line-wrapped payloads)
fn base64_decode(data: &[u8]) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    if data.iter().any(u8::is_ascii_whitespace) {
        let compact: Vec<u8> = data
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        BASE64.decode(compact)
    } else {
        BASE64.decode(data)
    }
}

fn gunzip_text(data: &[u8]) -> std::result::Result<String, String> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| e.to_string())?;
    String::from_utf8(decompressed).map_err(|e| e.to_string())
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CoreError::decode(format!("gzip: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CoreError::decode(format!("gzip: {}", e)))
}
