use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// An image payload held as base64 text plus its media type.
///
/// Values are never mutated after construction; replacing a slot's image
/// means building a new `EncodedImage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    content: String,
    media_type: String,
}

impl EncodedImage {
    pub fn new(content: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media_type: media_type.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], media_type: &str) -> Self {
        Self::new(BASE64.encode(bytes), media_type)
    }

    /// Parses `data:<type>;base64,<payload>` and keeps only the payload and type.
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let Some(rest) = data_url.trim().strip_prefix("data:") else {
            bail!("not a data URL");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("data URL has no payload separator");
        };
        let Some(media_type) = header.strip_suffix(";base64") else {
            bail!("data URL is not base64 encoded");
        };
        let media_type = if media_type.is_empty() {
            "application/octet-stream"
        } else {
            media_type
        };
        Ok(Self::new(payload, media_type))
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.content)
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.content.as_bytes())
            .context("image payload is not valid base64")
    }

    /// Binary size of the payload, computed from the encoded length.
    pub fn decoded_len(&self) -> usize {
        let len = self.content.len();
        let padding = self.content.bytes().rev().take_while(|b| *b == b'=').count();
        ((len / 4) * 3).saturating_sub(padding.min(2))
    }
}

/// One of the two upload slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Adult,
    Child,
}

impl Slot {
    pub fn label(self) -> &'static str {
        match self {
            Slot::Adult => "adult",
            Slot::Child => "child",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Slot {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "adult" => Ok(Slot::Adult),
            "child" => Ok(Slot::Child),
            other => bail!("unknown slot '{other}' (expected adult or child)"),
        }
    }
}
