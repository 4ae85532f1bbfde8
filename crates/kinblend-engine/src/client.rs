use std::time::Duration;

use anyhow::{bail, Context, Result};
use kinblend_contracts::image::EncodedImage;
use kinblend_contracts::state::GenerationResult;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::credentials::CredentialStore;
use crate::{non_empty_env, response_json_or_error};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_BLEND_PROMPT: &str = "The first image is a portrait of an adult and the second \
image is a portrait of a child. Create one new photorealistic portrait of the child that blends \
in recognizable facial features of the adult (eye shape, nose, smile, hair colour) while keeping \
the child's age, pose and identity believable. Use soft, natural studio lighting and a neutral \
background. After the image, describe in two or three sentences which features were carried \
over from each photo.";

/// Remote image synthesis: two portraits in, one blended portrait out.
pub trait GenerationClient {
    fn generate(&self, adult: &EncodedImage, child: &EncodedImage) -> Result<GenerationResult>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
    pub prompt: String,
    /// `None` waits for the service as long as it takes.
    pub timeout: Option<Duration>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            prompt: DEFAULT_BLEND_PROMPT.to_string(),
            timeout: None,
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            model: non_empty_env("KINBLEND_IMAGE_MODEL").unwrap_or(defaults.model),
            ..defaults
        }
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

pub struct GeminiClient {
    config: GeminiConfig,
    credentials: CredentialStore,
    http: HttpClient,
}

const API_KEY_HEADER: &str = "x-goog-api-key";

impl GeminiClient {
    /// The HTTP client carries no timeout of its own; only
    /// `GeminiConfig::timeout` bounds a request.
    pub fn new(config: GeminiConfig, credentials: CredentialStore) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            config,
            credentials,
            http,
        })
    }

    fn build_payload(&self, adult: &EncodedImage, child: &EncodedImage) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    image_part(adult),
                    image_part(child),
                    { "text": self.config.prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }

    fn parse_response(response_payload: &Value) -> Result<GenerationResult> {
        if let Some(reason) = response_payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            bail!("Gemini blocked the request ({reason})");
        }

        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut image_url: Option<String> = None;
        let mut texts: Vec<String> = Vec::new();
        let mut finish_reason: Option<String> = None;

        for candidate in &candidates {
            if finish_reason.is_none() {
                finish_reason = candidate
                    .get("finishReason")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            let parts = candidate
                .pointer("/content/parts")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        texts.push(trimmed.to_string());
                    }
                    continue;
                }
                if image_url.is_some() {
                    continue;
                }
                let inline = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                image_url = Some(EncodedImage::new(data, mime_type).to_data_url());
            }
        }

        let Some(image_url) = image_url else {
            match finish_reason {
                Some(reason) => bail!("Gemini returned no image (finish reason: {reason})"),
                None => bail!("Gemini returned no image"),
            }
        };
        let explanation = if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n\n"))
        };
        Ok(GenerationResult {
            image_url,
            explanation,
        })
    }
}

impl GenerationClient for GeminiClient {
    fn generate(&self, adult: &EncodedImage, child: &EncodedImage) -> Result<GenerationResult> {
        let Some(api_key) = self.credentials.get() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set and no key selected");
        };
        let endpoint = self.config.endpoint();
        let payload = self.build_payload(adult, child);
        log::debug!(
            "posting blend request to {endpoint} ({} + {} bytes)",
            adult.decoded_len(),
            child.decoded_len()
        );

        // Header rather than `?key=`: transport errors echo the URL.
        let mut request = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&payload);
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Self::parse_response(&response_payload)
    }
}

fn image_part(image: &EncodedImage) -> Value {
    let mut inline = Map::new();
    inline.insert(
        "mimeType".to_string(),
        Value::String(image.media_type().to_string()),
    );
    inline.insert("data".to_string(), Value::String(image.content().to_string()));
    json!({ "inlineData": inline })
}
