use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::retry::{RetryPolicy, is_rate_limited, is_transient, retry_after};
use super::{EditedImage, ProviderFuture, VisionProvider};
use crate::annotation::{Annotation, RawAnnotation, collect_annotations};
use crate::state::SourceImage;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_DETECT_MODEL: &str = "gemini-2.5-flash";
pub(crate) const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    detect_model: String,
    edit_model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            detect_model: DEFAULT_DETECT_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            base_url: BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_detect_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.detect_model = model;
        }
        self
    }

    pub fn with_edit_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.edit_model = model;
        }
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn generate(&self, model: &str, body: &Value) -> Result<String> {
        let client = reqwest::Client::new();
        let url = format!("{}/{}:generateContent", self.base_url, model);
        let mut attempt = 0usize;
        let mut delay = self.retry.base_delay;
        loop {
            attempt += 1;
            let sent = client
                .post(&url)
                .header("x-goog-api-key", self.key.clone())
                .json(body)
                .send()
                .await;
            let response = match sent {
                Ok(response) => response,
                Err(err) if is_transient(&err) && self.retry.allows_another(attempt) => {
                    delay = self.retry.wait(attempt, delay, None, "unreachable").await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let status = response.status();
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return Ok(text);
            }
            if is_rate_limited(status, &text) && self.retry.allows_another(attempt) {
                delay = self.retry.wait(attempt, delay, retry_after, "rate limited").await;
                continue;
            }
            return Err(anyhow!(
                "Gemini API error ({}): {}",
                status,
                extract_gemini_error(&text).unwrap_or(text)
            ));
        }
    }
}

impl VisionProvider for Gemini {
    fn detect(&self, image: &SourceImage, target_lang: &str) -> ProviderFuture<Vec<Annotation>> {
        let provider = self.clone();
        let body = detect_request(image, target_lang);
        Box::pin(async move {
            let text = provider.generate(&provider.detect_model, &body).await?;
            let annotations = extract_annotations(&text)?;
            info!("Gemini detected {} text region(s)", annotations.len());
            Ok(annotations)
        })
    }

    fn edit(&self, image: &SourceImage, instruction: &str) -> ProviderFuture<EditedImage> {
        let provider = self.clone();
        let body = edit_request(image, instruction);
        Box::pin(async move {
            let text = provider.generate(&provider.edit_model, &body).await?;
            extract_edited_image(&text)
        })
    }
}

fn image_part(image: &SourceImage) -> Value {
    json!({
        "inline_data": {
            "mime_type": image.mime,
            "data": BASE64.encode(&image.bytes)
        }
    })
}

pub(crate) fn detect_prompt(target_lang: &str) -> String {
    format!(
        "Find every piece of text in this image and translate it into {lang}. \
         Return one entry per text region with the exact original text, its translation, \
         and box_2d as [ymin, xmin, ymax, xmax] normalized to 0-1000. \
         Return an empty array if the image contains no text.",
        lang = target_lang
    )
}

fn detect_request(image: &SourceImage, target_lang: &str) -> Value {
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [image_part(image), {"text": detect_prompt(target_lang)}]
            }
        ],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "original": {"type": "STRING"},
                        "translation": {"type": "STRING"},
                        "box_2d": {"type": "ARRAY", "items": {"type": "INTEGER"}}
                    },
                    "required": ["original", "translation", "box_2d"]
                }
            }
        }
    })
}

fn edit_request(image: &SourceImage, instruction: &str) -> Value {
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [image_part(image), {"text": instruction}]
            }
        ],
        "generationConfig": {
            "responseModalities": ["IMAGE"]
        }
    })
}

fn first_content(payload: GeminiResponse) -> Result<GeminiContent> {
    payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))
}

pub(crate) fn extract_annotations(text: &str) -> Result<Vec<Annotation>> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let content = first_content(payload)?;
    let body = content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    let body = strip_code_fence(&body);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawAnnotation> = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse annotations from Gemini: {}", err))?;
    debug!("Gemini returned {} raw annotation(s)", raw.len());
    Ok(collect_annotations(raw))
}

pub(crate) fn extract_edited_image(text: &str) -> Result<EditedImage> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let content = first_content(payload)?;
    let inline = content
        .parts
        .into_iter()
        .find_map(|part| part.inline_data)
        .ok_or_else(|| anyhow!("no image returned from Gemini"))?;
    let bytes = BASE64
        .decode(inline.data.trim())
        .map_err(|err| anyhow!("failed to decode Gemini image data: {}", err))?;
    Ok(EditedImage {
        bytes,
        mime: inline.mime_type,
    })
}

fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(status) = error.status
        && !status.trim().is_empty()
    {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        Some("unknown error".to_string())
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}
