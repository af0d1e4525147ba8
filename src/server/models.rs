use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::layout::LabelLayout;
use crate::offsets::OffsetStore;

#[derive(Debug, Deserialize)]
pub(crate) struct DetectRequest {
    pub(crate) image_base64: String,
    pub(crate) lang: Option<String>,
    pub(crate) key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DetectResponse {
    pub(crate) status: &'static str,
    pub(crate) annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LayoutRequest {
    pub(crate) width: f32,
    pub(crate) height: f32,
    pub(crate) annotations: Vec<Annotation>,
    #[serde(default)]
    pub(crate) offsets: OffsetStore,
}

#[derive(Debug, Serialize)]
pub(crate) struct LayoutResponse {
    pub(crate) layouts: Vec<LabelLayout>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExportRequest {
    pub(crate) image_base64: String,
    pub(crate) annotations: Vec<Annotation>,
    #[serde(default)]
    pub(crate) offsets: OffsetStore,
    pub(crate) format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditRequest {
    pub(crate) image_base64: String,
    pub(crate) instruction: String,
    pub(crate) key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageResponse {
    pub(crate) mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) height: Option<u32>,
    pub(crate) data_base64: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
