use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::models::{AspectRatio, GenerationMode};

pub const MAX_REFERENCE_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const ACCEPTED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// An uploaded reference image. Cloning copies the bytes, so every clone
/// owns an independent buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ReferenceImage {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !ACCEPTED_IMAGE_TYPES.contains(&self.mime_type.as_str()) {
            return Err(StudioError::ValidationError(
                "Only PNG, JPG or WebP images are accepted".into(),
            ));
        }
        if self.data.len() > MAX_REFERENCE_IMAGE_BYTES {
            return Err(StudioError::ValidationError(
                "Images must not exceed 10MB".into(),
            ));
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Inline preview URL for the upload slot.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

/// Image entry as the backend returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Image as surfaced to callers: only a URL, possibly a data URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
}

impl GeneratedImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Drops the caption and folds inline base64 into a JPEG data URI.
    /// Entries with neither a URL nor inline data yield `None`.
    pub fn from_raw(raw: RawImage) -> Option<Self> {
        match (raw.url, raw.b64_json) {
            (Some(url), _) if !url.is_empty() => Some(Self { url }),
            (_, Some(b64)) if !b64.is_empty() => Some(Self {
                url: format!("data:image/jpeg;base64,{}", b64),
            }),
            _ => None,
        }
    }

    pub fn is_data_uri(&self) -> bool {
        self.url.starts_with("data:")
    }

    /// Decodes a `data:<mime>;base64,` URL into its mime type and bytes.
    /// Returns `None` for remote URLs.
    pub fn decode_data(&self) -> Option<Result<(String, Vec<u8>)>> {
        let rest = self.url.strip_prefix("data:")?;
        Some(
            rest.split_once(";base64,")
                .ok_or_else(|| StudioError::ResponseError("Malformed data URI".into()))
                .and_then(|(mime, payload)| {
                    STANDARD
                        .decode(payload)
                        .map(|bytes| (mime.to_string(), bytes))
                        .map_err(|e| StudioError::ResponseError(e.to_string()))
                }),
        )
    }

    pub fn file_extension(&self) -> &'static str {
        if self.url.starts_with("data:image/png") {
            "png"
        } else if self.url.starts_with("data:image/webp") {
            "webp"
        } else {
            "jpg"
        }
    }
}

pub fn normalize_images(raw: Vec<RawImage>) -> Vec<GeneratedImage> {
    raw.into_iter()
        .filter_map(|image| {
            let normalized = GeneratedImage::from_raw(image);
            if normalized.is_none() {
                log::warn!("Dropping generated image without url or inline data");
            }
            normalized
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResponse {
    #[serde(default)]
    pub images: Vec<RawImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelParams {
    pub response_modalities: Vec<String>,
    pub aspect_ratio: AspectRatio,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GenerationMode>,
}

impl ModelParams {
    pub fn image_only(aspect_ratio: AspectRatio) -> Self {
        Self {
            response_modalities: vec!["Image".to_string()],
            aspect_ratio,
            mode: None,
        }
    }

    pub fn conversation(aspect_ratio: AspectRatio) -> Self {
        Self {
            response_modalities: vec!["Text".to_string(), "Image".to_string()],
            aspect_ratio,
            mode: Some(GenerationMode::Conversation),
        }
    }
}

/// JSON body of the generate-from-text endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextGenerationPayload {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<AspectRatio>,
    pub client_task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_image_count: Option<usize>,
    pub model_params: ModelParams,
}

/// Multipart body of the edit/generate-from-images endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEditPayload {
    pub prompt: String,
    pub task_id: String,
    pub total_image_count: Option<usize>,
    pub images: Vec<ReferenceImage>,
    pub model_params: ModelParams,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RefundRequest {
    pub task_id: String,
    pub expected_count: usize,
    pub actual_count: usize,
    pub mode: GenerationMode,
}

/// Normalized generation input. The mode is fixed here and never
/// re-derived by the per-mode runners.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<ReferenceImage>,
    pub count: usize,
    pub aspect_ratio: AspectRatio,
    pub task_id: String,
    pub mode: GenerationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub images: Vec<GeneratedImage>,
    pub task_id: String,
    pub success_count: usize,
    pub failed_count: usize,
    pub mode: GenerationMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub images: Vec<GeneratedImage>,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}
