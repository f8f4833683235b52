use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{GeneratedImage, GenerationMode};

/// History entry from the lite list endpoint: metadata only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSummary {
    pub task_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default, deserialize_with = "lenient_mode")]
    pub mode: Option<GenerationMode>,
    #[serde(default)]
    pub image_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Modes this client does not know become `None` instead of failing the
/// whole task list.
fn lenient_mode<'de, D>(deserializer: D) -> Result<Option<GenerationMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value.clone()) {
        Ok(mode) => Some(mode),
        Err(_) => {
            log::debug!("Unrecognised task mode {}", value);
            None
        }
    }))
}

impl TaskSummary {
    pub fn new(task_id: impl Into<String>, mode: GenerationMode, image_count: usize) -> Self {
        Self {
            task_id: task_id.into(),
            prompt: None,
            aspect_ratio: None,
            mode: Some(mode),
            image_count: Some(image_count),
            created_at: None,
        }
    }

    /// Derived from the mode; the backend flag of the same name is unreliable.
    pub fn has_reference_images(&self) -> bool {
        self.mode.map_or(false, |mode| mode.has_reference_images())
    }

    pub fn is_series(&self) -> bool {
        self.mode == Some(GenerationMode::Conversation)
    }

    pub fn aspect_ratio_or_default(&self) -> &str {
        self.aspect_ratio.as_deref().unwrap_or("1:1")
    }

    /// The prompt cut to `max_chars` characters. A missing prompt gives a
    /// fixed placeholder that is never cut.
    pub fn prompt_preview(&self, max_chars: usize) -> String {
        let prompt = match self.prompt.as_deref() {
            Some(prompt) => prompt,
            None => return "(no prompt)".to_string(),
        };
        if prompt.chars().count() <= max_chars {
            prompt.to_string()
        } else {
            let truncated: String = prompt.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListResponse {
    #[serde(default)]
    pub tasks: Vec<TaskSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDetailResponse {
    #[serde(default)]
    pub task: Option<TaskDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Either a JSON array or a JSON-encoded string holding one.
    #[serde(default)]
    pub generated_images: Option<Value>,
}

impl TaskDetailResponse {
    /// Images of the task. Unparseable payloads count as no images.
    pub fn images(&self) -> Vec<GeneratedImage> {
        self.task
            .as_ref()
            .and_then(|task| task.generated_images.as_ref())
            .map(parse_generated_images)
            .unwrap_or_default()
    }
}

pub fn parse_generated_images(value: &Value) -> Vec<GeneratedImage> {
    let entries = match value {
        Value::Array(entries) => entries.clone(),
        Value::String(encoded) => match serde_json::from_str::<Vec<Value>>(encoded) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Failed to parse generated_images payload: {}", e);
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    entries.iter().filter_map(history_image_url).map(GeneratedImage::new).collect()
}

fn history_image_url(entry: &Value) -> Option<String> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    match entry {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Object(fields) => non_empty(fields.get("url"))
            .or_else(|| non_empty(fields.get("thumbnail_url")))
            .or_else(|| {
                non_empty(fields.get("b64_json"))
                    .map(|b64| format!("data:image/png;base64,{}", b64))
            }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Pending,
    Loading,
    Loaded,
    Empty,
    Error,
}

impl CardState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CardState::Loaded | CardState::Empty | CardState::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTaskResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_derives_reference_flag_from_mode() {
        let summary: TaskSummary = serde_json::from_value(json!({
            "task_id": "t1",
            "prompt": "a fox",
            "mode": "image-to-image",
            "image_count": 2,
            "has_reference_images": false
        }))
        .unwrap();
        assert!(summary.has_reference_images());

        let text = TaskSummary::new("t2", GenerationMode::TextToImage, 4);
        assert!(!text.has_reference_images());
        assert!(TaskSummary::new("t3", GenerationMode::Conversation, 1).is_series());
    }

    #[test]
    fn test_unknown_mode_does_not_break_the_list() {
        let list: TaskListResponse = serde_json::from_value(json!({
            "tasks": [
                { "task_id": "a", "mode": "inpainting", "image_count": 1 },
                { "task_id": "b", "mode": "series" },
                { "task_id": "c", "mode": null },
                { "task_id": "d" }
            ],
            "total": 4
        }))
        .unwrap();

        let modes: Vec<_> = list.tasks.iter().map(|task| task.mode).collect();
        assert_eq!(
            modes,
            vec![None, Some(GenerationMode::Conversation), None, None]
        );
        assert!(!list.tasks[0].has_reference_images());
    }

    #[test]
    fn test_parse_generated_images_variants() {
        let value = json!([
            "https://cdn/a.png",
            { "url": "https://cdn/b.png" },
            { "thumbnail_url": "https://cdn/c_thumb.png" },
            { "b64_json": "AAA" },
            { "other": 1 }
        ]);
        let urls: Vec<String> = parse_generated_images(&value)
            .into_iter()
            .map(|image| image.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn/a.png",
                "https://cdn/b.png",
                "https://cdn/c_thumb.png",
                "data:image/png;base64,AAA"
            ]
        );
    }

    #[test]
    fn test_parse_generated_images_from_string() {
        let encoded = Value::String(r#"[{"url":"https://cdn/a.png"}]"#.to_string());
        assert_eq!(parse_generated_images(&encoded).len(), 1);

        let broken = Value::String("not json".to_string());
        assert!(parse_generated_images(&broken).is_empty());
    }

    #[test]
    fn test_prompt_preview() {
        let mut summary = TaskSummary::new("t", GenerationMode::TextToImage, 1);
        assert_eq!(summary.prompt_preview(10), "(no prompt)");
        assert_eq!(summary.prompt_preview(3), "(no prompt)");
        summary.prompt = Some("a very long prompt indeed".into());
        assert_eq!(summary.prompt_preview(6), "a very...");
        summary.prompt = Some("short".into());
        assert_eq!(summary.prompt_preview(5), "short");
    }
}
