use crate::{
    api::client::ApiClient,
    error::{Result, StudioError},
    models::{AspectRatio, GenerationMode, OptimizedPrompt},
};
use reqwest::multipart::Form;

#[derive(Clone)]
pub struct PromptService {
    api: ApiClient,
}

impl PromptService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Asks the backend to rewrite a prompt for the given mode. Does not
    /// require a session.
    pub async fn optimize(
        &self,
        prompt: &str,
        mode: GenerationMode,
        aspect_ratio: AspectRatio,
    ) -> Result<OptimizedPrompt> {
        if prompt.trim().is_empty() {
            return Err(StudioError::ValidationError("Prompt is empty".into()));
        }

        log::info!("Optimizing prompt for {} ({})", mode, aspect_ratio);
        let form = Form::new()
            .text("prompt", prompt.to_string())
            .text("mode", mode.as_str())
            .text("aspect_ratio", aspect_ratio.as_str());
        let path = self.api.endpoints().optimize_prompt.clone();
        self.api.post_multipart(&path, form, false).await
    }
}
