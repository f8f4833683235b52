use crate::{
    api::client::{edit_form, refund_form, ApiClient},
    error::Result,
    models::{
        DeleteTaskResponse, GenerationResponse, ImageEditPayload, RefundRequest,
        TaskDetailResponse, TaskListResponse, TextGenerationPayload,
    },
};
use async_trait::async_trait;
use serde_json::Value;

/// Generation side of the studio backend.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate_from_text(&self, payload: TextGenerationPayload)
        -> Result<GenerationResponse>;

    async fn generate_from_images(&self, payload: ImageEditPayload) -> Result<GenerationResponse>;

    async fn refund(&self, request: RefundRequest) -> Result<Value>;

    fn is_authenticated(&self) -> bool;
}

/// Task history side of the studio backend.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn list_tasks(&self, limit: usize, lite: bool) -> Result<TaskListResponse>;

    async fn task_detail(
        &self,
        task_id: &str,
        max_images: Option<usize>,
        full: bool,
    ) -> Result<TaskDetailResponse>;

    async fn delete_task(&self, task_id: &str) -> Result<DeleteTaskResponse>;
}

#[async_trait]
impl ImageBackend for ApiClient {
    async fn generate_from_text(
        &self,
        payload: TextGenerationPayload,
    ) -> Result<GenerationResponse> {
        let path = self.endpoints().generate_image.clone();
        self.post_json(&path, &payload, self.is_authenticated()).await
    }

    async fn generate_from_images(&self, payload: ImageEditPayload) -> Result<GenerationResponse> {
        let path = self.endpoints().edit_image.clone();
        let form = edit_form(payload)?;
        self.post_multipart(&path, form, self.is_authenticated()).await
    }

    async fn refund(&self, request: RefundRequest) -> Result<Value> {
        let path = self.endpoints().refund.clone();
        self.post_multipart(&path, refund_form(&request), true).await
    }

    fn is_authenticated(&self) -> bool {
        self.credentials().is_authenticated()
    }
}

#[async_trait]
impl HistoryBackend for ApiClient {
    async fn list_tasks(&self, limit: usize, lite: bool) -> Result<TaskListResponse> {
        let mut path = format!("{}?limit={}", self.endpoints().user_tasks, limit);
        if lite {
            path.push_str("&lite=1");
        }
        self.get(&path, true).await
    }

    async fn task_detail(
        &self,
        task_id: &str,
        max_images: Option<usize>,
        full: bool,
    ) -> Result<TaskDetailResponse> {
        self.get(&detail_path(&self.endpoints().user_tasks, task_id, max_images, full), true)
            .await
    }

    async fn delete_task(&self, task_id: &str) -> Result<DeleteTaskResponse> {
        let path = format!("{}/{}", self.endpoints().user_tasks, task_id);
        self.delete(&path, true).await
    }
}

fn detail_path(base: &str, task_id: &str, max_images: Option<usize>, full: bool) -> String {
    let mut path = format!("{}/{}?full={}", base, task_id, if full { 1 } else { 0 });
    if let Some(max) = max_images.filter(|max| *max > 0) {
        path.push_str(&format!("&max_images={}", max));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_path() {
        assert_eq!(
            detail_path("/users/me/tasks", "t1", None, false),
            "/users/me/tasks/t1?full=0"
        );
        assert_eq!(
            detail_path("/users/me/tasks", "t1", Some(1), true),
            "/users/me/tasks/t1?full=1&max_images=1"
        );
    }
}
