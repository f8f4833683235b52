pub mod loader;

use crate::{
    api::HistoryBackend,
    config::HistoryConfig,
    error::Result,
    models::{DeleteTaskResponse, GeneratedImage, TaskDetailResponse, TaskSummary},
};
use std::sync::Arc;

pub use loader::{HistoryLoader, TaskCard, Viewport};

/// Result of loading one preview in [`HistoryService::batch_load_previews`].
#[derive(Debug, Clone)]
pub enum PreviewOutcome {
    Loaded {
        task_id: String,
        detail: TaskDetailResponse,
    },
    Failed {
        task_id: String,
        error: String,
    },
}

impl PreviewOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            PreviewOutcome::Loaded { task_id, .. } | PreviewOutcome::Failed { task_id, .. } => {
                task_id
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PreviewOutcome::Failed { .. })
    }
}

#[derive(Clone)]
pub struct HistoryService {
    backend: Arc<dyn HistoryBackend>,
    config: HistoryConfig,
}

impl HistoryService {
    pub fn new(backend: Arc<dyn HistoryBackend>, config: HistoryConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Task metadata without image payloads.
    pub async fn list_tasks(&self, limit: Option<usize>) -> Result<Vec<TaskSummary>> {
        let limit = limit.unwrap_or(self.config.task_limit);
        let response = self.backend.list_tasks(limit, true).await?;
        log::info!("Loaded {} history task(s)", response.tasks.len());
        Ok(response.tasks)
    }

    pub async fn task_detail(
        &self,
        task_id: &str,
        max_images: Option<usize>,
        full: bool,
    ) -> Result<TaskDetailResponse> {
        self.backend.task_detail(task_id, max_images, full).await
    }

    /// All original-resolution images of a task.
    pub async fn load_full_images(&self, task_id: &str) -> Result<Vec<GeneratedImage>> {
        let detail = self.backend.task_detail(task_id, None, true).await?;
        Ok(detail.images())
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<DeleteTaskResponse> {
        log::info!("Deleting task {}", task_id);
        self.backend.delete_task(task_id).await
    }

    /// Loads one thumbnail per task, one task after another. Failures are
    /// recorded per task and do not stop the batch.
    pub async fn batch_load_previews(
        &self,
        tasks: &[TaskSummary],
        mut on_progress: impl FnMut(usize, usize, &PreviewOutcome),
    ) -> Vec<PreviewOutcome> {
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            let outcome = match self.backend.task_detail(&task.task_id, Some(1), false).await {
                Ok(detail) => PreviewOutcome::Loaded {
                    task_id: task.task_id.clone(),
                    detail,
                },
                Err(e) => {
                    log::error!("Failed to load preview for {}: {}", task.task_id, e);
                    PreviewOutcome::Failed {
                        task_id: task.task_id.clone(),
                        error: e.to_string(),
                    }
                }
            };
            on_progress(index + 1, tasks.len(), &outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    pub fn loader(&self) -> HistoryLoader {
        HistoryLoader::new(self.backend.clone(), self.config.clone())
    }

    /// Lists tasks and renders them as pending cards of a fresh loader with
    /// observation armed.
    pub async fn open(&self, limit: Option<usize>) -> Result<HistoryLoader> {
        let tasks = self.list_tasks(limit).await?;
        let loader = self.loader();
        loader.render_summaries(tasks);
        loader.start_observing();
        Ok(loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CardState, GenerationMode};
    use crate::testing::{DetailBehavior, MockHistoryBackend};
    use std::sync::atomic::Ordering;

    fn tasks(n: usize) -> Vec<TaskSummary> {
        (0..n)
            .map(|i| TaskSummary::new(format!("t{}", i), GenerationMode::ImageToImage, 3))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_respects_default_limit() {
        let backend = Arc::new(MockHistoryBackend::new().tasks(tasks(12)));
        let service = HistoryService::new(backend.clone(), HistoryConfig::default());

        assert_eq!(service.list_tasks(None).await.unwrap().len(), 8);
        assert_eq!(service.list_tasks(Some(3)).await.unwrap().len(), 3);

        backend.fail_list.store(true, Ordering::SeqCst);
        assert!(service
            .list_tasks(None)
            .await
            .unwrap_err()
            .is_session_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_previews_continue_after_failure() {
        let backend = Arc::new(
            MockHistoryBackend::new()
                .tasks(tasks(3))
                .behavior("t1", DetailBehavior::Fail),
        );
        let service = HistoryService::new(backend, HistoryConfig::default());
        let list = service.list_tasks(None).await.unwrap();

        let mut seen = Vec::new();
        let outcomes = service
            .batch_load_previews(&list, |done, total, outcome| {
                seen.push((done, total, outcome.task_id().to_string()))
            })
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[1].is_failed());
        assert!(!outcomes[2].is_failed());
        if let PreviewOutcome::Loaded { detail, .. } = &outcomes[0] {
            assert_eq!(detail.images().len(), 1);
        } else {
            panic!("expected a loaded preview");
        }
        assert_eq!(seen[2], (3, 3, "t2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_arms_loader_and_delete() {
        let backend = Arc::new(MockHistoryBackend::new().tasks(tasks(2)));
        let service = HistoryService::new(backend.clone(), HistoryConfig::default());
        let loader = service.open(None).await.unwrap();

        assert!(loader.notify_visible("t0"));
        loader.settle().await;
        assert_eq!(loader.state_of("t0"), Some(CardState::Loaded));
        assert_eq!(loader.state_of("t1"), Some(CardState::Pending));

        service.delete_task("t1").await.unwrap();
        assert!(loader.remove_card("t1"));
        assert_eq!(*backend.deleted.lock().unwrap(), vec!["t1".to_string()]);
        assert_eq!(service.load_full_images("t0").await.unwrap().len(), 2);
    }
}
