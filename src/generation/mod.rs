pub mod conversation;
pub mod image_to_image;
pub mod progress;
pub mod refund;
pub mod text_to_image;

use crate::{
    api::ImageBackend,
    config::GenerationPolicy,
    error::{Result, StudioError},
    logger,
    models::{
        AspectRatio, GenerationMode, GenerationRequest, ReferenceImage, RefundRequest, TaskResult,
    },
    uploads::ReferenceSlots,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub use progress::{FnObserver, NoProgress, ProgressChannel, ProgressObserver, ProgressStream};
pub use refund::RefundLedger;

/// Caller input for one generation. The mode is not part of it: it is
/// derived from the reference images and the series flag.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub prompt: String,
    pub reference_images: Vec<ReferenceImage>,
    pub count: usize,
    pub aspect_ratio: AspectRatio,
    pub series_mode: bool,
}

impl GenerateParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: Vec::new(),
            count: 1,
            aspect_ratio: AspectRatio::default(),
            series_mode: false,
        }
    }

    pub fn with_reference_images(mut self, images: Vec<ReferenceImage>) -> Self {
        self.reference_images = images;
        self
    }

    /// Takes the current uploads of a slot store, in upload order.
    pub fn with_reference_slots(mut self, slots: &ReferenceSlots) -> Self {
        self.reference_images = slots.images();
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_series_mode(mut self, series_mode: bool) -> Self {
        self.series_mode = series_mode;
        self
    }
}

/// Counts of a batch-mode run after retries settled. `terminal` holds the
/// first non-retryable error any attempt hit; its slots count as failed.
#[derive(Debug)]
pub(crate) struct BatchOutcome {
    pub success_count: usize,
    pub failed_count: usize,
    pub terminal: Option<StudioError>,
}

/// Splits settled first attempts into retryable failed indices and the
/// first terminal error. Terminal failures are never retried.
pub(crate) fn settle_outcomes(outcomes: Vec<Result<()>>) -> (Vec<usize>, Option<StudioError>) {
    let mut retryable = Vec::new();
    let mut terminal = None;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_terminal() => {
                terminal.get_or_insert(e);
            }
            Err(_) => retryable.push(index),
        }
    }
    (retryable, terminal)
}

pub fn generate_task_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("temp_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Drives text-to-image, image-to-image and series generation against an
/// [`ImageBackend`].
#[derive(Clone)]
pub struct ImageGenerator {
    backend: Arc<dyn ImageBackend>,
    policy: GenerationPolicy,
    refunds: Arc<RefundLedger>,
}

impl ImageGenerator {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            backend,
            policy: GenerationPolicy::default(),
            refunds: Arc::new(RefundLedger::new()),
        }
    }

    pub fn with_policy(mut self, policy: GenerationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    pub fn refund_ledger(&self) -> &RefundLedger {
        &self.refunds
    }

    /// Validates the input and fixes the mode and task id.
    pub fn prepare(&self, params: GenerateParams) -> Result<GenerationRequest> {
        if params.prompt.trim().is_empty() {
            return Err(StudioError::ValidationError("Prompt must not be empty".into()));
        }
        if params.count == 0 {
            return Err(StudioError::ValidationError(
                "At least one image must be requested".into(),
            ));
        }
        for image in &params.reference_images {
            image.validate()?;
        }

        let mode = GenerationMode::detect(params.reference_images.len(), params.series_mode);
        Ok(GenerationRequest {
            prompt: params.prompt,
            reference_images: params.reference_images,
            count: params.count,
            aspect_ratio: params.aspect_ratio,
            task_id: generate_task_id(),
            mode,
        })
    }

    pub async fn generate(
        &self,
        params: GenerateParams,
        observer: &dyn ProgressObserver,
    ) -> Result<TaskResult> {
        let request = self.prepare(params)?;
        self.run(request, observer).await
    }

    pub async fn run(
        &self,
        request: GenerationRequest,
        observer: &dyn ProgressObserver,
    ) -> Result<TaskResult> {
        log::info!(
            "Generation mode: {} | task: {} | references: {} | count: {}",
            request.mode,
            request.task_id,
            request.reference_images.len(),
            request.count
        );
        let _timer = logger::timer(&format!("{} {}", request.mode, request.task_id));
        let backend = self.backend.as_ref();

        if !request.mode.is_batch() {
            return conversation::run(backend, &request, observer).await;
        }

        let tally = progress::ImageTally::new(observer, request.count);
        let outcome = match request.mode {
            GenerationMode::TextToImage => {
                text_to_image::run(backend, &self.policy, &request, &tally).await
            }
            _ => image_to_image::run(backend, &self.policy, &request, &tally).await,
        };
        let images = tally.into_images();

        if let Some(e) = outcome.terminal {
            if images.is_empty() {
                log::error!("[{}] No image produced: {}", request.mode, e);
                return Err(e);
            }
            log::warn!(
                "[{}] Keeping {} image(s) despite: {}",
                request.mode,
                images.len(),
                e
            );
        }

        log::info!(
            "[{}] Finished: {}/{} succeeded, {} failed",
            request.mode,
            outcome.success_count,
            request.count,
            outcome.failed_count
        );

        if outcome.failed_count > 0 {
            refund::compensate(
                backend,
                &self.refunds,
                RefundRequest {
                    task_id: request.task_id.clone(),
                    expected_count: request.count,
                    actual_count: outcome.success_count,
                    mode: request.mode,
                },
            )
            .await;
        }

        Ok(TaskResult {
            images,
            task_id: request.task_id,
            success_count: outcome.success_count,
            failed_count: outcome.failed_count,
            mode: request.mode,
        })
    }
}
