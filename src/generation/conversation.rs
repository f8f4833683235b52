use crate::{
    api::ImageBackend,
    error::Result,
    generation::progress::ProgressObserver,
    models::{
        normalize_images, GenerationRequest, ImageEditPayload, ModelParams, ProgressEvent,
        ProgressStatus, TaskResult, TextGenerationPayload,
    },
};

/// Series generation: one request, the backend decides how many images come
/// back. No retry and no refund.
pub(crate) async fn run(
    backend: &dyn ImageBackend,
    request: &GenerationRequest,
    observer: &dyn ProgressObserver,
) -> Result<TaskResult> {
    let model_params = ModelParams::conversation(request.aspect_ratio);

    let response = if request.reference_images.is_empty() {
        log::info!("[conversation] Sending text-only series request");
        backend
            .generate_from_text(TextGenerationPayload {
                prompt: request.prompt.clone(),
                n: None,
                size: None,
                client_task_id: request.task_id.clone(),
                total_image_count: None,
                model_params,
            })
            .await?
    } else {
        log::info!(
            "[conversation] Sending series request with {} reference image(s)",
            request.reference_images.len()
        );
        backend
            .generate_from_images(ImageEditPayload {
                prompt: request.prompt.clone(),
                task_id: request.task_id.clone(),
                total_image_count: None,
                images: request.reference_images.clone(),
                model_params,
            })
            .await?
    };

    let images = normalize_images(response.images);
    log::info!("[conversation] Backend returned {} image(s)", images.len());

    observer.on_progress(ProgressEvent {
        status: ProgressStatus::Completed,
        images: images.clone(),
        completed: images.len(),
        failed: 0,
        total: images.len(),
    });

    Ok(TaskResult {
        success_count: images.len(),
        failed_count: 0,
        images,
        task_id: request.task_id.clone(),
        mode: request.mode,
    })
}
