use crate::{
    api::ImageBackend,
    config::GenerationPolicy,
    error::{Result, StudioError},
    generation::{progress::ImageTally, BatchOutcome},
    models::{
        normalize_images, GeneratedImage, GenerationRequest, ImageEditPayload, ModelParams,
        ReferenceImage,
    },
};
use futures::future::join_all;

pub(crate) async fn run(
    backend: &dyn ImageBackend,
    policy: &GenerationPolicy,
    request: &GenerationRequest,
    tally: &ImageTally<'_>,
) -> BatchOutcome {
    let count = request.count;
    if request.reference_images.len() > policy.max_reference_images {
        log::warn!(
            "[image-to-image] {} reference images supplied, using the first {}",
            request.reference_images.len(),
            policy.max_reference_images
        );
    }
    let references: Vec<ReferenceImage> = request
        .reference_images
        .iter()
        .take(policy.max_reference_images)
        .cloned()
        .collect();

    // Every slot owns its own buffers before anything is dispatched.
    let copies: Vec<Vec<ReferenceImage>> = (0..count).map(|_| references.clone()).collect();
    log::debug!(
        "[image-to-image] Prepared {} reference copies of {} image(s)",
        copies.len(),
        references.len()
    );

    let mut slots = copies
        .into_iter()
        .enumerate()
        .map(|(index, images)| run_slot(backend, policy, request, tally, index, images));

    let results = if count <= policy.image_full_concurrency_limit {
        log::info!("[image-to-image] Dispatching all {} requests", count);
        join_all(slots).await
    } else {
        let first: Vec<_> = slots.by_ref().take(policy.first_batch_size.max(1)).collect();
        let rest: Vec<_> = slots.collect();
        log::info!("[image-to-image] Batch 1: {} requests", first.len());

        let paced = async {
            tokio::time::sleep(policy.image_batch_pacing).await;
            log::info!("[image-to-image] Batch 2: {} requests", rest.len());
            join_all(rest).await
        };
        let (mut batch1, batch2) = tokio::join!(join_all(first), paced);
        batch1.extend(batch2);
        batch1
    };

    let mut success_count = 0;
    let mut terminal = None;
    for result in results {
        match result {
            Ok(true) => success_count += 1,
            Ok(false) => {}
            Err(e) => {
                terminal.get_or_insert(e);
            }
        }
    }

    BatchOutcome {
        success_count,
        failed_count: count - success_count,
        terminal,
    }
}

/// One requested image: an attempt plus a single delayed retry. Returns
/// whether the slot produced images. A terminal error is not retried; the
/// slot is recorded as failed and the error handed back.
async fn run_slot(
    backend: &dyn ImageBackend,
    policy: &GenerationPolicy,
    request: &GenerationRequest,
    tally: &ImageTally<'_>,
    index: usize,
    references: Vec<ReferenceImage>,
) -> Result<bool> {
    let outcome = match send(backend, request, references.clone()).await {
        Err(e) if !e.is_terminal() => {
            log::warn!(
                "[image-to-image] Image {} failed ({}), retrying in {:?}",
                index + 1,
                e,
                policy.image_retry_backoff
            );
            tokio::time::sleep(policy.image_retry_backoff).await;
            send(backend, request, references).await
        }
        other => other,
    };

    match outcome {
        Ok(images) => {
            tally.record_slot_success(images);
            log::info!("[image-to-image] Image {} completed", index + 1);
            Ok(true)
        }
        Err(e) if e.is_terminal() => {
            log::error!("[image-to-image] Image {} stopped: {}", index + 1, e);
            tally.record_slot_failure();
            Err(e)
        }
        Err(e) => {
            log::error!("[image-to-image] Image {} failed for good: {}", index + 1, e);
            tally.record_slot_failure();
            Ok(false)
        }
    }
}

async fn send(
    backend: &dyn ImageBackend,
    request: &GenerationRequest,
    images: Vec<ReferenceImage>,
) -> Result<Vec<GeneratedImage>> {
    let payload = ImageEditPayload {
        prompt: request.prompt.clone(),
        task_id: request.task_id.clone(),
        total_image_count: Some(request.count),
        images,
        model_params: ModelParams::image_only(request.aspect_ratio),
    };
    let response = backend.generate_from_images(payload).await?;
    let images = normalize_images(response.images);
    if images.is_empty() {
        return Err(StudioError::ResponseError("No images returned".into()));
    }
    Ok(images)
}
