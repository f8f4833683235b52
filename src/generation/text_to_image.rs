use crate::{
    api::ImageBackend,
    config::GenerationPolicy,
    error::{Result, StudioError},
    generation::{progress::ImageTally, settle_outcomes, BatchOutcome},
    models::{normalize_images, GenerationRequest, ModelParams, TextGenerationPayload},
};
use futures::future::join_all;

/// Appends `index` spaces when more than one image is requested, so the
/// backend does not collapse sibling requests as duplicates.
pub(crate) fn variant_prompt(base: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        return base.to_string();
    }
    format!("{}{}", base, " ".repeat(index))
}

pub(crate) async fn run(
    backend: &dyn ImageBackend,
    policy: &GenerationPolicy,
    request: &GenerationRequest,
    tally: &ImageTally<'_>,
) -> BatchOutcome {
    let count = request.count;
    let attempt = |index: usize| attempt_single(backend, request, tally, index);

    let mut outcomes = Vec::with_capacity(count);
    if count <= policy.text_full_concurrency_limit {
        log::info!("[text-to-image] Dispatching all {} requests", count);
        outcomes.extend(join_all((0..count).map(&attempt)).await);
    } else {
        let first = policy.first_batch_size.clamp(1, count);
        log::info!("[text-to-image] First batch: {} requests", first);
        outcomes.extend(join_all((0..first).map(&attempt)).await);
        log::info!("[text-to-image] Second batch: {} requests", count - first);
        outcomes.extend(join_all((first..count).map(&attempt)).await);
    }

    let (failed, mut terminal) = settle_outcomes(outcomes);
    if !failed.is_empty() {
        log::info!(
            "[text-to-image] {} request(s) failed, retrying once",
            failed.len()
        );
        let retries = join_all(failed.iter().map(|&index| attempt(index))).await;
        for retry in retries {
            if let Err(e) = retry {
                if e.is_terminal() && terminal.is_none() {
                    terminal = Some(e);
                }
            }
        }
    }

    let success_count = tally.len().min(count);
    BatchOutcome {
        success_count,
        failed_count: count - success_count,
        terminal,
    }
}

async fn attempt_single(
    backend: &dyn ImageBackend,
    request: &GenerationRequest,
    tally: &ImageTally<'_>,
    index: usize,
) -> Result<()> {
    let payload = TextGenerationPayload {
        prompt: variant_prompt(&request.prompt, index, request.count),
        n: Some(1),
        size: Some(request.aspect_ratio),
        client_task_id: request.task_id.clone(),
        total_image_count: Some(request.count),
        model_params: ModelParams::image_only(request.aspect_ratio),
    };

    let response = backend.generate_from_text(payload).await.map_err(|e| {
        log::error!("[text-to-image] Image {} failed: {}", index + 1, e);
        e
    })?;

    let images = normalize_images(response.images);
    if images.is_empty() {
        log::error!("[text-to-image] Image {} returned no images", index + 1);
        return Err(StudioError::ResponseError("No images returned".into()));
    }

    for image in images {
        tally.push_image(image);
        log::info!(
            "[text-to-image] {}/{} images completed",
            tally.len(),
            request.count
        );
    }
    Ok(())
}
