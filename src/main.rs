use futures::StreamExt;
use imagegen::{
    logger, AspectRatio, ClientConfig, GenerateParams, GeneratedImage, GenerationPolicy,
    HistoryConfig, ProgressChannel, ProgressStatus, ReferenceImage, ReferenceSlots, StudioClient,
};
use std::env;
use std::fs;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    logger::init()?;
    if dotenv_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = ClientConfig::from_env();
    logger::log_client_config(&config);
    let client =
        StudioClient::with_settings(config, GenerationPolicy::default(), HistoryConfig::from_env())?;

    if let (Ok(username), Ok(password)) =
        (env::var("STUDIO_USERNAME"), env::var("STUDIO_PASSWORD"))
    {
        log::info!("🔑 Logging in as {}", username);
        client.auth().login(&username, &password).await?;
        match client.auth().current_user().await {
            Ok(user) => log::info!("👤 Signed in: {}", user.username),
            Err(e) => log::warn!("Could not load profile: {}", e),
        }
    }

    let prompt = env::args()
        .nth(1)
        .or_else(|| env::var("STUDIO_PROMPT").ok())
        .unwrap_or_else(|| "A lighthouse on a cliff at dusk, watercolor".to_string());
    let count = env::var("STUDIO_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);
    let aspect_ratio = match env::var("STUDIO_ASPECT_RATIO") {
        Ok(value) => value.parse()?,
        Err(_) => AspectRatio::default(),
    };
    let series_mode = matches!(env::var("STUDIO_SERIES").as_deref(), Ok("1") | Ok("true"));

    let slots = ReferenceSlots::new();
    if let Ok(paths) = env::var("STUDIO_REFERENCES") {
        for (index, path) in paths.split(',').filter(|p| !p.trim().is_empty()).enumerate() {
            let image = read_reference(path.trim())?;
            slots.attach(&format!("ref-{}", index), image)?;
        }
        log::info!("📎 {} reference image(s) attached", slots.len());
    }

    let params = GenerateParams::new(prompt)
        .with_reference_slots(&slots)
        .with_count(count)
        .with_aspect_ratio(aspect_ratio)
        .with_series_mode(series_mode);

    let (progress, mut events) = ProgressChannel::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event.status {
                ProgressStatus::Processing => log::info!(
                    "🖼️  {}/{} done, {} failed, {} image(s) so far",
                    event.completed,
                    event.total,
                    event.failed,
                    event.images.len()
                ),
                ProgressStatus::Completed => {
                    log::info!("🏁 Received {} image(s)", event.images.len())
                }
            }
        }
    });

    let outcome = client.images().generate(params, &progress).await;
    drop(progress);
    let _ = printer.await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) if e.is_still_processing() => {
            log::warn!("⏳ {}", e.user_message());
            return Ok(());
        }
        Err(e) => {
            log::error!("❌ {}", e.user_message());
            return Err(e.into());
        }
    };

    log::info!(
        "✅ Task {} ({}): {} succeeded, {} failed",
        result.task_id,
        result.mode,
        result.success_count,
        result.failed_count
    );

    let output_dir = env::var("STUDIO_OUTPUT_DIR").unwrap_or_else(|_| "generated".to_string());
    fs::create_dir_all(&output_dir)?;
    for (index, image) in result.images.iter().enumerate() {
        save_image(image, &output_dir, &result.task_id, index)?;
    }

    match client.history().list_tasks(Some(5)).await {
        Ok(tasks) => {
            log::info!("📚 Recent tasks:");
            for task in tasks {
                log::info!(
                    "  {} [{}] {} image(s): {}",
                    task.task_id,
                    task.mode.map(|m| m.to_string()).unwrap_or_default(),
                    task.image_count.unwrap_or_default(),
                    task.prompt_preview(60)
                );
            }
        }
        Err(e) => log::warn!("History unavailable: {}", e.user_message()),
    }

    Ok(())
}

fn read_reference(path: &str) -> Result<ReferenceImage, Box<dyn std::error::Error>> {
    let mime_type = match Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    let file_name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string();
    Ok(ReferenceImage::new(file_name, mime_type, fs::read(path)?))
}

fn save_image(
    image: &GeneratedImage,
    output_dir: &str,
    task_id: &str,
    index: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    match image.decode_data() {
        Some(decoded) => {
            let (_, bytes) = decoded?;
            let path = Path::new(output_dir).join(format!(
                "{}_{}.{}",
                task_id,
                index + 1,
                image.file_extension()
            ));
            fs::write(&path, bytes)?;
            log::info!("💾 Saved {}", path.display());
        }
        None => log::info!("🔗 Image {}: {}", index + 1, image.url),
    }
    Ok(())
}
