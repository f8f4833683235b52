use std::env;
use std::time::Duration;

pub const DEFAULT_ADAPTER_ID: &str = "google_gemini_image_rest";

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub user_me: String,
    pub user_tasks: String,
    pub user_transactions: String,
    pub generate_image: String,
    pub edit_image: String,
    pub refund: String,
    pub optimize_prompt: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_adapter(DEFAULT_ADAPTER_ID)
    }
}

impl Endpoints {
    pub fn for_adapter(adapter_id: &str) -> Self {
        Endpoints {
            login: "/auth/token".to_string(),
            register: "/auth/register".to_string(),
            user_me: "/users/me".to_string(),
            user_tasks: "/users/me/tasks".to_string(),
            user_transactions: "/users/me/transactions".to_string(),
            generate_image: format!("/run/generate_image/{}", adapter_id),
            edit_image: format!("/run/edit_image/{}", adapter_id),
            refund: "/api/refund-task".to_string(),
            optimize_prompt: "/api/optimize-prompt".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub adapter_id: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://127.0.0.1:8000".to_string(),
            adapter_id: DEFAULT_ADAPTER_ID.to_string(),
            token: None,
            timeout: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `STUDIO_BASE_URL`, `STUDIO_ADAPTER_ID`, `STUDIO_TOKEN` and
    /// `STUDIO_TIMEOUT_SECS`. Missing values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = env::var("STUDIO_BASE_URL").unwrap_or(defaults.base_url);
        let adapter_id = env::var("STUDIO_ADAPTER_ID").unwrap_or(defaults.adapter_id);
        let token = env::var("STUDIO_TOKEN").ok().filter(|t| !t.is_empty());
        let timeout = env::var("STUDIO_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs);

        ClientConfig {
            base_url,
            endpoints: Endpoints::for_adapter(&adapter_id),
            adapter_id,
            token,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_adapter(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = adapter_id.into();
        self.endpoints = Endpoints::for_adapter(&self.adapter_id);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Pacing, batching and retry knobs of the generation orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    /// Text-to-image fires everything at once up to this count.
    pub text_full_concurrency_limit: usize,
    /// Image-to-image fires everything at once up to this count.
    pub image_full_concurrency_limit: usize,
    /// Size of the first batch when a request is split.
    pub first_batch_size: usize,
    /// Delay between the first and second image-to-image batch.
    pub image_batch_pacing: Duration,
    /// Backoff before the single image-to-image retry.
    pub image_retry_backoff: Duration,
    pub max_reference_images: usize,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        GenerationPolicy {
            text_full_concurrency_limit: 4,
            image_full_concurrency_limit: 2,
            first_batch_size: 2,
            image_batch_pacing: Duration::from_secs(6),
            image_retry_backoff: Duration::from_secs(2),
            max_reference_images: 3,
        }
    }
}

impl GenerationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image_batch_pacing(mut self, pacing: Duration) -> Self {
        self.image_batch_pacing = pacing;
        self
    }

    pub fn with_image_retry_backoff(mut self, backoff: Duration) -> Self {
        self.image_retry_backoff = backoff;
        self
    }

    pub fn with_max_reference_images(mut self, max: usize) -> Self {
        self.max_reference_images = max;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub task_limit: usize,
    pub max_concurrent_loads: usize,
    /// Cards within this distance of the viewport start loading early.
    pub lookahead_margin: f64,
    pub card_height: f64,
    pub card_gap: f64,
    pub default_image_count: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            task_limit: 8,
            max_concurrent_loads: 2,
            lookahead_margin: 100.0,
            card_height: 320.0,
            card_gap: 16.0,
            default_image_count: 4,
        }
    }
}

impl HistoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let task_limit = env::var("STUDIO_HISTORY_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.task_limit);
        let max_concurrent_loads = env::var("STUDIO_HISTORY_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_concurrent_loads);

        HistoryConfig {
            task_limit,
            max_concurrent_loads,
            ..defaults
        }
    }

    pub fn with_max_concurrent_loads(mut self, max: usize) -> Self {
        self.max_concurrent_loads = max.max(1);
        self
    }

    pub fn with_lookahead_margin(mut self, margin: f64) -> Self {
        self.lookahead_margin = margin;
        self
    }

    pub fn with_card_layout(mut self, card_height: f64, card_gap: f64) -> Self {
        self.card_height = card_height;
        self.card_gap = card_gap;
        self
    }
}
