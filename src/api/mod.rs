pub mod auth_client;
pub mod backend;
pub mod client;
pub mod prompt_client;

use crate::{
    config::{ClientConfig, GenerationPolicy, HistoryConfig},
    error::Result,
    generation::ImageGenerator,
    history::HistoryService,
};
use std::sync::Arc;

pub use auth_client::AuthService;
pub use backend::{HistoryBackend, ImageBackend};
pub use client::{ApiClient, CredentialStore};
pub use prompt_client::PromptService;

/// One studio session: every service shares the same HTTP client and
/// bearer token.
#[derive(Clone)]
pub struct StudioClient {
    api: ApiClient,
    generator: ImageGenerator,
    history: HistoryService,
    auth: AuthService,
    prompts: PromptService,
}

impl StudioClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_settings(config, GenerationPolicy::default(), HistoryConfig::default())
    }

    pub fn with_settings(
        config: ClientConfig,
        policy: GenerationPolicy,
        history_config: HistoryConfig,
    ) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        log::debug!("Studio client ready for adapter {}", config.adapter_id);

        let shared = Arc::new(api.clone());
        Ok(Self {
            generator: ImageGenerator::new(shared.clone()).with_policy(policy),
            history: HistoryService::new(shared, history_config),
            auth: AuthService::new(api.clone()),
            prompts: PromptService::new(api.clone()),
            api,
        })
    }

    pub fn images(&self) -> &ImageGenerator {
        &self.generator
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn prompts(&self) -> &PromptService {
        &self.prompts
    }

    pub fn credentials(&self) -> &CredentialStore {
        self.api.credentials()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}
