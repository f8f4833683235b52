pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod logger;
pub mod models;
pub mod uploads;

#[cfg(test)]
mod testing;

pub use api::{
    ApiClient, AuthService, CredentialStore, HistoryBackend, ImageBackend, PromptService,
    StudioClient,
};
pub use config::{ClientConfig, Endpoints, GenerationPolicy, HistoryConfig};
pub use error::{Result, StudioError};
pub use generation::{
    FnObserver, GenerateParams, ImageGenerator, NoProgress, ProgressChannel, ProgressObserver,
    ProgressStream, RefundLedger,
};
pub use history::{HistoryLoader, HistoryService, PreviewOutcome, TaskCard, Viewport};
pub use models::*;
pub use uploads::{ReferenceSlots, StoredUpload};
