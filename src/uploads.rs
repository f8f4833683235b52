//! Session-scoped store of uploaded reference images.
//!
//! A slot is a stable key for one upload position. Several views of the same
//! position share the slot key, so attaching through one replaces what any
//! other view attached, and removal is visible to all of them.

use crate::{
    error::{Result, StudioError},
    models::ReferenceImage,
};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One main upload plus three extra rows.
pub const DEFAULT_MAX_SLOTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub image_id: String,
    pub slot: String,
    pub image: ReferenceImage,
    pub preview_url: String,
}

#[derive(Debug, Default)]
struct SlotState {
    uploads: Vec<StoredUpload>,
}

#[derive(Debug, Clone)]
pub struct ReferenceSlots {
    state: Arc<Mutex<SlotState>>,
    max_slots: usize,
}

impl Default for ReferenceSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceSlots {
    pub fn new() -> Self {
        Self::with_max_slots(DEFAULT_MAX_SLOTS)
    }

    pub fn with_max_slots(max_slots: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::default())),
            max_slots,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Validates and stores `image` under `slot`, replacing the slot's
    /// previous image. Returns the new image id.
    pub fn attach(&self, slot: &str, image: ReferenceImage) -> Result<String> {
        image.validate()?;
        let mut state = self.lock();

        let replaced = state.uploads.iter().position(|upload| upload.slot == slot);
        if replaced.is_none() && state.uploads.len() >= self.max_slots {
            return Err(StudioError::ValidationError(format!(
                "At most {} reference images can be uploaded",
                self.max_slots
            )));
        }

        let upload = StoredUpload {
            image_id: format!("img_{}", Uuid::new_v4().simple()),
            slot: slot.to_string(),
            preview_url: image.to_data_url(),
            image,
        };
        let image_id = upload.image_id.clone();
        match replaced {
            Some(index) => {
                log::debug!("Replacing upload in slot {}", slot);
                state.uploads[index] = upload;
            }
            None => state.uploads.push(upload),
        }
        Ok(image_id)
    }

    pub fn detach(&self, slot: &str) -> Option<StoredUpload> {
        let mut state = self.lock();
        let index = state.uploads.iter().position(|upload| upload.slot == slot)?;
        Some(state.uploads.remove(index))
    }

    pub fn remove(&self, image_id: &str) -> Option<StoredUpload> {
        let mut state = self.lock();
        let index = state
            .uploads
            .iter()
            .position(|upload| upload.image_id == image_id)?;
        Some(state.uploads.remove(index))
    }

    pub fn slot_of(&self, image_id: &str) -> Option<String> {
        self.lock()
            .uploads
            .iter()
            .find(|upload| upload.image_id == image_id)
            .map(|upload| upload.slot.clone())
    }

    pub fn get(&self, slot: &str) -> Option<StoredUpload> {
        self.lock()
            .uploads
            .iter()
            .find(|upload| upload.slot == slot)
            .cloned()
    }

    /// Uploaded images in upload order.
    pub fn images(&self) -> Vec<ReferenceImage> {
        self.lock()
            .uploads
            .iter()
            .map(|upload| upload.image.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().uploads.clear();
    }
}
