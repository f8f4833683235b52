use crate::{api::ImageBackend, models::RefundRequest};
use std::collections::HashSet;
use std::sync::Mutex;

/// Task ids that already had a refund issued in this session.
#[derive(Debug, Default)]
pub struct RefundLedger {
    refunded: Mutex<HashSet<String>>,
}

impl RefundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the task id was already claimed.
    pub fn claim(&self, task_id: &str) -> bool {
        match self.refunded.lock() {
            Ok(mut set) => set.insert(task_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(task_id.to_string()),
        }
    }

    pub fn contains(&self, task_id: &str) -> bool {
        match self.refunded.lock() {
            Ok(set) => set.contains(task_id),
            Err(poisoned) => poisoned.into_inner().contains(task_id),
        }
    }
}

/// Best-effort compensation for a shortfall. Never fails; a task id is
/// refunded at most once per ledger, even if the first attempt errored.
pub(crate) async fn compensate(
    backend: &dyn ImageBackend,
    ledger: &RefundLedger,
    request: RefundRequest,
) {
    if request.actual_count >= request.expected_count {
        return;
    }
    if !backend.is_authenticated() {
        log::info!(
            "[refund] Skipping refund for {}: no session",
            request.task_id
        );
        return;
    }
    if !ledger.claim(&request.task_id) {
        log::warn!(
            "[refund] Task {} was already refunded in this session",
            request.task_id
        );
        return;
    }

    log::info!(
        "[refund] Requesting refund for {}: expected {}, got {}",
        request.task_id,
        request.expected_count,
        request.actual_count
    );
    let task_id = request.task_id.clone();
    match backend.refund(request).await {
        Ok(response) => log::info!("[refund] Refund accepted for {}: {}", task_id, response),
        Err(e) => log::warn!(
            "[refund] Refund failed for {} (result unaffected): {}",
            task_id,
            e
        ),
    }
}
