//! Progress reporting for a single generation call.
//!
//! Observers receive [`ProgressEvent`]s synchronously from whichever attempt
//! just finished. Events of one call are emitted while the shared tally is
//! locked, so the `images` snapshot an observer sees never shrinks.
//! Observers must not block.

use crate::models::{GeneratedImage, ProgressEvent, ProgressStatus};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Adapts a closure into an observer.
pub struct FnObserver<F>(pub F);

impl<F> ProgressObserver for FnObserver<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

pub type ProgressStream = UnboundedReceiverStream<ProgressEvent>;

/// Observer that forwards events into an async stream. The stream ends once
/// the channel is dropped, i.e. after the generation call returns.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: UnboundedSender<ProgressEvent>,
}

impl ProgressChannel {
    pub fn new() -> (Self, ProgressStream) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, UnboundedReceiverStream::new(receiver))
    }
}

impl ProgressObserver for ProgressChannel {
    fn on_progress(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Progress receiver dropped, event discarded");
        }
    }
}

#[derive(Default)]
struct TallyState {
    images: Vec<GeneratedImage>,
    completed: usize,
    failed: usize,
}

/// Append-only image sequence shared by all concurrent attempts of one call.
pub(crate) struct ImageTally<'a> {
    state: Mutex<TallyState>,
    observer: &'a dyn ProgressObserver,
    total: usize,
}

impl<'a> ImageTally<'a> {
    pub(crate) fn new(observer: &'a dyn ProgressObserver, total: usize) -> Self {
        Self {
            state: Mutex::new(TallyState::default()),
            observer,
            total,
        }
    }

    /// Records one finished image and reports it.
    pub(crate) fn push_image(&self, image: GeneratedImage) {
        self.update(|state| {
            state.images.push(image);
            state.completed += 1;
        });
    }

    /// Records a slot that produced `images` and reports it once.
    pub(crate) fn record_slot_success(&self, images: Vec<GeneratedImage>) {
        self.update(|state| {
            state.images.extend(images);
            state.completed += 1;
        });
    }

    pub(crate) fn record_slot_failure(&self) {
        self.update(|state| state.failed += 1);
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub(crate) fn into_images(self) -> Vec<GeneratedImage> {
        match self.state.into_inner() {
            Ok(state) => state.images,
            Err(poisoned) => poisoned.into_inner().images,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TallyState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut TallyState)) {
        let mut state = self.lock();
        apply(&mut state);
        self.observer.on_progress(ProgressEvent {
            status: ProgressStatus::Processing,
            images: state.images.clone(),
            completed: state.completed,
            failed: state.failed,
            total: self.total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_tally_reports_growing_snapshots() {
        let (channel, stream) = ProgressChannel::new();
        {
            let tally = ImageTally::new(&channel, 3);
            tally.push_image(GeneratedImage::new("a"));
            tally.record_slot_failure();
            tally.record_slot_success(vec![GeneratedImage::new("b"), GeneratedImage::new("c")]);
            assert_eq!(tally.len(), 3);
            assert_eq!(tally.into_images().len(), 3);
        }
        drop(channel);

        let events: Vec<ProgressEvent> = stream.collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].images.len(), 1);
        assert_eq!(events[1].failed, 1);
        assert_eq!(events[2].images.len(), 3);
        assert_eq!(events[2].completed, 2);
        assert!(events.iter().all(|e| e.total == 3 && e.status == ProgressStatus::Processing));
    }

    #[test]
    fn test_fn_observer() {
        let seen = Mutex::new(Vec::new());
        let observer = FnObserver(|event: ProgressEvent| seen.lock().unwrap().push(event.completed));
        observer.on_progress(ProgressEvent {
            status: ProgressStatus::Completed,
            images: vec![],
            completed: 4,
            failed: 0,
            total: 4,
        });
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }
}
