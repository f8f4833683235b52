//! Lazy loading of task images for history cards.
//!
//! Cards start `Pending` with placeholders only. Once observation is armed,
//! a card that intersects the viewport (plus the lookahead margin) is queued
//! for loading. A semaphore bounds how many cards are `Loading` at once;
//! queued cards hold no permit while they wait. Each load ends in `Loaded`,
//! `Empty` or `Error`, and the permit is returned after the terminal state
//! is recorded.

use crate::{
    api::HistoryBackend,
    config::HistoryConfig,
    models::{CardState, GeneratedImage, TaskSummary},
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(top: f64, height: f64) -> Self {
        Self { top, height }
    }
}

#[derive(Debug, Clone)]
pub struct TaskCard {
    pub summary: TaskSummary,
    pub placeholders: usize,
    pub top: f64,
    pub height: f64,
    pub state: CardState,
    pub images: Vec<GeneratedImage>,
}

impl TaskCard {
    fn intersects(&self, viewport: &Viewport, margin: f64) -> bool {
        let view_top = viewport.top - margin;
        let view_bottom = viewport.top + viewport.height + margin;
        self.top < view_bottom && self.top + self.height > view_top
    }
}

#[derive(Default)]
struct LoaderState {
    cards: Vec<TaskCard>,
    in_flight: HashSet<String>,
    observing: bool,
    handles: Vec<JoinHandle<()>>,
}

impl LoaderState {
    fn card_mut(&mut self, task_id: &str) -> Option<&mut TaskCard> {
        self.cards
            .iter_mut()
            .find(|card| card.summary.task_id == task_id)
    }
}

#[derive(Clone)]
pub struct HistoryLoader {
    backend: Arc<dyn HistoryBackend>,
    config: HistoryConfig,
    permits: Arc<Semaphore>,
    state: Arc<Mutex<LoaderState>>,
}

impl HistoryLoader {
    pub fn new(backend: Arc<dyn HistoryBackend>, config: HistoryConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_loads.max(1)));
        Self {
            backend,
            config,
            permits,
            state: Arc::new(Mutex::new(LoaderState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends one pending card per task, laid out below the existing ones.
    /// Tasks that already have a card are skipped. Returns the number of
    /// cards created.
    pub fn render_summaries(&self, tasks: Vec<TaskSummary>) -> usize {
        if tasks.is_empty() {
            log::info!("No history to render");
            return 0;
        }

        let mut state = self.lock();
        let mut next_top = state
            .cards
            .last()
            .map_or(0.0, |card| card.top + card.height + self.config.card_gap);
        let mut created = 0;

        for summary in tasks {
            if state
                .cards
                .iter()
                .any(|card| card.summary.task_id == summary.task_id)
            {
                log::debug!("Card for {} already rendered", summary.task_id);
                continue;
            }
            let placeholders = summary
                .image_count
                .filter(|n| *n > 0)
                .unwrap_or(self.config.default_image_count);
            state.cards.push(TaskCard {
                placeholders,
                top: next_top,
                height: self.config.card_height,
                state: CardState::Pending,
                images: Vec::new(),
                summary,
            });
            next_top += self.config.card_height + self.config.card_gap;
            created += 1;
        }

        log::info!("Rendered {} task card(s) with placeholders", created);
        created
    }

    pub fn start_observing(&self) {
        let mut state = self.lock();
        state.observing = true;
        let pending = state
            .cards
            .iter()
            .filter(|card| card.state == CardState::Pending)
            .count();
        log::info!("Observing {} pending task card(s)", pending);
    }

    /// Stops reacting to visibility. Loads already queued still finish.
    pub fn stop_observing(&self) {
        self.lock().observing = false;
    }

    /// Queues every pending card intersecting `viewport`. Returns how many
    /// loads were queued.
    pub fn on_viewport(&self, viewport: Viewport) -> usize {
        let visible: Vec<String> = {
            let state = self.lock();
            if !state.observing {
                return 0;
            }
            state
                .cards
                .iter()
                .filter(|card| card.state == CardState::Pending)
                .filter(|card| card.intersects(&viewport, self.config.lookahead_margin))
                .map(|card| card.summary.task_id.clone())
                .collect()
        };

        visible
            .into_iter()
            .filter(|task_id| self.notify_visible(task_id))
            .count()
    }

    /// Queues one card as having entered the viewport. Returns `false` when
    /// nothing was queued: not observing, unknown task, not pending, or
    /// already queued.
    pub fn notify_visible(&self, task_id: &str) -> bool {
        let mut state = self.lock();
        if !state.observing {
            return false;
        }
        let pending = state
            .cards
            .iter()
            .any(|card| card.summary.task_id == task_id && card.state == CardState::Pending);
        if !pending || !state.in_flight.insert(task_id.to_string()) {
            return false;
        }

        log::debug!("Task {} entered the viewport, queueing load", task_id);
        let loader = self.clone();
        let task_id = task_id.to_string();
        state.handles.retain(|handle| !handle.is_finished());
        state
            .handles
            .push(tokio::spawn(async move { loader.load(task_id).await }));
        true
    }

    async fn load(&self, task_id: String) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.lock().in_flight.remove(&task_id);
                return;
            }
        };

        if let Some(card) = self.lock().card_mut(&task_id) {
            card.state = CardState::Loading;
        }
        log::info!("Loading images for task {}", task_id);

        let (next, images) = match self.backend.task_detail(&task_id, None, false).await {
            Ok(detail) => {
                let images = detail.images();
                if images.is_empty() {
                    log::info!("Task {} has no images", task_id);
                    (CardState::Empty, images)
                } else {
                    log::info!("Loaded {} image(s) for task {}", images.len(), task_id);
                    (CardState::Loaded, images)
                }
            }
            Err(e) => {
                log::error!("Failed to load images for task {}: {}", task_id, e);
                (CardState::Error, Vec::new())
            }
        };

        let mut state = self.lock();
        if let Some(card) = state.card_mut(&task_id) {
            card.state = next;
            card.images = images;
        }
        state.in_flight.remove(&task_id);
    }

    /// Puts an errored card back to `Pending` so it can be queued again.
    pub fn retry(&self, task_id: &str) -> bool {
        let mut state = self.lock();
        match state.card_mut(task_id) {
            Some(card) if card.state == CardState::Error => {
                card.state = CardState::Pending;
                true
            }
            _ => false,
        }
    }

    /// Waits until every queued load reached a terminal state.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.lock().handles);
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    log::error!("History load task panicked: {}", e);
                }
            }
        }
    }

    pub fn state_of(&self, task_id: &str) -> Option<CardState> {
        self.lock()
            .cards
            .iter()
            .find(|card| card.summary.task_id == task_id)
            .map(|card| card.state)
    }

    pub fn images_of(&self, task_id: &str) -> Vec<GeneratedImage> {
        self.lock()
            .cards
            .iter()
            .find(|card| card.summary.task_id == task_id)
            .map(|card| card.images.clone())
            .unwrap_or_default()
    }

    pub fn count_in(&self, state: CardState) -> usize {
        self.lock()
            .cards
            .iter()
            .filter(|card| card.state == state)
            .count()
    }

    pub fn snapshot(&self) -> Vec<TaskCard> {
        self.lock().cards.clone()
    }

    /// Removes all cards. In-flight loads finish but their results are
    /// dropped.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.cards.clear();
    }

    /// Drops the card of a deleted task.
    pub fn remove_card(&self, task_id: &str) -> bool {
        let mut state = self.lock();
        let before = state.cards.len();
        state.cards.retain(|card| card.summary.task_id != task_id);
        state.cards.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenerationMode;
    use crate::testing::{DetailBehavior, MockHistoryBackend};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn summaries(ids: &[&str]) -> Vec<TaskSummary> {
        ids.iter()
            .map(|id| TaskSummary::new(*id, GenerationMode::TextToImage, 2))
            .collect()
    }

    fn everything() -> Viewport {
        Viewport::new(0.0, 1.0e6)
    }

    #[test]
    fn test_render_lays_out_cards_with_placeholders() {
        let loader = HistoryLoader::new(Arc::new(MockHistoryBackend::new()), HistoryConfig::default());
        let mut tasks = summaries(&["a", "b"]);
        tasks[1].image_count = None;
        assert_eq!(loader.render_summaries(tasks), 2);
        assert_eq!(loader.render_summaries(summaries(&["b", "c"])), 1);

        let cards = loader.snapshot();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].placeholders, 2);
        assert_eq!(cards[1].placeholders, 4);
        assert_eq!(cards[0].top, 0.0);
        assert_eq!(cards[1].top, 336.0);
        assert_eq!(cards[2].top, 672.0);
        assert!(cards.iter().all(|card| card.state == CardState::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_loads_before_observing() {
        let backend = Arc::new(MockHistoryBackend::new());
        let loader = HistoryLoader::new(backend.clone(), HistoryConfig::default());
        loader.render_summaries(summaries(&["a"]));

        assert_eq!(loader.on_viewport(everything()), 0);
        assert!(!loader.notify_visible("a"));

        loader.start_observing();
        assert!(loader.notify_visible("a"));
        assert!(!loader.notify_visible("a"));
        loader.settle().await;

        assert_eq!(loader.state_of("a"), Some(CardState::Loaded));
        assert_eq!(loader.images_of("a").len(), 2);
        assert_eq!(backend.started(), vec!["a".to_string()]);
        assert!(!loader.notify_visible("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewport_with_lookahead_selects_cards() {
        let backend = Arc::new(MockHistoryBackend::new());
        let config = HistoryConfig::default().with_card_layout(100.0, 0.0);
        let loader = HistoryLoader::new(backend.clone(), config);
        loader.render_summaries(summaries(&["a", "b", "c", "d", "e"]));
        loader.start_observing();

        // Viewport covers card b; the 100px margin reaches a and c.
        assert_eq!(loader.on_viewport(Viewport::new(150.0, 40.0)), 3);
        loader.settle().await;

        assert_eq!(loader.state_of("a"), Some(CardState::Loaded));
        assert_eq!(loader.state_of("c"), Some(CardState::Loaded));
        assert_eq!(loader.state_of("d"), Some(CardState::Pending));
        assert_eq!(loader.state_of("e"), Some(CardState::Pending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling_holds() {
        let ids: Vec<String> = (0..10).map(|i| format!("task-{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let backend = Arc::new(MockHistoryBackend::new().delay(Duration::from_millis(100)));
        let loader = HistoryLoader::new(backend.clone(), HistoryConfig::default());
        loader.render_summaries(summaries(&id_refs));
        loader.start_observing();

        assert_eq!(loader.on_viewport(everything()), 10);

        let mut max_loading = 0;
        while loader.count_in(CardState::Loaded) < 10 {
            max_loading = max_loading.max(loader.count_in(CardState::Loading));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        loader.settle().await;

        assert!(max_loading <= 2);
        assert_eq!(max_loading, 2);
        assert_eq!(backend.max_active(), 2);
        assert_eq!(backend.started().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_releases_slot() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(
            MockHistoryBackend::new()
                .behavior("a", DetailBehavior::Fail)
                .behavior("b", DetailBehavior::Gated(gate.clone())),
        );
        let loader = HistoryLoader::new(backend.clone(), HistoryConfig::default());
        loader.render_summaries(summaries(&["a", "b", "c"]));
        loader.start_observing();

        assert!(loader.notify_visible("a"));
        assert!(loader.notify_visible("b"));
        assert!(loader.notify_visible("c"));

        for _ in 0..100 {
            if backend.started().contains(&"c".to_string()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(loader.state_of("a"), Some(CardState::Error));
        assert_eq!(loader.state_of("b"), Some(CardState::Loading));
        assert!(backend.started().contains(&"c".to_string()));
        assert!(loader.count_in(CardState::Loading) <= 2);

        gate.notify_one();
        loader.settle().await;
        assert_eq!(loader.state_of("b"), Some(CardState::Loaded));
        assert_eq!(loader.state_of("c"), Some(CardState::Loaded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_retry() {
        let backend = Arc::new(
            MockHistoryBackend::new()
                .behavior("empty", DetailBehavior::Empty)
                .behavior("broken", DetailBehavior::Fail),
        );
        let loader = HistoryLoader::new(backend.clone(), HistoryConfig::default());
        loader.render_summaries(summaries(&["empty", "broken"]));
        loader.start_observing();
        loader.on_viewport(everything());
        loader.settle().await;

        assert_eq!(loader.state_of("empty"), Some(CardState::Empty));
        assert_eq!(loader.state_of("broken"), Some(CardState::Error));
        assert!(!loader.retry("empty"));
        assert!(loader.retry("broken"));
        assert_eq!(loader.state_of("broken"), Some(CardState::Pending));
        assert!(loader.notify_visible("broken"));
        loader.settle().await;
        assert_eq!(loader.state_of("broken"), Some(CardState::Error));
    }
}
