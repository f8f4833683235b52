//! In-memory backends for unit tests.

use crate::{
    api::{HistoryBackend, ImageBackend},
    error::{Result, StudioError},
    models::{
        DeleteTaskResponse, GenerationResponse, ImageEditPayload, RawImage, RefundRequest,
        ReferenceImage, TaskDetail, TaskDetailResponse, TaskListResponse, TaskSummary,
        TextGenerationPayload,
    },
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Text,
    Edit,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub sequence: usize,
    pub kind: CallKind,
    pub prompt: String,
    pub task_id: String,
    pub total_image_count: Option<usize>,
    pub conversation: bool,
    pub images: Vec<ReferenceImage>,
    pub at: Instant,
}

type Responder = Box<dyn Fn(&MockCall) -> Result<GenerationResponse> + Send + Sync>;

pub fn images_response(count: usize) -> GenerationResponse {
    GenerationResponse {
        images: (0..count)
            .map(|i| RawImage {
                url: None,
                b64_json: Some(format!("aW1n{}", i)),
                description: Some("caption".to_string()),
            })
            .collect(),
        task_id: None,
    }
}

pub struct MockImageBackend {
    responder: Responder,
    delay: Duration,
    authenticated: bool,
    refund_fails: bool,
    sequence: AtomicUsize,
    pub calls: Mutex<Vec<MockCall>>,
    pub refunds: Mutex<Vec<RefundRequest>>,
}

impl MockImageBackend {
    /// Every call succeeds with one image.
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(images_response(1)))
    }

    pub fn with_responder(
        responder: impl Fn(&MockCall) -> Result<GenerationResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: Duration::from_millis(500),
            authenticated: true,
            refund_fails: false,
            sequence: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn failing_refunds(mut self) -> Self {
        self.refund_fails = true;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.refunds.lock().unwrap().clone()
    }

    async fn respond(&self, mut call: MockCall) -> Result<GenerationResponse> {
        call.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        call.at = Instant::now();
        self.calls.lock().unwrap().push(call.clone());
        tokio::time::sleep(self.delay).await;
        (self.responder)(&call)
    }
}

#[async_trait]
impl ImageBackend for MockImageBackend {
    async fn generate_from_text(
        &self,
        payload: TextGenerationPayload,
    ) -> Result<GenerationResponse> {
        self.respond(MockCall {
            sequence: 0,
            kind: CallKind::Text,
            prompt: payload.prompt,
            task_id: payload.client_task_id,
            total_image_count: payload.total_image_count,
            conversation: payload.model_params.mode.is_some(),
            images: Vec::new(),
            at: Instant::now(),
        })
        .await
    }

    async fn generate_from_images(&self, payload: ImageEditPayload) -> Result<GenerationResponse> {
        self.respond(MockCall {
            sequence: 0,
            kind: CallKind::Edit,
            prompt: payload.prompt,
            task_id: payload.task_id,
            total_image_count: payload.total_image_count,
            conversation: payload.model_params.mode.is_some(),
            images: payload.images,
            at: Instant::now(),
        })
        .await
    }

    async fn refund(&self, request: RefundRequest) -> Result<Value> {
        self.refunds.lock().unwrap().push(request);
        if self.refund_fails {
            Err(StudioError::HttpStatus {
                status: 500,
                message: "refund service down".into(),
            })
        } else {
            Ok(json!({ "refunded": true }))
        }
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

#[derive(Clone)]
pub enum DetailBehavior {
    Images(usize),
    Empty,
    Fail,
    /// Waits for the notify before answering with one image.
    Gated(Arc<Notify>),
}

pub struct MockHistoryBackend {
    behaviors: HashMap<String, DetailBehavior>,
    delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_list: AtomicBool,
    tasks: Vec<TaskSummary>,
}

impl MockHistoryBackend {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            delay: Duration::from_millis(100),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            tasks: Vec::new(),
        }
    }

    pub fn behavior(mut self, task_id: &str, behavior: DetailBehavior) -> Self {
        self.behaviors.insert(task_id.to_string(), behavior);
        self
    }

    pub fn tasks(mut self, tasks: Vec<TaskSummary>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

fn detail_with(task_id: &str, images: usize) -> TaskDetailResponse {
    let urls: Vec<Value> = (0..images)
        .map(|i| json!({ "url": format!("https://cdn.test/{}/{}.png", task_id, i) }))
        .collect();
    TaskDetailResponse {
        task: Some(TaskDetail {
            task_id: Some(task_id.to_string()),
            prompt: None,
            generated_images: Some(Value::Array(urls)),
        }),
    }
}

#[async_trait]
impl HistoryBackend for MockHistoryBackend {
    async fn list_tasks(&self, limit: usize, _lite: bool) -> Result<TaskListResponse> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StudioError::SessionExpired);
        }
        Ok(TaskListResponse {
            tasks: self.tasks.iter().take(limit).cloned().collect(),
            total: Some(self.tasks.len()),
        })
    }

    async fn task_detail(
        &self,
        task_id: &str,
        max_images: Option<usize>,
        _full: bool,
    ) -> Result<TaskDetailResponse> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(task_id.to_string());

        let behavior = self
            .behaviors
            .get(task_id)
            .cloned()
            .unwrap_or(DetailBehavior::Images(2));
        let result = match behavior {
            DetailBehavior::Images(n) => {
                tokio::time::sleep(self.delay).await;
                let n = max_images.map_or(n, |max| n.min(max));
                Ok(detail_with(task_id, n))
            }
            DetailBehavior::Empty => {
                tokio::time::sleep(self.delay).await;
                Ok(detail_with(task_id, 0))
            }
            DetailBehavior::Fail => Err(StudioError::HttpStatus {
                status: 500,
                message: "detail unavailable".into(),
            }),
            DetailBehavior::Gated(gate) => {
                gate.notified().await;
                Ok(detail_with(task_id, 1))
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_task(&self, task_id: &str) -> Result<DeleteTaskResponse> {
        self.deleted.lock().unwrap().push(task_id.to_string());
        Ok(DeleteTaskResponse {
            success: Some(true),
            message: None,
        })
    }
}
