use crate::{
    config::{ClientConfig, Endpoints},
    error::{Result, StudioError},
    models::{ImageEditPayload, RefundRequest},
};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Session-scoped bearer token shared by every service of one client.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    token: Arc<RwLock<Option<String>>>,
}

impl CredentialStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        match self.token.write() {
            Ok(mut guard) => *guard = Some(token),
            Err(poisoned) => *poisoned.into_inner() = Some(token),
        }
    }

    pub fn clear(&self) {
        match self.token.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
    credentials: CredentialStore,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StudioError::ConfigError(e.to_string()))?;
        Ok(Self::from_parts(client, config))
    }

    fn from_parts(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoints: config.endpoints.clone(),
            credentials: CredentialStore::new(config.token.clone()),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build_headers(&self, require_auth: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if require_auth {
            if let Some(token) = self.credentials.token() {
                match HeaderValue::from_str(&format!("Bearer {}", token)) {
                    Ok(value) => {
                        headers.insert(AUTHORIZATION, value);
                    }
                    Err(e) => log::warn!("Stored token is not a valid header value: {}", e),
                }
            }
        }
        headers
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, require_auth: bool) -> Result<T> {
        let request = self
            .client
            .get(self.url(path))
            .headers(self.build_headers(require_auth));
        self.send(request, path).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B, require_auth: bool) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.url(path))
            .headers(self.build_headers(require_auth))
            .json(body);
        self.send(request, path).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
        require_auth: bool,
    ) -> Result<T> {
        let request = self
            .client
            .post(self.url(path))
            .headers(self.build_headers(require_auth))
            .multipart(form);
        self.send(request, path).await
    }

    pub async fn post_urlencoded<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        require_auth: bool,
    ) -> Result<T> {
        let request = self
            .client
            .post(self.url(path))
            .headers(self.build_headers(require_auth))
            .form(fields);
        self.send(request, path).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str, require_auth: bool) -> Result<T> {
        let request = self
            .client
            .delete(self.url(path))
            .headers(self.build_headers(require_auth));
        self.send(request, path).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        log::debug!("Sending request to {}", path);
        let response = request.send().await.map_err(|e| {
            log::error!("Request to {} failed: {}", path, e);
            StudioError::from(e)
        })?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        match status.as_u16() {
            401 => {
                self.credentials.clear();
                Err(StudioError::SessionExpired)
            }
            402 => {
                let detail = error_detail(response).await;
                Err(StudioError::InsufficientBalance(
                    detail.unwrap_or_else(|| "Insufficient balance".to_string()),
                ))
            }
            504 => Err(StudioError::BackendTimeout),
            code if !status.is_success() => {
                let message = error_detail(response)
                    .await
                    .unwrap_or_else(|| format!("Request failed: {}", code));
                Err(StudioError::HttpStatus {
                    status: code,
                    message,
                })
            }
            _ => response
                .json::<T>()
                .await
                .map_err(|e| StudioError::ResponseError(e.to_string())),
        }
    }
}

/// Best-effort `detail` field of an error body.
async fn error_detail(response: Response) -> Option<String> {
    let body = response.json::<Value>().await.ok()?;
    match body.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub(crate) fn edit_form(payload: ImageEditPayload) -> Result<Form> {
    let mut form = Form::new()
        .text("prompt", payload.prompt)
        .text("task_id", payload.task_id);
    if let Some(total) = payload.total_image_count {
        form = form.text("total_image_count", total.to_string());
    }
    for image in payload.images {
        let part = Part::bytes(image.data)
            .file_name(image.file_name)
            .mime_str(&image.mime_type)
            .map_err(|e| StudioError::RequestError(e.to_string()))?;
        form = form.part("image", part);
    }
    let model_params = serde_json::to_string(&payload.model_params)?;
    Ok(form.text("model_params", model_params))
}

pub(crate) fn refund_form(request: &RefundRequest) -> Form {
    Form::new()
        .text("task_id", request.task_id.clone())
        .text("expected_count", request.expected_count.to_string())
        .text("actual_count", request.actual_count.to_string())
        .text("mode", request.mode.as_str())
}
