//! HTTP implementation of [`Platform`].
//!
//! Every call is a JSON `POST` to `<api_url>/<route>` authenticated with a
//! bearer token. Failures come back as `{"error": {"type", "message"}}`.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Body, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ApiError, ApiErrorKind, ApiResult, AppDescription, FileUpload, JobDescription, Platform,
    RunRequest,
};
use crate::config::Config;
use crate::error::{ForgeError, Result};

/// Retry configuration for platform calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let exp_delay = base * 2_f64.powi(attempt as i32);
        let capped = exp_delay.min(self.max_delay_ms as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

/// When a failed request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads and updates; repeating them lands on the same state.
    Safe,
    /// Creates and job launches; only resent when the server never acted
    /// on the first attempt.
    Unprocessed,
}

impl Replay {
    fn allows(self, err: &ApiError) -> bool {
        match self {
            Self::Safe => err.is_transient(),
            Self::Unprocessed => err.is_unprocessed(),
        }
    }
}

/// Blocking platform API client.
pub struct ApiClient {
    base_url: String,
    token: String,
    http: Client,
    retry: RetryConfig,
    close_poll_interval: Duration,
    close_poll_limit: u32,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
            retry: RetryConfig::default(),
            close_poll_interval: Duration::from_millis(500),
            close_poll_limit: 240,
        })
    }

    /// Client for the configured server; fails without a token.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.require_token()?;
        Self::new(
            &config.platform.api_url,
            token,
            Duration::from_secs(config.platform.timeout_secs),
        )
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_close_polling(mut self, interval: Duration, limit: u32) -> Self {
        self.close_poll_interval = interval;
        self.close_poll_limit = limit;
        self
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route.trim_start_matches('/'))
    }

    /// POST a JSON body and decode the JSON response.
    fn call<T: DeserializeOwned>(&self, route: &str, body: &Value) -> ApiResult<T> {
        self.send(route, body, Replay::Safe)
    }

    /// Like [`ApiClient::call`] for requests that create something.
    fn call_once<T: DeserializeOwned>(&self, route: &str, body: &Value) -> ApiResult<T> {
        self.send(route, body, Replay::Unprocessed)
    }

    fn send<T: DeserializeOwned>(&self, route: &str, body: &Value, replay: Replay) -> ApiResult<T> {
        let url = self.url(route);
        let raw = self.with_retries(route, replay, || {
            let request_id = new_request_id();
            debug!(route, request_id = %request_id, "platform call");
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .header("X-Request-ID", &request_id)
                .json(body)
                .send()
                .map_err(transport_error)?;
            read_response(response)
        })?;
        decode(route, &raw)
    }

    fn with_retries<T>(
        &self,
        route: &str,
        replay: Replay,
        mut op: impl FnMut() -> ApiResult<T>,
    ) -> ApiResult<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if replay.allows(&err) && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(route, attempt, delay_ms = delay.as_millis(), error = %err, "retrying platform call");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn upload_content(&self, file_id: &str, path: &Path, digest: &str) -> ApiResult<()> {
        let route = format!("{file_id}/upload");
        let url = self.url(&route);
        self.with_retries(&route, Replay::Safe, || {
            let file = std::fs::File::open(path).map_err(|e| {
                ApiError::new(ApiErrorKind::Other, format!("open {}: {e}", path.display()))
            })?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.token)
                .header("Content-Type", "application/octet-stream")
                .header("X-Content-SHA256", digest)
                .body(Body::from(file))
                .send()
                .map_err(transport_error)?;
            read_response(response).map(|_| ())
        })
    }

    fn wait_until_closed(&self, file_id: &str) -> ApiResult<()> {
        #[derive(Deserialize)]
        struct FileState {
            state: String,
        }

        for _ in 0..self.close_poll_limit {
            let described: FileState = self.call(&format!("{file_id}/describe"), &json!({}))?;
            if described.state == "closed" {
                return Ok(());
            }
            std::thread::sleep(self.close_poll_interval);
        }
        Err(ApiError::new(
            ApiErrorKind::Other,
            format!("file {file_id} did not close in time"),
        ))
    }
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct SearchResults {
    results: Vec<IdResponse>,
}

#[derive(Deserialize)]
struct LogResponse {
    #[serde(default)]
    lines: Vec<String>,
}

impl Platform for ApiClient {
    fn create_project(&self, name: &str) -> ApiResult<String> {
        let created: IdResponse = self.call_once("project/new", &json!({ "name": name }))?;
        Ok(created.id)
    }

    fn destroy_project(&self, project: &str, terminate_jobs: bool) -> ApiResult<()> {
        self.call::<Value>(
            &format!("{project}/destroy"),
            &json!({ "terminateJobs": terminate_jobs }),
        )?;
        Ok(())
    }

    fn remove_objects(&self, project: &str, ids: &[String]) -> ApiResult<()> {
        self.call::<Value>(&format!("{project}/removeObjects"), &json!({ "objects": ids }))?;
        Ok(())
    }

    fn upload_file(&self, upload: &FileUpload<'_>) -> ApiResult<String> {
        let digest = sha256_file(upload.path)?;
        let created: IdResponse = self.call_once(
            "file/new",
            &json!({
                "project": upload.project,
                "folder": upload.folder,
                "name": upload.name,
                "media": upload.media_type,
                "parents": true,
            }),
        )?;
        self.upload_content(&created.id, upload.path, &digest)?;
        self.call::<Value>(&format!("{}/close", created.id), &json!({}))?;
        self.wait_until_closed(&created.id)?;
        debug!(file_id = %created.id, sha256 = %digest, "uploaded file");
        Ok(created.id)
    }

    fn create_applet(&self, spec: &Value) -> ApiResult<String> {
        let created: IdResponse = self.call_once("applet/new", spec)?;
        Ok(created.id)
    }

    fn find_applets(&self, project: &str, folder: &str, name: &str) -> ApiResult<Vec<String>> {
        let found: SearchResults = self.call(
            "system/findDataObjects",
            &json!({
                "class": "applet",
                "name": name,
                "scope": { "project": project, "folder": folder, "recurse": false },
            }),
        )?;
        Ok(found.results.into_iter().map(|r| r.id).collect())
    }

    fn describe_app_version(&self, name: &str, version: &str) -> ApiResult<AppDescription> {
        let route = format!(
            "app-{}/{}/describe",
            urlencoding::encode(name),
            urlencoding::encode(version)
        );
        self.call(&route, &json!({}))
    }

    fn describe_app(&self, app_id: &str) -> ApiResult<AppDescription> {
        self.call(&format!("{app_id}/describe"), &json!({}))
    }

    fn create_app(&self, spec: &Value) -> ApiResult<String> {
        let created: IdResponse = self.call_once("app/new", spec)?;
        Ok(created.id)
    }

    fn update_app(&self, app_id: &str, spec: &Value) -> ApiResult<()> {
        self.call::<Value>(&format!("{app_id}/update"), spec)?;
        Ok(())
    }

    fn publish_app(&self, app_id: &str, make_default: bool) -> ApiResult<()> {
        self.call_once::<Value>(
            &format!("{app_id}/publish"),
            &json!({ "makeDefault": make_default }),
        )?;
        Ok(())
    }

    fn run_app(&self, request: &RunRequest) -> ApiResult<String> {
        let mut body = json!({
            "name": request.name,
            "input": request.input,
            "project": request.project,
        });
        if let Some(folder) = &request.folder {
            body["folder"] = json!(folder);
        }
        let started: IdResponse = self.call_once(&format!("{}/run", request.app), &body)?;
        Ok(started.id)
    }

    fn describe_job(&self, job_id: &str) -> ApiResult<JobDescription> {
        self.call(&format!("{job_id}/describe"), &json!({}))
    }

    fn job_log(&self, job_id: &str, offset: usize) -> ApiResult<Vec<String>> {
        let log: LogResponse = self.call(&format!("{job_id}/getLog"), &json!({ "offset": offset }))?;
        Ok(log.lines)
    }

    fn terminate_job(&self, job_id: &str) -> ApiResult<()> {
        self.call::<Value>(&format!("{job_id}/terminate"), &json!({}))?;
        Ok(())
    }

    fn find_active_jobs(&self, project: &str) -> ApiResult<Vec<String>> {
        let found: SearchResults = self.call(
            "system/findJobs",
            &json!({
                "project": project,
                "state": ["idle", "runnable", "running", "waiting", "terminating"],
            }),
        )?;
        Ok(found.results.into_iter().map(|r| r.id).collect())
    }
}

fn new_request_id() -> String {
    format!(
        "appforge-{}",
        Uuid::new_v4().to_string().split('-').next().unwrap_or("0")
    )
}

fn transport_error(err: reqwest::Error) -> ApiError {
    let kind = if err.is_connect() {
        ApiErrorKind::Unreachable
    } else {
        ApiErrorKind::Transport
    };
    ApiError::new(kind, format!("HTTP request failed: {err}"))
}

fn read_response(response: Response) -> ApiResult<String> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|e| ApiError::new(ApiErrorKind::Transport, format!("failed to read response: {e}")))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(parse_error_body(status.as_u16(), &body))
    }
}

fn decode<T: DeserializeOwned>(route: &str, raw: &str) -> ApiResult<T> {
    let text = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(text).map_err(|e| {
        ApiError::new(
            ApiErrorKind::Other,
            format!("unexpected response from {route}: {e}"),
        )
    })
}

/// Turn a non-2xx response into an [`ApiError`].
pub(crate) fn parse_error_body(status: u16, body: &str) -> ApiError {
    #[derive(Deserialize)]
    struct Envelope {
        error: ErrorBody,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        message: String,
    }

    let error = match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => ApiError::new(
            ApiErrorKind::from_type(&envelope.error.kind),
            envelope.error.message,
        ),
        Err(_) => {
            let kind = match status {
                401 => ApiErrorKind::InvalidAuthentication,
                403 => ApiErrorKind::PermissionDenied,
                404 => ApiErrorKind::ResourceNotFound,
                409 => ApiErrorKind::ResourceExists,
                400 | 422 => ApiErrorKind::InvalidInput,
                429 => ApiErrorKind::RateLimited,
                500..=599 => ApiErrorKind::Server,
                _ => ApiErrorKind::Other,
            };
            let message = if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            };
            ApiError::new(kind, message)
        }
    };
    error.with_status(status)
}

fn sha256_file(path: &Path) -> ApiResult<String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ApiError::new(ApiErrorKind::Other, format!("open {}: {e}", path.display())))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ApiError::new(ApiErrorKind::Other, format!("read {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
