//! The transport core every facade call goes through.
//!
//! # Design
//! A request is first built as plain data (`build_request`), which is where
//! the outbound auth interceptor attaches the bearer credential. It is then
//! executed with reqwest and the response comes back as plain data, which
//! `interpret` runs through the inbound side: a 401 expires the session, any
//! non-2xx is normalized, and a 2xx body is decoded in full or rejected.
//! Neither interceptor can be skipped by a call site.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

use crate::auth::Session;
use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorKind, INVALID_RESPONSE_MESSAGE};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::retry::with_retry_if;

/// Upload progress callback, called with whole percentages in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// HTTP client bound to one backend and one session.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    config: ClientConfig,
    session: Session,
}

impl Transport {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(ApiError::invalid_request)?;

        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Describe a request, with the stored credential attached if there is one.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        query: &[(&str, &str)],
    ) -> HttpRequest {
        let credential = self.session.credential();
        let mut headers = Vec::new();
        if let Some(token) = &credential {
            headers.push((AUTHORIZATION.as_str().to_string(), format!("Bearer {token}")));
        }

        HttpRequest {
            method,
            url: format!("{}{path}", self.config.base_url()),
            path: path.to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers,
            body,
            credential,
        }
    }

    /// Inbound side: expire the session on 401, normalize failures, decode
    /// successes completely.
    pub fn interpret<T: DeserializeOwned>(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> Result<T, ApiError> {
        if !response.is_success() {
            if response.status == 401 {
                self.session.expire(request.credential.as_deref());
            }
            return Err(ApiError::from_response(&response));
        }
        decode_body(&response)
    }

    pub async fn send<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let request = self.build_request(method, path, body, query);
        self.dispatch(request, None).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.send(HttpMethod::Get, path, None, query).await
    }

    /// GET with bounded backoff. Writes have no retrying counterpart.
    ///
    /// A 401 is not retried: the session has already been expired.
    pub async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        max_attempts: u32,
    ) -> Result<T, ApiError> {
        with_retry_if(
            move || self.get(path, query),
            max_attempts,
            |err: &ApiError| err.kind != ErrorKind::Authorization,
        )
        .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(HttpMethod::Post, path, Some(encode(body)?), &[]).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(HttpMethod::Put, path, Some(encode(body)?), &[]).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(HttpMethod::Patch, path, Some(encode(body)?), &[]).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(HttpMethod::Delete, path, None, &[]).await
    }

    /// POST `file` as the `file` field of a multipart form, streaming it from
    /// disk and reporting progress as it is sent.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        file: &Path,
        on_progress: Option<ProgressFn>,
    ) -> Result<T, ApiError> {
        let handle = tokio::fs::File::open(file)
            .await
            .map_err(ApiError::invalid_request)?;
        let total = handle
            .metadata()
            .await
            .map_err(ApiError::invalid_request)?
            .len();
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut progress = Progress::new(total, on_progress);
        if total == 0 {
            progress.advance(0);
        }
        let stream = ReaderStream::new(handle).inspect_ok(move |chunk| progress.advance(chunk.len()));
        let part = Part::stream_with_length(Body::wrap_stream(stream), total).file_name(file_name);
        let form = Form::new().part("file", part);

        let request = self.build_request(HttpMethod::Post, path, None, &[]);
        self.dispatch(request, Some(form)).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        form: Option<Form>,
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        let response = self.execute(&request, form).await?;
        info!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "API response"
        );
        self.interpret(&request, response)
    }

    async fn execute(
        &self,
        request: &HttpRequest,
        form: Option<Form>,
    ) -> Result<HttpResponse, ApiError> {
        let mut builder = self.http.request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(form) = form {
            builder = builder.multipart(form);
        }

        let response = builder.send().await.map_err(|err| {
            error!(method = %request.method, path = %request.path, error = %err, "network error");
            ApiError::connectivity(err)
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| {
            error!(method = %request.method, path = %request.path, error = %err, "network error");
            ApiError::connectivity(err)
        })?;

        Ok(HttpResponse { status, body })
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(ApiError::invalid_request)
}

fn decode_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    let parsed = if response.body.trim().is_empty() {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_str(&response.body)
    };
    parsed.map_err(|err| {
        ApiError::envelope(response.status, INVALID_RESPONSE_MESSAGE, response.json_body())
            .with_cause(err)
    })
}

/// Percentage tracker; only ever reports a value larger than the last one.
struct Progress {
    total: u64,
    sent: u64,
    reported: Option<u8>,
    callback: Option<ProgressFn>,
}

impl Progress {
    fn new(total: u64, callback: Option<ProgressFn>) -> Self {
        Self {
            total,
            sent: 0,
            reported: None,
            callback,
        }
    }

    fn advance(&mut self, bytes: usize) {
        let Some(callback) = &self.callback else {
            return;
        };
        self.sent = self.sent.saturating_add(bytes as u64);
        let percent = if self.total == 0 {
            100
        } else {
            ((self.sent.min(self.total) * 100 + self.total / 2) / self.total) as u8
        };
        if self.reported.map_or(true, |last| percent > last) {
            self.reported = Some(percent);
            callback(percent);
        }
    }
}
