use std::collections::BTreeMap;
use std::future::Future;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://chat.googleapis.com/v1";
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://chat.googleapis.com/upload/v1";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("executing request: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("parsing response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    InvalidInput(String),
}

impl ChatError {
    /// True when no response was obtained at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_) | ChatError::Cancelled)
    }

    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            ChatError::Api(error) => Some(error),
            _ => None,
        }
    }
}

/// A help link attached to an error detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLink {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

/// One entry of the `details` array of an error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "@type", default)]
    pub type_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<ErrorLink>,
}

/// A non-2xx response from the chat API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("API error {code} ({status}): {message}")]
pub struct ApiError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
    #[serde(skip)]
    pub raw_body: String,
}

impl ApiError {
    /// First non-empty reason found in the details.
    pub fn reason(&self) -> Option<&str> {
        self.details
            .iter()
            .filter_map(|detail| detail.reason.as_deref())
            .find(|reason| !reason.is_empty())
    }

    pub fn help_links(&self) -> Vec<&ErrorLink> {
        self.details.iter().flat_map(|detail| detail.links.iter()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

/// Builds an [`ApiError`] from a failed response.
///
/// A conforming `{"error": {...}}` envelope with a non-zero code is used as-is;
/// anything else becomes a generic error carrying the HTTP status, its reason
/// phrase and the trimmed body.
pub fn parse_api_error(status: StatusCode, body: &[u8]) -> ApiError {
    let raw_body = String::from_utf8_lossy(body).into_owned();
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
        if envelope.error.code != 0 {
            return ApiError {
                raw_body,
                ..envelope.error
            };
        }
    }
    ApiError {
        code: i64::from(status.as_u16()),
        message: raw_body.trim().to_string(),
        status: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
        details: Vec::new(),
        raw_body,
    }
}

/// Query parameters of a request. Empty values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_bool(self, key: &str, value: bool) -> Self {
        if value { self.with(key, "true") } else { self }
    }

    pub fn with_int(self, key: &str, value: i64) -> Self {
        if value > 0 {
            self.with(key, value.to_string())
        } else {
            self
        }
    }

    pub fn set(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref();
        if value.is_empty() {
            self.0.remove(key);
        } else {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// One logical API call.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: QueryParams,
    body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryParams::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PATCH, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).body(body)
    }

    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Joins a base endpoint, a relative path and the query string.
pub fn build_url(base_url: &str, path: &str, query: &QueryParams) -> Result<Url, ChatError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined)?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query.iter() {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Prefixes `name` with `prefix` unless it is already there.
///
/// `normalize_name("AAAA", "spaces/")` gives `spaces/AAAA`.
pub fn normalize_name(name: &str, prefix: &str) -> String {
    if name.starts_with(prefix) {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    upload_base_url: String,
    http: Client,
    token: Option<String>,
    cancel: CancellationToken,
}

impl ChatClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            upload_base_url: DEFAULT_UPLOAD_BASE_URL.to_string(),
            http: Client::new(),
            token: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_upload_base_url(mut self, upload_base_url: String) -> Self {
        self.upload_base_url = upload_base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn url_for(&self, request: &Request) -> Result<Url, ChatError> {
        build_url(&self.base_url, &request.path, &request.query)
    }

    pub async fn get(&self, path: &str, query: QueryParams) -> Result<Vec<u8>, ChatError> {
        self.send(Request::get(path).query(query)).await
    }

    /// Performs one round trip and returns the raw success body.
    pub async fn send(&self, request: Request) -> Result<Vec<u8>, ChatError> {
        let url = self.url_for(&request)?;
        let mut builder = self.authorized(self.http.request(request.method.clone(), url.clone()));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        self.round_trip(&request.method, &url, builder).await
    }

    /// Posts an arbitrary body against the upload endpoint.
    pub async fn upload(
        &self,
        path: &str,
        query: QueryParams,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<u8>, ChatError> {
        let url = build_url(&self.upload_base_url, path, &query)?;
        let builder = self
            .authorized(self.http.post(url.clone()))
            .header(CONTENT_TYPE, content_type)
            .body(body);
        self.round_trip(&Method::POST, &url, builder).await
    }

    /// Opens a streaming GET. The connection is held by the returned value
    /// until it is consumed or dropped.
    pub async fn download(&self, path: &str, query: QueryParams) -> Result<Download, ChatError> {
        let url = build_url(&self.base_url, path, &query)?;
        debug!(">> {} {}", Method::GET, url);
        let response = self
            .cancellable(self.authorized(self.http.get(url)).send())
            .await?;
        let status = response.status();
        debug!("<< {} {}", status.as_u16(), status.canonical_reason().unwrap_or(""));
        if !status.is_success() {
            let body = self.cancellable(response.bytes()).await?;
            debug!("<< Response body:\n{}", String::from_utf8_lossy(&body));
            return Err(parse_api_error(status, &body).into());
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Download {
            content_type,
            response,
            cancel: self.cancel.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn round_trip(
        &self,
        method: &Method,
        url: &Url,
        builder: RequestBuilder,
    ) -> Result<Vec<u8>, ChatError> {
        debug!(">> {} {}", method, url);
        let response = self.cancellable(builder.send()).await?;
        let status = response.status();
        let body = self.cancellable(response.bytes()).await?;
        debug!("<< {} {}", status.as_u16(), status.canonical_reason().unwrap_or(""));

        if !status.is_success() {
            debug!("<< Response body:\n{}", String::from_utf8_lossy(&body));
            return Err(parse_api_error(status, &body).into());
        }
        Ok(body.to_vec())
    }

    async fn cancellable<F, T>(&self, future: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, reqwest::Error>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ChatError::Cancelled),
            result = future => result.map_err(ChatError::from),
        }
    }
}

/// An open download stream.
pub struct Download {
    pub content_type: String,
    response: Response,
    cancel: CancellationToken,
}

impl Download {
    /// Streams the body into `writer`, returning the number of bytes written.
    pub async fn copy_to<W>(self, writer: &mut W) -> Result<u64, ChatError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.response.bytes_stream();
        let mut written = 0u64;
        loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ChatError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}
