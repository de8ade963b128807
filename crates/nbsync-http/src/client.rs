//! [`HttpNation`], the `reqwest` implementation of [`RemoteClient`].

use std::time::Duration;

use nbsync_core::remote::{ClientError, RemoteClient, RemoteError};
use reqwest::{Client, Method, StatusCode, header::ACCEPT};
use serde_json::Value;
use tracing::trace;

use crate::{Result, route::route};

/// Connection settings for one nation.
#[derive(Debug, Clone)]
pub struct HttpConfig {
  /// The nation slug, as in `https://<site>.nationbuilder.com`.
  pub site:         String,
  pub token:        String,
  /// Overrides the host derived from `site`.
  pub base_url:     Option<String>,
  pub timeout_secs: u64,
}

impl HttpConfig {
  pub fn new(site: impl Into<String>, token: impl Into<String>) -> Self {
    Self {
      site:         site.into(),
      token:        token.into(),
      base_url:     None,
      timeout_secs: 30,
    }
  }

  /// Scheme and host, without a trailing slash.
  pub fn host(&self) -> String {
    match &self.base_url {
      Some(url) => url.trim_end_matches('/').to_owned(),
      None => format!("https://{}.nationbuilder.com", self.site),
    }
  }
}

/// Async client for the NationBuilder v1 API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based. Requests
/// are never retried here.
#[derive(Clone)]
pub struct HttpNation {
  client: Client,
  host:   String,
  token:  String,
}

impl HttpNation {
  pub fn new(config: HttpConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { client, host: config.host(), token: config.token })
  }

  fn api_url(&self, path: &str) -> String { format!("{}/api/v1{}", self.host, path) }

  /// A `next` cursor is either an absolute URL or a host-relative path.
  fn cursor_url(&self, cursor: &str) -> String {
    if cursor.starts_with("http://") || cursor.starts_with("https://") {
      cursor.to_owned()
    } else {
      format!("{}{}", self.host, cursor)
    }
  }

  async fn send(
    &self,
    method: Method,
    url: String,
    query: &[(String, String)],
    body: Option<&Value>,
  ) -> Result<Option<Value>, RemoteError> {
    trace!(%method, %url, "sending request");

    let mut req = self
      .client
      .request(method, &url)
      .header(ACCEPT, "application/json")
      .query(query)
      .query(&[("access_token", self.token.as_str())]);
    if let Some(body) = body {
      req = req.json(body);
    }

    let resp = req
      .send()
      .await
      .map_err(|e| RemoteError::Transport(e.to_string()))?;
    let status = resp.status();
    let text = resp
      .text()
      .await
      .map_err(|e| RemoteError::Transport(e.to_string()))?;
    interpret(status, &text)
  }
}

/// Map a response onto the remote failure taxonomy. A successful empty body
/// is `Ok(None)`.
pub(crate) fn interpret(status: StatusCode, body: &str) -> Result<Option<Value>, RemoteError> {
  if status.is_success() {
    if body.trim().is_empty() {
      return Ok(None);
    }
    return serde_json::from_str(body)
      .map(Some)
      .map_err(|e| RemoteError::Transport(format!("invalid JSON body: {e}")));
  }
  match status {
    StatusCode::TOO_MANY_REQUESTS => Err(RemoteError::RateLimited),
    StatusCode::NOT_FOUND => Err(RemoteError::NotFound(ClientError::from_body(body))),
    s if s.is_client_error() => Err(RemoteError::Client(ClientError::from_body(body))),
    s => Err(RemoteError::Transport(format!("{s}: {body}"))),
  }
}

impl RemoteClient for HttpNation {
  async fn call(
    &self,
    resource: &str,
    action: &str,
    params: Value,
  ) -> Result<Option<Value>, RemoteError> {
    let route = route(resource, action, params)?;
    let url = self.api_url(&route.path);
    self.send(route.method, url, &route.query, route.body.as_ref()).await
  }

  async fn follow(&self, cursor: &str) -> Result<Option<Value>, RemoteError> {
    self.send(Method::GET, self.cursor_url(cursor), &[], None).await
  }
}
