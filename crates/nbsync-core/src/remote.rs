//! The `RemoteClient` trait and the remote API's failure taxonomy.
//!
//! The transport is a black box: `call(resource, action, params)` returns a
//! JSON body (or nothing), and `follow(cursor)` fetches the next page of a
//! paginated listing. Implementations live in `nbsync-http`; tests use an
//! in-memory fake.

use std::{fmt, future::Future};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// The structured body the remote API sends with a 4xx response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientError {
  #[serde(default)]
  pub code:              Option<String>,
  #[serde(default)]
  pub message:           String,
  #[serde(default)]
  pub validation_errors: Vec<String>,
}

impl ClientError {
  /// Parse an error body. Bodies that are not the expected JSON shape are
  /// kept verbatim as the message so substring checks still work.
  pub fn from_body(body: &str) -> Self {
    serde_json::from_str(body).unwrap_or_else(|_| Self {
      code:              None,
      message:           body.to_string(),
      validation_errors: Vec::new(),
    })
  }

  pub fn has_code(&self, code: &str) -> bool {
    self.code.as_deref() == Some(code)
  }

  /// True if the message or any validation error contains `needle`.
  pub fn mentions(&self, needle: &str) -> bool {
    self.message.contains(needle)
      || self.validation_errors.iter().any(|e| e.contains(needle))
  }
}

impl fmt::Display for ClientError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(code) = &self.code {
      write!(f, "[{code}] ")?;
    }
    f.write_str(&self.message)?;
    if !self.validation_errors.is_empty() {
      write!(f, " ({})", self.validation_errors.join("; "))?;
    }
    Ok(())
  }
}

/// Failures a [`RemoteClient`] can raise.
#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("rate limited")]
  RateLimited,

  #[error("not found: {0}")]
  NotFound(ClientError),

  #[error("client error: {0}")]
  Client(ClientError),

  #[error("transport error: {0}")]
  Transport(String),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the remote CRM's REST API.
///
/// `Ok(None)` means the call succeeded with an empty payload; callers decide
/// whether that is acceptable.
pub trait RemoteClient: Send + Sync {
  /// Execute `resource/action` with the given parameters.
  fn call<'a>(
    &'a self,
    resource: &'a str,
    action: &'a str,
    params: Value,
  ) -> impl Future<Output = Result<Option<Value>, RemoteError>> + Send + 'a;

  /// Fetch the page a `next` cursor from a previous listing points at.
  fn follow<'a>(
    &'a self,
    cursor: &'a str,
  ) -> impl Future<Output = Result<Option<Value>, RemoteError>> + Send + 'a;
}
