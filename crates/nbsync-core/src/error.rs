//! Error types for `nbsync-core` and the crates built on it.

use thiserror::Error;

use crate::remote::{ClientError, RemoteError};

#[derive(Debug, Error)]
pub enum Error {
  /// The remote API asked us to back off. Never absorbed; the surrounding
  /// job infrastructure owns retry.
  #[error("rate limited by the remote API")]
  RateLimited,

  #[error("validation failed: {0}")]
  Validation(ClientError),

  #[error("record not found: {0}")]
  NotFound(ClientError),

  /// The remote API answered with no body where one was expected. This is
  /// how silent rate limiting shows up.
  #[error("empty payload returned from {endpoint}, likely due to rate limiting")]
  EmptyPayload { endpoint: String },

  #[error("unexpected response from {endpoint}: {reason}")]
  UnexpectedResponse { endpoint: String, reason: String },

  #[error("transport error: {0}")]
  Transport(String),

  #[error("invalid external id: {0:?}")]
  InvalidExternalId(String),

  #[error("no list named {0:?}")]
  ListNotFound(String),

  #[error("invalid sync parameters: {0}")]
  InvalidParams(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A failure from the local member-upsert collaborator. Never caught
  /// in-core.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a store backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub fn is_rate_limited(&self) -> bool {
    matches!(self, Self::RateLimited | Self::EmptyPayload { .. })
  }
}

impl From<RemoteError> for Error {
  fn from(e: RemoteError) -> Self {
    match e {
      RemoteError::RateLimited => Self::RateLimited,
      RemoteError::NotFound(body) => Self::NotFound(body),
      RemoteError::Client(body) => Self::Validation(body),
      RemoteError::Transport(msg) => Self::Transport(msg),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
