//! Error type for `nbsync-http`.

use nbsync_core::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Build(#[from] reqwest::Error),

  #[error("unknown endpoint {resource}/{action}")]
  UnknownEndpoint { resource: String, action: String },

  #[error("{endpoint} needs the {param:?} parameter")]
  MissingParam { endpoint: String, param: String },
}

impl From<Error> for RemoteError {
  fn from(e: Error) -> Self { Self::Transport(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
