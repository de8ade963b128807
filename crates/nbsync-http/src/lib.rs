//! `RemoteClient` over the NationBuilder v1 REST API.
//!
//! [`route`] maps `(resource, action, params)` onto a method, path, query and
//! body; [`HttpNation`] sends it with `reqwest` and maps the response status
//! onto [`RemoteError`](nbsync_core::remote::RemoteError).

mod client;
mod route;

pub mod error;

pub use client::{HttpConfig, HttpNation};
pub use error::{Error, Result};
pub use route::{Route, route};
