//! Core types and trait definitions for the nbsync connector.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the member and remote-person models, the comparable snapshot, the
//! field reconciler, and the seams (`RemoteClient`, `MemberStore`, `Cache`)
//! that the other crates implement or consume.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod error;
pub mod event;
pub mod member;
pub mod person;
pub mod phone;
pub mod reconcile;
pub mod remote;
pub mod snapshot;
pub mod store;
pub mod update;

pub use error::{Error, Result};

/// The name the remote CRM is recorded under: external-id system, event
/// source, and subscription change reason.
pub const SYSTEM_NAME: &str = "nation_builder";
