//! The NationBuilder sync engine.
//!
//! [`Connector`] ties a [`RemoteClient`] and a [`MemberStore`] together and
//! exposes the sync entrypoints: per-member reconciliation, the RSVP and tag
//! batch workflows, the daily attendance batch, and the event pull.

pub mod api;
pub mod batch;
pub mod config;
pub mod jobs;
pub mod locks;
pub mod orchestrator;
pub mod pull;
pub mod resolver;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use nbsync_core::{
  Error, Result, SYSTEM_NAME,
  cache::Cache,
  member::ExternalId,
  person::PersonId,
  phone::PhoneSettings,
  remote::RemoteClient,
  store::MemberStore,
};
use uuid::Uuid;

pub use api::NationApi;
pub use config::NationBuilderConfig;
pub use jobs::SyncParams;

use crate::locks::MemberLocks;

/// The connector between one nation and the local member store.
pub struct Connector<C, S> {
  api:    NationApi<C>,
  store:  S,
  phones: PhoneSettings,
  locks:  MemberLocks,
}

impl<C: RemoteClient, S: MemberStore> Connector<C, S> {
  pub fn new(
    client: C,
    store: S,
    config: NationBuilderConfig,
    phones: PhoneSettings,
    cache: Arc<dyn Cache>,
  ) -> Self {
    Self {
      api: NationApi::new(client, config, cache),
      store,
      phones,
      locks: MemberLocks::default(),
    }
  }

  pub fn api(&self) -> &NationApi<C> { &self.api }

  pub fn store(&self) -> &S { &self.store }

  pub fn phones(&self) -> &PhoneSettings { &self.phones }

  /// Record `person_id` as the member's remote id.
  async fn link(&self, member_id: Uuid, person_id: PersonId) -> Result<ExternalId> {
    self
      .store
      .link_external_id(member_id, SYSTEM_NAME, &person_id.to_string())
      .await
      .map_err(Error::store)
  }
}
