//! Test doubles: a scripted, recording [`RemoteClient`] and helpers that
//! build a connector over an in-memory SQLite store.

use std::sync::{Arc, Mutex, PoisonError};

use nbsync_core::{
  SYSTEM_NAME,
  cache::MemoryCache,
  member::Member,
  phone::{PhoneKind, PhoneSettings},
  remote::{ClientError, RemoteClient, RemoteError},
  store::{ExternalIds, MemberStore},
  update::{Change, NameParts, PhoneUpdate, UpdateSet},
};
use nbsync_store_sqlite::SqliteStore;
use serde_json::Value;

use crate::{Connector, NationBuilderConfig};

/// One recorded remote call. `follow` calls are recorded with resource
/// `"follow"` and the cursor as the action.
#[derive(Debug, Clone)]
pub struct Call {
  pub resource: String,
  pub action:   String,
  pub params:   Value,
}

impl Call {
  pub fn endpoint(&self) -> String { format!("{}/{}", self.resource, self.action) }
}

type Handler = Box<dyn Fn(&Call) -> Result<Option<Value>, RemoteError> + Send + Sync>;

pub struct FakeNation {
  handler: Handler,
  calls:   Mutex<Vec<Call>>,
}

impl FakeNation {
  pub fn new(
    handler: impl Fn(&Call) -> Result<Option<Value>, RemoteError> + Send + Sync + 'static,
  ) -> Self {
    Self { handler: Box::new(handler), calls: Mutex::new(Vec::new()) }
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn endpoints(&self) -> Vec<String> {
    self.calls().iter().map(Call::endpoint).collect()
  }

  pub fn calls_to(&self, endpoint: &str) -> Vec<Call> {
    self.calls().into_iter().filter(|c| c.endpoint() == endpoint).collect()
  }

  fn record(&self, call: Call) -> Result<Option<Value>, RemoteError> {
    let result = (self.handler)(&call);
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    result
  }
}

impl RemoteClient for FakeNation {
  async fn call(
    &self,
    resource: &str,
    action: &str,
    params: Value,
  ) -> Result<Option<Value>, RemoteError> {
    self.record(Call { resource: resource.into(), action: action.into(), params })
  }

  async fn follow(&self, cursor: &str) -> Result<Option<Value>, RemoteError> {
    self.record(Call { resource: "follow".into(), action: cursor.into(), params: Value::Null })
  }
}

/// The `people/match` miss.
pub fn no_match() -> RemoteError {
  RemoteError::Client(ClientError {
    code:              Some("no_matches".into()),
    message:           "No people matched the given criteria.".into(),
    validation_errors: Vec::new(),
  })
}

pub fn phones() -> PhoneSettings {
  PhoneSettings {
    default_country_code: Some("61".into()),
    mobile_prefix:        "4".into(),
  }
}

pub type TestConnector = Connector<FakeNation, SqliteStore>;

pub async fn connector(nation: FakeNation) -> TestConnector {
  let store = SqliteStore::open_in_memory(phones()).await.expect("in-memory store");
  Connector::new(
    nation,
    store,
    NationBuilderConfig::new("mynation", "t0k", "mysite"),
    phones(),
    Arc::new(MemoryCache::new()),
  )
}

/// A stored member named Ada Lovelace, optionally with a mobile and a
/// remote person id.
pub async fn member_with(
  c: &TestConnector,
  email: &str,
  mobile: Option<&str>,
  person_id: Option<&str>,
) -> Member {
  let update = UpdateSet {
    name: Some(NameParts {
      firstname: Some("Ada".into()),
      lastname: Some("Lovelace".into()),
      ..NameParts::default()
    }),
    email: Some(Change::Set(email.into())),
    phones: mobile
      .map(|m| vec![PhoneUpdate { kind: PhoneKind::Mobile, phone: Change::Set(m.into()) }])
      .unwrap_or_default(),
    ..UpdateSet::default()
  };
  let external_ids: ExternalIds = person_id
    .map(|id| ExternalIds::from([(SYSTEM_NAME.to_string(), id.to_string())]))
    .unwrap_or_default();
  c.store()
    .upsert_member(&update, &external_ids, false, "test")
    .await
    .expect("upsert member")
}
