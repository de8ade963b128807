//! [`NationApi`]: the typed layer over a [`RemoteClient`].
//!
//! Every call goes through [`NationApi::call`], which adds
//! `fire_webhooks = false`, logs the call when the nation's `debug` flag is
//! set, maps transport failures onto [`Error`], and treats an empty payload
//! as fatal.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use nbsync_core::{
  Error, Result,
  cache::{Cache, RECRUITERS_KEY, SITES_EVENTS_KEY, SITES_KEY},
  person::{PersonId, RemotePerson},
  remote::RemoteClient,
};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::config::NationBuilderConfig;

/// Page size requested from paginated endpoints.
pub const PAGE_LIMIT: u64 = 100;

/// The message the remote API gives for a second RSVP by the same person.
const DUPLICATE_SIGNUP: &str = "signup_id has already been taken";

/// The tag recruiters carry.
const RECRUITER_TAG: &str = "recruiter";

/// Read an id the remote API may send as a number or a numeric string.
pub(crate) fn as_id(value: &Value) -> Option<u64> {
  match value {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Which single field a `people/match` call is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
  Email,
  Mobile,
  Phone,
}

impl MatchField {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Email => "email",
      Self::Mobile => "mobile",
      Self::Phone => "phone",
    }
  }
}

/// Outcome of an RSVP create.
#[derive(Debug, Clone, PartialEq)]
pub enum RsvpCreate {
  Created(Value),
  /// The person already holds an RSVP for the event.
  AlreadyTaken,
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// One page of a paginated listing and the way to the next.
pub struct Paginator<'a, C> {
  api:  &'a NationApi<C>,
  body: Value,
}

impl<'a, C: RemoteClient> Paginator<'a, C> {
  pub fn body(&self) -> &Value { &self.body }

  pub fn results(&self) -> Vec<Value> {
    match self.body.get("results") {
      Some(Value::Array(items)) => items.clone(),
      _ => Vec::new(),
    }
  }

  fn cursor(&self) -> Option<&str> {
    self.body.get("next").and_then(Value::as_str).filter(|s| !s.is_empty())
  }

  pub fn has_next(&self) -> bool { self.cursor().is_some() }

  /// Fetch the following page. Errors if there is none.
  pub async fn next(&self) -> Result<Paginator<'a, C>> {
    let cursor = self.cursor().ok_or_else(|| Error::UnexpectedResponse {
      endpoint: "pagination".into(),
      reason:   "no next page".into(),
    })?;
    let body = self.api.follow(cursor).await?;
    Ok(Paginator { api: self.api, body })
  }
}

// ─── API ─────────────────────────────────────────────────────────────────────

pub struct NationApi<C> {
  client: C,
  config: NationBuilderConfig,
  cache:  Arc<dyn Cache>,
}

impl<C: RemoteClient> NationApi<C> {
  pub fn new(client: C, config: NationBuilderConfig, cache: Arc<dyn Cache>) -> Self {
    Self { client, config, cache }
  }

  pub fn config(&self) -> &NationBuilderConfig { &self.config }

  pub fn client(&self) -> &C { &self.client }

  fn log_call(&self, endpoint: &str, params: &Value, started: Instant, outcome: &Result<Value>) {
    if !self.config.debug {
      return;
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
      Ok(body) => debug!(endpoint, %params, %body, elapsed_ms, "remote call"),
      Err(e) => debug!(endpoint, %params, error = %e, elapsed_ms, "remote call failed"),
    }
  }

  /// Execute `resource/action`. `params` must be a JSON object or null.
  pub async fn call(&self, resource: &str, action: &str, params: Value) -> Result<Value> {
    let endpoint = format!("{resource}/{action}");
    let mut params = match params {
      Value::Object(map) => map,
      Value::Null => Map::new(),
      other => {
        return Err(Error::InvalidParams(format!("{endpoint} called with {other}")));
      }
    };
    params.insert("fire_webhooks".into(), Value::Bool(false));
    let params = Value::Object(params);

    let started = Instant::now();
    let outcome = match self.client.call(resource, action, params.clone()).await {
      Ok(Some(body)) => Ok(body),
      Ok(None) => Err(Error::EmptyPayload { endpoint: endpoint.clone() }),
      Err(e) => Err(Error::from(e)),
    };
    self.log_call(&endpoint, &params, started, &outcome);
    outcome
  }

  async fn follow(&self, cursor: &str) -> Result<Value> {
    let started = Instant::now();
    let outcome = match self.client.follow(cursor).await {
      Ok(Some(body)) => Ok(body),
      Ok(None) => Err(Error::EmptyPayload { endpoint: cursor.to_owned() }),
      Err(e) => Err(Error::from(e)),
    };
    self.log_call(cursor, &Value::Null, started, &outcome);
    outcome
  }

  /// The first page of a listing.
  pub async fn page(&self, resource: &str, action: &str, params: Value) -> Result<Paginator<'_, C>> {
    let mut params = params;
    if let Value::Object(map) = &mut params {
      map.entry("limit").or_insert(json!(PAGE_LIMIT));
    }
    let body = self.call(resource, action, params).await?;
    Ok(Paginator { api: self, body })
  }

  /// Every result of a listing, following cursors until exhausted.
  pub async fn paginate(&self, resource: &str, action: &str, params: Value) -> Result<Vec<Value>> {
    let mut page = self.page(resource, action, params).await?;
    let mut results = page.results();
    while page.has_next() {
      page = page.next().await?;
      results.extend(page.results());
    }
    Ok(results)
  }

  // ── People ──────────────────────────────────────────────────────────────

  fn person_from(endpoint: &str, mut body: Value) -> Result<RemotePerson> {
    match body.get_mut("person").map(Value::take) {
      Some(person @ Value::Object(_)) => Ok(RemotePerson::from_value(person)?),
      _ => Err(Error::UnexpectedResponse {
        endpoint: endpoint.to_owned(),
        reason:   "missing person".into(),
      }),
    }
  }

  pub async fn person(&self, id: PersonId) -> Result<RemotePerson> {
    let body = self.call("people", "show", json!({ "id": id })).await?;
    Self::person_from("people/show", body)
  }

  /// `None` when the remote API reports `no_matches`.
  pub async fn match_person(&self, field: MatchField, value: &str) -> Result<Option<RemotePerson>> {
    let mut params = Map::new();
    params.insert(field.as_str().into(), json!(value));
    match self.call("people", "match", Value::Object(params)).await {
      Ok(body) => Self::person_from("people/match", body).map(Some),
      Err(Error::Validation(e)) if e.has_code("no_matches") => Ok(None),
      Err(e) => Err(e),
    }
  }

  pub async fn create_person(&self, person: Map<String, Value>) -> Result<RemotePerson> {
    let body = self.call("people", "create", json!({ "person": person })).await?;
    Self::person_from("people/create", body)
  }

  pub async fn update_person(&self, id: PersonId, person: Map<String, Value>) -> Result<RemotePerson> {
    let body = self
      .call("people", "update", json!({ "id": id, "person": person }))
      .await?;
    Self::person_from("people/update", body)
  }

  // ── Sites and events ────────────────────────────────────────────────────

  /// Every site of the nation. Refreshes the sites cache.
  pub async fn sites(&self) -> Result<Vec<Value>> {
    let sites = self.paginate("sites", "index", json!({})).await?;
    self.cache.write(SITES_KEY, Value::Array(sites.clone()));
    Ok(sites)
  }

  /// Events of every site starting from `starting`, each tagged with its
  /// `site_slug`. Refreshes the events cache.
  pub async fn sites_events(&self, starting: DateTime<Utc>) -> Result<Vec<Value>> {
    let starting = starting.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut events = Vec::new();
    for site in self.sites().await? {
      let Some(slug) = site.get("slug").and_then(Value::as_str) else {
        continue;
      };
      let listed = self
        .paginate(
          "events",
          "index",
          json!({ "site_slug": slug, "starting": starting }),
        )
        .await?;
      events.extend(listed.into_iter().map(|mut event| {
        if let Value::Object(map) = &mut event {
          map.insert("site_slug".into(), json!(slug));
        }
        event
      }));
    }
    info!(count = events.len(), "listed events");
    self.cache.write(SITES_EVENTS_KEY, Value::Array(events.clone()));
    Ok(events)
  }

  pub async fn event_rsvps(&self, site_slug: &str, event_id: u64) -> Result<Vec<Value>> {
    self
      .paginate("events", "rsvps", json!({ "site_slug": site_slug, "id": event_id }))
      .await
  }

  /// Create an RSVP. A duplicate signup is reported, not raised.
  pub async fn rsvp_create(&self, site_slug: &str, event_id: u64, rsvp: Value) -> Result<RsvpCreate> {
    let params = json!({ "site_slug": site_slug, "id": event_id, "rsvp": rsvp });
    match self.call("events", "rsvp_create", params).await {
      Ok(body) => Ok(RsvpCreate::Created(body)),
      Err(Error::Validation(e)) if e.mentions(DUPLICATE_SIGNUP) => Ok(RsvpCreate::AlreadyTaken),
      Err(e) => Err(e),
    }
  }

  pub async fn rsvp_update(
    &self,
    site_slug: &str,
    event_id: u64,
    rsvp_id: u64,
    rsvp: Value,
  ) -> Result<Value> {
    let params = json!({ "site_slug": site_slug, "id": event_id, "rsvp_id": rsvp_id, "rsvp": rsvp });
    self.call("events", "rsvp_update", params).await
  }

  // ── Lists ───────────────────────────────────────────────────────────────

  /// Create a list and return its id.
  pub async fn list_create(&self, name: &str, slug: &str) -> Result<u64> {
    let mut list = json!({ "name": name, "slug": slug });
    if let (Some(author), Value::Object(map)) = (self.config.author_id, &mut list) {
      map.insert("author_id".into(), json!(author));
    }
    let body = self.call("lists", "create", json!({ "list": list })).await?;
    body
      .get("list_resource")
      .and_then(|l| l.get("id"))
      .and_then(as_id)
      .ok_or_else(|| Error::UnexpectedResponse {
        endpoint: "lists/create".into(),
        reason:   "missing list_resource.id".into(),
      })
  }

  /// The list called `name`.
  pub async fn list_find(&self, name: &str) -> Result<Value> {
    self
      .paginate("lists", "index", json!({}))
      .await?
      .into_iter()
      .find(|list| list.get("name").and_then(Value::as_str) == Some(name))
      .ok_or_else(|| Error::ListNotFound(name.to_owned()))
  }

  pub async fn list_add_people(&self, list_id: u64, people: &[PersonId]) -> Result<Value> {
    self
      .call("lists", "add_people", json!({ "list_id": list_id, "people_ids": people }))
      .await
  }

  /// Tag every person on a list. The tag is percent-encoded into the path.
  pub async fn list_add_tag(&self, list_id: u64, tag: &str) -> Result<Value> {
    let tag = urlencoding::encode(tag);
    self
      .call("lists", "add_tag", json!({ "list_id": list_id, "tag": tag }))
      .await
  }

  // ── Recruiters ──────────────────────────────────────────────────────────

  /// People tagged as recruiters, as `(display name, id)`. Refreshes the
  /// recruiters cache.
  pub async fn recruiters(&self) -> Result<Vec<(String, PersonId)>> {
    let people = self
      .paginate("tags", "people", json!({ "tag": RECRUITER_TAG }))
      .await?;
    let recruiters: Vec<(String, PersonId)> = people
      .iter()
      .filter_map(|p| {
        let id = p.get("id").and_then(as_id)?;
        let name = [p.get("first_name"), p.get("last_name")]
          .into_iter()
          .flatten()
          .filter_map(Value::as_str)
          .filter(|s| !s.is_empty())
          .collect::<Vec<_>>()
          .join(" ");
        Some((name, id))
      })
      .collect();
    self.cache.write(RECRUITERS_KEY, json!(recruiters));
    Ok(recruiters)
  }

  // ── Cache readers ───────────────────────────────────────────────────────

  pub fn cached_sites(&self) -> Vec<Value> { self.cache.read_list(SITES_KEY) }

  pub fn cached_sites_events(&self) -> Vec<Value> { self.cache.read_list(SITES_EVENTS_KEY) }

  pub fn cached_recruiters(&self) -> Vec<(String, PersonId)> {
    self
      .cache
      .read_list(RECRUITERS_KEY)
      .into_iter()
      .filter_map(|entry| serde_json::from_value(entry).ok())
      .collect()
  }
}
