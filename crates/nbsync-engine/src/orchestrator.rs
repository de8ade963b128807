//! The upsert orchestrator: resolve, reconcile, apply locally, push the
//! rest remotely.
//!
//! This is the only place either side is mutated. Local changes always go
//! through [`MemberStore::upsert_member`].

use chrono::{DateTime, Utc};
use nbsync_core::{
  Error, Result, SYSTEM_NAME,
  member::Member,
  person::PersonId,
  reconcile::{Strategy, reconcile},
  remote::RemoteClient,
  snapshot::{LocalSnapshot, Snapshot},
  store::{ExternalIds, MemberStore},
};
use tracing::{debug, info};

use crate::{Connector, resolver::Resolution};

impl<C: RemoteClient, S: MemberStore> Connector<C, S> {
  /// Bring one member and its remote person into agreement and return the
  /// remote person id.
  ///
  /// Holds the member's lock for the whole resolve, reconcile, apply and
  /// push sequence.
  pub async fn sync_person(&self, member: &Member) -> Result<PersonId> {
    let _guard = self.locks.lock(member.member_id).await;
    let local = LocalSnapshot::from_member(member, &self.phones);

    let resolution = self.resolve(member).await?;
    let strategy = Strategy::for_link(matches!(resolution, Resolution::Linked(_)));
    let person = match resolution {
      Resolution::Unmatched => {
        let person = self.create_remote(&local.snapshot).await?;
        self.link(member.member_id, person.id).await?;
        info!(member_id = %member.member_id, person_id = person.id, "created remote person");
        return Ok(person.id);
      }
      Resolution::Matched(person) => {
        self.link(member.member_id, person.id).await?;
        person
      }
      Resolution::Linked(person) => person,
    };

    let remote = Snapshot::from_remote(&person);
    if local.snapshot == remote {
      debug!(member_id = %member.member_id, person_id = person.id, "already in sync");
      return Ok(person.id);
    }

    let remote_updated_at = person.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let update = reconcile(&local, &remote, remote_updated_at, strategy);

    let current = if update.is_empty() {
      member.clone()
    } else {
      debug!(member_id = %member.member_id, update = %update.to_payload(), "applying remote changes");
      let external_ids = ExternalIds::from([(SYSTEM_NAME.to_string(), person.id.to_string())]);
      self
        .store
        .upsert_member(&update, &external_ids, false, SYSTEM_NAME)
        .await
        .map_err(Error::store)?
    };

    let settled = Snapshot::from_member(&current, &self.phones);
    if settled != remote {
      let diff = settled.remote_diff(&remote);
      debug!(person_id = person.id, keys = diff.len(), "pushing local changes");
      self.api.update_person(person.id, diff).await?;
    }

    info!(member_id = %member.member_id, person_id = person.id, ?strategy, "synced person");
    Ok(person.id)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use chrono::Duration;
  use nbsync_core::phone::PhoneKind;
  use serde_json::{Value, json};

  use super::*;
  use crate::testing::{FakeNation, connector, member_with, no_match, phones};

  /// A remote person mirroring `member_with(.., "ada@example.com", mobile, ..)`.
  fn ada(id: u64, updated_at: DateTime<Utc>) -> Value {
    json!({
      "id": id,
      "updated_at": updated_at,
      "first_name": "Ada",
      "last_name": "Lovelace",
      "email": "ada@example.com",
      "mobile": "0468519266",
      "email_opt_in": false,
      "mobile_opt_in": false,
      "do_not_call": true
    })
  }

  /// Answers `people/show` and `people/update` with `person`, applying
  /// updates to it.
  fn serving(person: Value) -> FakeNation {
    let person = Arc::new(Mutex::new(person));
    FakeNation::new(move |call| {
      let mut person = person.lock().unwrap();
      match call.endpoint().as_str() {
        "people/show" | "people/match" => Ok(Some(json!({ "person": *person }))),
        "people/update" => {
          for (k, v) in call.params["person"].as_object().unwrap() {
            person[k] = v.clone();
          }
          Ok(Some(json!({ "person": *person })))
        }
        _ => Err(no_match()),
      }
    })
  }

  #[tokio::test]
  async fn unmatched_member_is_created_and_linked() {
    let nation = FakeNation::new(|call| match call.endpoint().as_str() {
      "people/create" => Ok(Some(json!({ "person": { "id": 31 } }))),
      _ => Err(no_match()),
    });
    let c = connector(nation).await;
    let m = member_with(&c, "ada@example.com", Some("0468519266"), None).await;

    assert_eq!(c.sync_person(&m).await.unwrap(), 31);

    let create = &c.api().client().calls_to("people/create")[0];
    assert_eq!(create.params["person"]["email"], json!("ada@example.com"));
    assert_eq!(create.params["person"]["mobile"], json!("0468519266"));
    let linked = c.store().find_by_external_id(SYSTEM_NAME, "31").await.unwrap().unwrap();
    assert_eq!(linked.member_id, m.member_id);
  }

  #[tokio::test]
  async fn linked_and_equal_is_a_no_op() {
    let c = connector(serving(ada(77, Utc::now()))).await;
    let m = member_with(&c, "ada@example.com", Some("0468519266"), Some("77")).await;

    assert_eq!(c.sync_person(&m).await.unwrap(), 77);
    assert_eq!(c.api().client().endpoints(), vec!["people/show"]);
  }

  #[tokio::test]
  async fn first_match_merges_both_ways() {
    let mut remote = ada(5, Utc::now() - Duration::days(30));
    remote["mobile"] = Value::Null;
    remote["phone"] = json!("0295700000");
    let c = connector(serving(remote)).await;
    let m = member_with(&c, "ada@example.com", Some("0468519266"), None).await;

    assert_eq!(c.sync_person(&m).await.unwrap(), 5);

    // The remote-only landline came down.
    let stored = c.store().get_member(m.member_id).await.unwrap().unwrap();
    assert_eq!(
      stored.phone_of_kind(PhoneKind::Landline, &phones()).map(|p| p.phone.as_str()),
      Some("0295700000")
    );
    assert_eq!(stored.external_id(SYSTEM_NAME).unwrap().external_id, "5");

    // The local-only mobile went up, and nothing else.
    let updates = c.api().client().calls_to("people/update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].params["id"], json!(5));
    assert_eq!(updates[0].params["person"], json!({ "mobile": "0468519266" }));
  }

  #[tokio::test]
  async fn linked_and_remote_newer_overwrites_locally() {
    let mut remote = ada(77, Utc::now() + Duration::days(1));
    remote["email"] = json!("countess@example.com");
    let c = connector(serving(remote)).await;
    let m = member_with(&c, "ada@example.com", Some("0468519266"), Some("77")).await;

    c.sync_person(&m).await.unwrap();

    let stored = c.store().get_member(m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.email.as_deref(), Some("countess@example.com"));
    assert!(c.api().client().calls_to("people/update").is_empty());
  }

  #[tokio::test]
  async fn linked_and_local_newer_pushes_whole_name() {
    let mut remote = ada(77, Utc::now() - Duration::days(1));
    remote["last_name"] = json!("Byron");
    let c = connector(serving(remote)).await;
    let m = member_with(&c, "ada@example.com", Some("0468519266"), Some("77")).await;

    c.sync_person(&m).await.unwrap();

    let stored = c.store().get_member(m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.last_name.as_deref(), Some("Lovelace"));

    let updates = c.api().client().calls_to("people/update");
    assert_eq!(updates.len(), 1);
    assert_eq!(
      updates[0].params["person"],
      json!({
        "first_name": "Ada",
        "middle_name": null,
        "last_name": "Lovelace",
        "prefix": null,
        "sex": null
      })
    );
  }
}
