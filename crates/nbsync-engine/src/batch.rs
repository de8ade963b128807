//! Batch workflows that resolve many members to remote people and then
//! perform one remote side effect: RSVP to an event, tag through a list,
//! or mark today's attendance.

use chrono::{NaiveDate, Utc};
use nbsync_core::{
  Error, Result, SYSTEM_NAME,
  member::Member,
  person::PersonId,
  remote::RemoteClient,
  store::MemberStore,
};
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Connector,
  api::{RsvpCreate, as_id},
  resolver::parse_remote_id,
};

/// A member and the remote person it was resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncedMember {
  pub member_id: Uuid,
  pub person_id: PersonId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
  pub count:   usize,
  pub members: Vec<SyncedMember>,
}

impl BatchResult {
  fn push(&mut self, member_id: Uuid, person_id: PersonId) {
    self.count += 1;
    self.members.push(SyncedMember { member_id, person_id });
  }
}

/// Slug for a throwaway tagging list: `tempid_` and 16 random hex digits.
fn temp_list_slug() -> String {
  let mut bytes = [0u8; 8];
  OsRng.fill_bytes(&mut bytes);
  format!("tempid_{}", hex::encode(bytes))
}

fn find_rsvp(rsvps: &[Value], person_id: PersonId) -> Option<&Value> {
  rsvps
    .iter()
    .find(|r| r.get("person_id").and_then(as_id) == Some(person_id))
}

impl<C: RemoteClient, S: MemberStore> Connector<C, S> {
  /// Resolve ignoring any stored link, then record the fresh link.
  async fn relink(&self, member: &Member) -> Result<PersonId> {
    let fresh = member.without_external_ids(SYSTEM_NAME);
    let person_id = self.find_or_create(&fresh).await?;
    self.link(member.member_id, person_id).await?;
    Ok(person_id)
  }

  /// RSVP every member to `event_id` on `site_slug`.
  ///
  /// A duplicate signup is absorbed; with `mark_attended` the existing RSVP
  /// is looked up and marked attended if it is not already.
  pub async fn rsvp_batch(
    &self,
    members: &[Member],
    site_slug: &str,
    event_id: u64,
    mark_attended: bool,
    recruiter_id: Option<PersonId>,
  ) -> Result<BatchResult> {
    let mut result = BatchResult::default();
    for member in members {
      let person_id = self.relink(member).await?;

      let mut rsvp = json!({ "person_id": person_id, "attended": mark_attended });
      if let (Some(recruiter), Value::Object(map)) = (recruiter_id, &mut rsvp) {
        map.insert("recruiter_id".into(), json!(recruiter));
      }

      match self.api.rsvp_create(site_slug, event_id, rsvp).await? {
        RsvpCreate::Created(_) => {}
        RsvpCreate::AlreadyTaken if mark_attended => {
          self.mark_existing_attended(site_slug, event_id, person_id).await?;
        }
        RsvpCreate::AlreadyTaken => {
          debug!(event_id, person_id, "already RSVPed");
        }
      }
      result.push(member.member_id, person_id);
    }
    info!(event_id, count = result.count, "RSVP batch done");
    Ok(result)
  }

  async fn mark_existing_attended(
    &self,
    site_slug: &str,
    event_id: u64,
    person_id: PersonId,
  ) -> Result<()> {
    let rsvps = self.api.event_rsvps(site_slug, event_id).await?;
    let Some(rsvp) = find_rsvp(&rsvps, person_id) else {
      warn!(event_id, person_id, "duplicate signup but no RSVP listed");
      return Ok(());
    };
    if rsvp.get("attended").and_then(Value::as_bool) == Some(true) {
      return Ok(());
    }
    let rsvp_id = rsvp
      .get("id")
      .and_then(as_id)
      .ok_or_else(|| Error::UnexpectedResponse {
        endpoint: "events/rsvps".into(),
        reason:   "RSVP without id".into(),
      })?;
    self
      .api
      .rsvp_update(site_slug, event_id, rsvp_id, json!({ "attended": true }))
      .await?;
    Ok(())
  }

  /// Tag every member with `tag` through one temporary list.
  pub async fn tag_batch(&self, members: &[Member], tag: &str) -> Result<BatchResult> {
    let mut result = BatchResult::default();
    if members.is_empty() {
      return Ok(result);
    }

    let slug = temp_list_slug();
    let name = format!("{tag} ({slug}) {}", Utc::now().format("%Y-%m-%d %H:%M"));
    let list_id = self.api.list_create(&name, &slug).await?;

    for member in members {
      let person_id = self.find_or_create(member).await?;
      self.link(member.member_id, person_id).await?;
      result.push(member.member_id, person_id);
    }

    let people: Vec<PersonId> = result.members.iter().map(|m| m.person_id).collect();
    self.api.list_add_people(list_id, &people).await?;
    self.api.list_add_tag(list_id, tag).await?;
    info!(tag, list_id, count = result.count, "tag batch done");
    Ok(result)
  }

  /// Mark attendance for members' unattended RSVPs to remote events
  /// starting today.
  pub async fn mark_attended_for_today(&self, members: &[Member]) -> Result<usize> {
    self.mark_attended_on(members, Utc::now().date_naive()).await
  }

  /// Mark attendance for members' unattended RSVPs to remote events
  /// starting on `day`. A remote RSVP that no longer exists is skipped.
  pub async fn mark_attended_on(&self, members: &[Member], day: NaiveDate) -> Result<usize> {
    let ids: Vec<Uuid> = members.iter().map(|m| m.member_id).collect();
    let due = self
      .store
      .rsvps_starting_on(&ids, day)
      .await
      .map_err(Error::store)?;

    let mut count = 0;
    for (rsvp, event) in due.into_iter().filter(|(_, e)| e.external_source == SYSTEM_NAME) {
      let event_id = parse_remote_id(&event.external_id)?;
      let site_slug = event.external_subsource.as_str();

      let known: Option<u64> = rsvp.external_id.as_deref().and_then(|s| s.trim().parse().ok());
      let rsvp_id = match known {
        Some(id) => id,
        None => {
          let person_id = members
            .iter()
            .find(|m| m.member_id == rsvp.member_id)
            .and_then(|m| m.external_id(SYSTEM_NAME))
            .map(|e| parse_remote_id(&e.external_id))
            .transpose()?;
          let listed = match person_id {
            Some(person_id) => {
              let rsvps = self.api.event_rsvps(site_slug, event_id).await?;
              find_rsvp(&rsvps, person_id).and_then(|r| r.get("id")).and_then(as_id)
            }
            None => None,
          };
          match listed {
            Some(id) => id,
            None => {
              warn!(member_id = %rsvp.member_id, event_id, "no remote RSVP to mark");
              continue;
            }
          }
        }
      };

      match self
        .api
        .rsvp_update(site_slug, event_id, rsvp_id, json!({ "attended": true }))
        .await
      {
        Ok(_) => {}
        Err(Error::NotFound(e)) => {
          warn!(rsvp_id, event_id, error = %e, "remote RSVP not found; skipping");
          continue;
        }
        Err(e) => return Err(e),
      }

      self
        .store
        .upsert_rsvp(rsvp.event_id, rsvp.member_id, true, Some(rsvp_id.to_string()))
        .await
        .map_err(Error::store)?;
      count += 1;
    }
    info!(%day, count, "marked attendance");
    Ok(count)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use chrono::TimeZone;
  use nbsync_core::{
    event::NewEvent,
    remote::{ClientError, RemoteError},
  };

  use super::*;
  use crate::testing::{FakeNation, connector, member_with, no_match};

  fn duplicate_signup() -> RemoteError {
    RemoteError::Client(ClientError {
      code:              Some("validation_failed".into()),
      message:           "Validation Failed.".into(),
      validation_errors: vec!["signup_id has already been taken".into()],
    })
  }

  /// Person 5 already holds RSVP 300 to event 12, not yet attended.
  fn event_with_rsvp() -> FakeNation {
    let rsvps = Arc::new(Mutex::new(vec![json!({ "id": 300, "person_id": 5, "attended": false })]));
    FakeNation::new(move |call| {
      let mut rsvps = rsvps.lock().unwrap();
      match call.endpoint().as_str() {
        "people/match" => Ok(Some(json!({ "person": { "id": 5 } }))),
        "events/rsvp_create" => Err(duplicate_signup()),
        "events/rsvps" => Ok(Some(json!({ "results": *rsvps, "next": null }))),
        "events/rsvp_update" => {
          let id = call.params["rsvp_id"].clone();
          let rsvp = rsvps.iter_mut().find(|r| r["id"] == id).unwrap();
          rsvp["attended"] = json!(true);
          Ok(Some(json!({ "rsvp": *rsvp })))
        }
        _ => Err(no_match()),
      }
    })
  }

  #[tokio::test]
  async fn duplicate_rsvp_marks_attended_once() {
    let c = connector(event_with_rsvp()).await;
    let m = member_with(&c, "ada@example.com", None, None).await;
    let members = vec![m.clone()];

    let result = c.rsvp_batch(&members, "mysite", 12, true, None).await.unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.members, vec![SyncedMember { member_id: m.member_id, person_id: 5 }]);
    assert_eq!(c.api().client().calls_to("events/rsvps").len(), 1);
    assert_eq!(c.api().client().calls_to("events/rsvp_update").len(), 1);
    let update = &c.api().client().calls_to("events/rsvp_update")[0];
    assert_eq!(update.params["rsvp"], json!({ "attended": true }));

    c.rsvp_batch(&members, "mysite", 12, true, None).await.unwrap();
    assert_eq!(c.api().client().calls_to("events/rsvp_update").len(), 1);
  }

  #[tokio::test]
  async fn duplicate_rsvp_without_attendance_is_absorbed() {
    let c = connector(event_with_rsvp()).await;
    let m = member_with(&c, "ada@example.com", None, None).await;

    let result = c.rsvp_batch(&[m], "mysite", 12, false, None).await.unwrap();
    assert_eq!(result.count, 1);
    assert!(c.api().client().calls_to("events/rsvps").is_empty());
  }

  #[tokio::test]
  async fn rsvp_resolves_fresh_and_sends_recruiter() {
    let nation = FakeNation::new(|call| match call.endpoint().as_str() {
      "people/match" => Ok(Some(json!({ "person": { "id": 5 } }))),
      "events/rsvp_create" => Ok(Some(json!({ "rsvp": { "id": 1 } }))),
      _ => Err(no_match()),
    });
    let c = connector(nation).await;
    let m = member_with(&c, "ada@example.com", None, Some("99")).await;

    c.rsvp_batch(&[m.clone()], "mysite", 12, false, Some(8)).await.unwrap();

    let client = c.api().client();
    assert!(client.calls_to("people/show").is_empty());
    let create = &client.calls_to("events/rsvp_create")[0];
    assert_eq!(create.params["site_slug"], json!("mysite"));
    assert_eq!(create.params["id"], json!(12));
    assert_eq!(
      create.params["rsvp"],
      json!({ "person_id": 5, "attended": false, "recruiter_id": 8 })
    );
    let linked = c.store().find_by_external_id(SYSTEM_NAME, "5").await.unwrap().unwrap();
    assert_eq!(linked.member_id, m.member_id);
  }

  #[tokio::test]
  async fn other_rsvp_failures_propagate() {
    let nation = FakeNation::new(|call| match call.endpoint().as_str() {
      "people/match" => Ok(Some(json!({ "person": { "id": 5 } }))),
      "events/rsvp_create" => Err(RemoteError::Client(ClientError {
        message: "event is full".into(),
        ..ClientError::default()
      })),
      _ => Err(no_match()),
    });
    let c = connector(nation).await;
    let m = member_with(&c, "ada@example.com", None, None).await;
    assert!(matches!(
      c.rsvp_batch(&[m], "mysite", 12, true, None).await,
      Err(Error::Validation(_))
    ));
  }

  #[tokio::test]
  async fn tag_uses_one_list_and_one_add() {
    let nation = FakeNation::new(|call| match call.endpoint().as_str() {
      "lists/create" => Ok(Some(json!({ "list_resource": { "id": 40 } }))),
      "people/match" => {
        let id = match call.params["email"].as_str() {
          Some("a@example.com") => 1,
          Some("b@example.com") => 2,
          _ => 3,
        };
        Ok(Some(json!({ "person": { "id": id } })))
      }
      "lists/add_people" | "lists/add_tag" => Ok(Some(json!({}))),
      _ => Err(no_match()),
    });
    let c = connector(nation).await;
    let mut members = Vec::new();
    for email in ["a@example.com", "b@example.com", "c@example.com"] {
      members.push(member_with(&c, email, None, None).await);
    }

    let result = c.tag_batch(&members, "big day & more").await.unwrap();
    assert_eq!(result.count, 3);

    let client = c.api().client();
    let creates = client.calls_to("lists/create");
    assert_eq!(creates.len(), 1);
    let slug = creates[0].params["list"]["slug"].as_str().unwrap().to_owned();
    assert!(slug.starts_with("tempid_"));
    assert_eq!(slug.len(), "tempid_".len() + 16);

    assert_eq!(client.calls_to("people/match").len(), 3);
    let adds = client.calls_to("lists/add_people");
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].params["list_id"], json!(40));
    assert_eq!(adds[0].params["people_ids"], json!([1, 2, 3]));

    let tags = client.calls_to("lists/add_tag");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].params["tag"], json!("big%20day%20%26%20more"));
  }

  #[tokio::test]
  async fn tag_with_no_members_makes_no_calls() {
    let c = connector(FakeNation::new(|_| Err(no_match()))).await;
    let result = c.tag_batch(&[], "volunteer").await.unwrap();
    assert_eq!(result, BatchResult::default());
    assert!(c.api().client().calls().is_empty());
  }

  #[tokio::test]
  async fn attendance_marks_todays_rsvps_and_skips_missing() {
    let nation = FakeNation::new(|call| match call.endpoint().as_str() {
      "events/rsvps" => Ok(Some(json!({ "results": [{ "id": 301, "person_id": 8 }] }))),
      "events/rsvp_update" if call.params["rsvp_id"] == json!(302) => {
        Err(RemoteError::NotFound(ClientError::from_body("Record not found")))
      }
      "events/rsvp_update" => Ok(Some(json!({ "rsvp": {} }))),
      _ => Err(no_match()),
    });
    let c = connector(nation).await;
    let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    let event = |source: &str| NewEvent {
      external_source: source.into(),
      external_subsource: "mysite".into(),
      external_id: "12".into(),
      name: "Rally".into(),
      start_time: Some(Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()),
      ..NewEvent::default()
    };
    let remote_event = c.store().upsert_event(event(SYSTEM_NAME)).await.unwrap();
    let other_event = c.store().upsert_event(event("facebook")).await.unwrap();

    let known = member_with(&c, "a@example.com", None, None).await;
    let lookup = member_with(&c, "b@example.com", None, Some("8")).await;
    let gone = member_with(&c, "c@example.com", None, None).await;
    let store = c.store();
    store.upsert_rsvp(remote_event.event_id, known.member_id, false, Some("300".into())).await.unwrap();
    store.upsert_rsvp(remote_event.event_id, lookup.member_id, false, None).await.unwrap();
    store.upsert_rsvp(remote_event.event_id, gone.member_id, false, Some("302".into())).await.unwrap();
    store.upsert_rsvp(other_event.event_id, known.member_id, false, Some("900".into())).await.unwrap();

    let members = vec![known.clone(), lookup.clone(), gone.clone()];
    assert_eq!(c.mark_attended_on(&members, day).await.unwrap(), 2);

    let updated: Vec<Value> = c
      .api()
      .client()
      .calls_to("events/rsvp_update")
      .iter()
      .map(|call| call.params["rsvp_id"].clone())
      .collect();
    assert_eq!(updated.len(), 3);
    assert!(updated.contains(&json!(300)));
    assert!(updated.contains(&json!(301)));
    assert!(!updated.contains(&json!(900)));

    let left = store.rsvps_starting_on(&[known.member_id, lookup.member_id, gone.member_id], day).await.unwrap();
    let left: Vec<Uuid> = left.iter().filter(|(_, e)| e.external_source == SYSTEM_NAME).map(|(r, _)| r.member_id).collect();
    assert_eq!(left, vec![gone.member_id]);

    // Nothing due the second time round except the missing one.
    assert_eq!(c.mark_attended_on(&members, day).await.unwrap(), 0);
  }
}
