//! Pulling recent remote events and their RSVPs into the local store.
//!
//! This is a last-write import: remote values are written as they are,
//! with no field reconciliation.

use chrono::{DateTime, Months, Utc};
use nbsync_core::{
  Error, Result, SYSTEM_NAME,
  event::{Event, NewEvent},
  remote::RemoteClient,
  store::{ExternalIds, MemberStore},
  update::UpdateSet,
};
use serde_json::Value;
use tracing::info;

use crate::{Connector, api::as_id, resolver::parse_remote_id};

fn text(value: &Value, key: &str) -> Option<String> {
  value
    .get(key)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}

fn time(value: &Value, key: &str) -> Option<DateTime<Utc>> {
  value
    .get(key)
    .and_then(Value::as_str)
    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    .map(|dt| dt.with_timezone(&Utc))
}

/// Coordinates arrive as numbers or as numeric strings.
fn coordinate(value: Option<&Value>) -> Option<f64> {
  match value? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Human-readable location: `"<venue> - <address1> <address2> <address3>,
/// <city>, <state>, <country>"`, skipping blank parts.
pub fn event_location(event: &Value) -> Option<String> {
  let venue = event.get("venue")?;
  let mut location = String::new();
  if let Some(name) = text(venue, "name") {
    location.push_str(&name);
    location.push_str(" - ");
  }
  if let Some(address) = venue.get("address").filter(|a| a.is_object()) {
    for (key, sep) in [
      ("address1", " "),
      ("address2", " "),
      ("address3", ", "),
      ("city", ", "),
      ("state", ", "),
      ("country_code", ""),
    ] {
      if let Some(part) = text(address, key) {
        location.push_str(&part);
        location.push_str(sep);
      }
    }
  }
  let location = location.trim_end_matches([' ', ',', '-']).trim_end();
  (!location.is_empty()).then(|| location.to_owned())
}

/// Map a remote event (tagged with its `site_slug`) onto a local one.
pub fn event_from_remote(event: &Value) -> Result<NewEvent> {
  let unexpected = |reason: &str| Error::UnexpectedResponse {
    endpoint: "events/index".into(),
    reason:   reason.into(),
  };
  let id = event.get("id").and_then(as_id).ok_or_else(|| unexpected("event without id"))?;
  let site_slug = text(event, "site_slug").ok_or_else(|| unexpected("event without site"))?;
  let address = event.get("venue").and_then(|v| v.get("address"));

  Ok(NewEvent {
    external_source:    SYSTEM_NAME.to_owned(),
    external_subsource: site_slug,
    external_id:        id.to_string(),
    name:               text(event, "name").unwrap_or_default(),
    start_time:         time(event, "start_time"),
    end_time:           time(event, "end_time"),
    description:        text(event, "intro"),
    location:           event_location(event),
    latitude:           coordinate(address.and_then(|a| a.get("lat"))),
    longitude:          coordinate(address.and_then(|a| a.get("lng"))),
    max_attendees:      event.get("capacity").and_then(Value::as_i64),
    approved:           event.get("status").and_then(Value::as_str) == Some("published"),
    invite_only:        !event
      .get("rsvp_form")
      .and_then(|f| f.get("allow_guests"))
      .and_then(Value::as_bool)
      .unwrap_or(false),
  })
}

impl<C: RemoteClient, S: MemberStore> Connector<C, S> {
  /// Import every event starting within the last `months` months, with
  /// their RSVPs. Returns the number of events imported.
  pub async fn fetch_recent_events(&self, months: u32) -> Result<usize> {
    let now = Utc::now();
    let starting = now.checked_sub_months(Months::new(months)).unwrap_or(now);
    let events = self.api.sites_events(starting).await?;

    for remote in &events {
      let event = self
        .store
        .upsert_event(event_from_remote(remote)?)
        .await
        .map_err(Error::store)?;
      self.fetch_event_rsvps(&event).await?;
    }
    info!(count = events.len(), %starting, "pulled events");
    Ok(events.len())
  }

  /// Import the RSVPs of one local event from its remote counterpart and
  /// set its attendee count. Returns the number of RSVPs.
  pub async fn fetch_event_rsvps(&self, event: &Event) -> Result<usize> {
    let event_id = parse_remote_id(&event.external_id)?;
    let rsvps = self.api.event_rsvps(&event.external_subsource, event_id).await?;
    self
      .store
      .set_event_attendees(event.event_id, rsvps.len() as i64)
      .await
      .map_err(Error::store)?;

    for rsvp in &rsvps {
      let person_id = rsvp
        .get("person_id")
        .and_then(as_id)
        .ok_or_else(|| Error::UnexpectedResponse {
          endpoint: "events/rsvps".into(),
          reason:   "RSVP without person_id".into(),
        })?;
      let person = self.api.person(person_id).await?;

      let external_ids = ExternalIds::from([(SYSTEM_NAME.to_string(), person.id.to_string())]);
      let member = self
        .store
        .upsert_member(&UpdateSet::import(&person), &external_ids, false, SYSTEM_NAME)
        .await
        .map_err(Error::store)?;

      let attended = rsvp.get("attended").and_then(Value::as_bool).unwrap_or(false);
      let rsvp_id = rsvp.get("id").and_then(as_id).map(|id| id.to_string());
      self
        .store
        .upsert_rsvp(event.event_id, member.member_id, attended, rsvp_id)
        .await
        .map_err(Error::store)?;
    }
    Ok(rsvps.len())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::testing::{FakeNation, connector, no_match};

  fn remote_event() -> Value {
    json!({
      "id": 12,
      "site_slug": "mysite",
      "name": "Rally",
      "intro": "Come along",
      "start_time": "2026-10-16T09:00:00+11:00",
      "end_time": "2026-10-16T11:00:00+11:00",
      "status": "published",
      "capacity": 50,
      "rsvp_form": { "allow_guests": true },
      "venue": {
        "name": "Town Hall",
        "address": {
          "address1": "483 George St",
          "city": "Sydney",
          "state": "NSW",
          "country_code": "AU",
          "lat": "-33.8732",
          "lng": 151.2061
        }
      }
    })
  }

  #[test]
  fn event_fields_are_mapped() {
    let e = event_from_remote(&remote_event()).unwrap();
    assert_eq!(e.external_source, SYSTEM_NAME);
    assert_eq!(e.external_subsource, "mysite");
    assert_eq!(e.external_id, "12");
    assert_eq!(e.description.as_deref(), Some("Come along"));
    assert_eq!(e.location.as_deref(), Some("Town Hall - 483 George St Sydney, NSW, AU"));
    assert_eq!(e.latitude, Some(-33.8732));
    assert_eq!(e.longitude, Some(151.2061));
    assert_eq!(e.max_attendees, Some(50));
    assert!(e.approved);
    assert!(!e.invite_only);
    assert_eq!(e.start_time.unwrap().to_rfc3339(), "2026-10-15T22:00:00+00:00");
  }

  #[test]
  fn location_edge_cases() {
    assert_eq!(event_location(&json!({})), None);
    assert_eq!(event_location(&json!({ "venue": { "name": "Online" } })).as_deref(), Some("Online"));
    assert_eq!(
      event_location(&json!({ "venue": { "address": { "city": "Perth", "state": "WA" } } })).as_deref(),
      Some("Perth, WA")
    );
  }

  #[test]
  fn missing_rsvp_form_means_invite_only() {
    let mut event = remote_event();
    event.as_object_mut().unwrap().remove("rsvp_form");
    event["status"] = json!("unlisted");
    let e = event_from_remote(&event).unwrap();
    assert!(e.invite_only);
    assert!(!e.approved);
  }

  #[tokio::test]
  async fn pull_imports_events_members_and_rsvps() {
    let nation = FakeNation::new(|call| match call.endpoint().as_str() {
      "sites/index" => Ok(Some(json!({ "results": [{ "slug": "mysite" }], "next": null }))),
      "events/index" => Ok(Some(json!({
        "results": [{
          "id": 12, "name": "Rally", "start_time": "2026-10-16T09:00:00+00:00",
          "status": "published"
        }],
        "next": null
      }))),
      "events/rsvps" => Ok(Some(json!({
        "results": [{ "id": 300, "person_id": 5, "attended": true }],
        "next": "/api/v1/sites/mysite/pages/events/12/rsvps?__nonce=n&__token=t"
      }))),
      "people/show" => Ok(Some(json!({
        "person": {
          "id": call.params["id"],
          "first_name": "Ada",
          "email": format!("person{}@example.com", call.params["id"]),
          "mobile": "0468519266"
        }
      }))),
      _ if call.resource == "follow" => Ok(Some(json!({
        "results": [{ "id": 301, "person_id": 6, "attended": false }],
        "next": null
      }))),
      _ => Err(no_match()),
    });
    let c = connector(nation).await;

    assert_eq!(c.pull_new_events().await.unwrap(), 1);

    let events = c.api().cached_sites_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["site_slug"], json!("mysite"));
    assert_eq!(c.api().cached_sites().len(), 1);

    let index = &c.api().client().calls_to("events/index")[0];
    assert_eq!(index.params["site_slug"], json!("mysite"));
    assert!(index.params["starting"].is_string());

    let five = c.store().find_by_external_id(SYSTEM_NAME, "5").await.unwrap().unwrap();
    assert_eq!(five.first_name.as_deref(), Some("Ada"));
    assert_eq!(five.email.as_deref(), Some("person5@example.com"));
    assert!(c.store().find_by_external_id(SYSTEM_NAME, "6").await.unwrap().is_some());

    let day = chrono::NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    let unattended = c.store().rsvps_starting_on(&[five.member_id], day).await.unwrap();
    assert!(unattended.is_empty());
    let six = c.store().find_by_external_id(SYSTEM_NAME, "6").await.unwrap().unwrap();
    let unattended = c.store().rsvps_starting_on(&[six.member_id], day).await.unwrap();
    assert_eq!(unattended.len(), 1);
    assert_eq!(unattended[0].0.external_id.as_deref(), Some("301"));
    assert_eq!(unattended[0].1.attendees, 2);
  }
}
