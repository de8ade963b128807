//! Local events and RSVPs imported from the remote calendar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event as imported, before it has a local id. Events are keyed by
/// `(external_source, external_subsource, external_id)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
  pub external_source:    String,
  pub external_subsource: String,
  pub external_id:        String,
  pub name:               String,
  pub start_time:         Option<DateTime<Utc>>,
  pub end_time:           Option<DateTime<Utc>>,
  pub description:        Option<String>,
  pub location:           Option<String>,
  pub latitude:           Option<f64>,
  pub longitude:          Option<f64>,
  pub max_attendees:      Option<i64>,
  pub approved:           bool,
  pub invite_only:        bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:           Uuid,
  pub external_source:    String,
  pub external_subsource: String,
  pub external_id:        String,
  pub name:               String,
  pub start_time:         Option<DateTime<Utc>>,
  pub end_time:           Option<DateTime<Utc>>,
  pub description:        Option<String>,
  pub location:           Option<String>,
  pub latitude:           Option<f64>,
  pub longitude:          Option<f64>,
  pub max_attendees:      Option<i64>,
  pub approved:           bool,
  pub invite_only:        bool,
  pub attendees:          i64,
}

impl Event {
  pub fn new(event_id: Uuid, new: NewEvent) -> Self {
    Self {
      event_id,
      external_source: new.external_source,
      external_subsource: new.external_subsource,
      external_id: new.external_id,
      name: new.name,
      start_time: new.start_time,
      end_time: new.end_time,
      description: new.description,
      location: new.location,
      latitude: new.latitude,
      longitude: new.longitude,
      max_attendees: new.max_attendees,
      approved: new.approved,
      invite_only: new.invite_only,
      attendees: 0,
    }
  }
}

/// One member's RSVP to one event, unique per `(event_id, member_id)`.
/// `external_id` is the remote RSVP id when the RSVP came from, or was
/// pushed to, the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rsvp {
  pub rsvp_id:     Uuid,
  pub event_id:    Uuid,
  pub member_id:   Uuid,
  pub attended:    bool,
  pub external_id: Option<String>,
}
