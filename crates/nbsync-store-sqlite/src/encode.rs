//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and UUIDs as hyphenated
//! lowercase strings. Rows are read into `Raw*` structs inside the database
//! closure and decoded outside it.

use chrono::{DateTime, Utc};
use nbsync_core::{
  event::{Event, Rsvp},
  member::{Address, ExternalId, Member, MemberSubscription, PhoneNumber, SubscriptionKind},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── SubscriptionKind ────────────────────────────────────────────────────────

pub fn decode_subscription(s: &str) -> Result<SubscriptionKind> {
  SubscriptionKind::from_slug(s).ok_or_else(|| Error::UnknownValue {
    column: "subscription",
    value:  s.to_owned(),
  })
}

// ─── Member rows ─────────────────────────────────────────────────────────────

pub const MEMBER_COLUMNS: &str =
  "member_id, title, first_name, middle_names, last_name, gender, email, updated_at";

/// Raw strings from a `members` row plus its child tables.
pub struct RawMember {
  pub member_id:     String,
  pub title:         Option<String>,
  pub first_name:    Option<String>,
  pub middle_names:  Option<String>,
  pub last_name:     Option<String>,
  pub gender:        Option<String>,
  pub email:         Option<String>,
  pub updated_at:    String,
  pub phones:        Vec<(String, String)>,
  pub addresses:     Vec<RawAddress>,
  pub subscriptions: Vec<(String, bool, String)>,
  pub external_ids:  Vec<(String, String, String)>,
}

impl RawMember {
  /// Read the [`MEMBER_COLUMNS`] of a row; child collections start empty.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      member_id:     row.get(0)?,
      title:         row.get(1)?,
      first_name:    row.get(2)?,
      middle_names:  row.get(3)?,
      last_name:     row.get(4)?,
      gender:        row.get(5)?,
      email:         row.get(6)?,
      updated_at:    row.get(7)?,
      phones:        Vec::new(),
      addresses:     Vec::new(),
      subscriptions: Vec::new(),
      external_ids:  Vec::new(),
    })
  }

  pub fn into_member(self) -> Result<Member> {
    let phone_numbers = self
      .phones
      .into_iter()
      .map(|(phone, at)| Ok(PhoneNumber { phone, updated_at: decode_dt(&at)? }))
      .collect::<Result<_>>()?;

    let subscriptions = self
      .subscriptions
      .into_iter()
      .map(|(kind, subscribed, at)| {
        Ok(MemberSubscription {
          kind: decode_subscription(&kind)?,
          subscribed,
          updated_at: decode_dt(&at)?,
        })
      })
      .collect::<Result<_>>()?;

    let external_ids = self
      .external_ids
      .into_iter()
      .map(|(system, external_id, at)| {
        Ok(ExternalId { system, external_id, updated_at: decode_dt(&at)? })
      })
      .collect::<Result<_>>()?;

    Ok(Member {
      member_id: decode_uuid(&self.member_id)?,
      title: self.title,
      first_name: self.first_name,
      middle_names: self.middle_names,
      last_name: self.last_name,
      gender: self.gender,
      email: self.email,
      phone_numbers,
      addresses: self.addresses.into_iter().map(RawAddress::into_address).collect(),
      subscriptions,
      external_ids,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawAddress {
  pub line1:    Option<String>,
  pub line2:    Option<String>,
  pub town:     Option<String>,
  pub state:    Option<String>,
  pub postcode: Option<String>,
  pub country:  Option<String>,
}

impl RawAddress {
  pub fn into_address(self) -> Address {
    Address {
      line1:    self.line1,
      line2:    self.line2,
      town:     self.town,
      state:    self.state,
      postcode: self.postcode,
      country:  self.country,
    }
  }
}

// ─── Event rows ──────────────────────────────────────────────────────────────

pub const EVENT_COLUMNS: &str = "e.event_id, e.external_source, e.external_subsource, \
   e.external_id, e.name, e.start_time, e.end_time, e.description, e.location, \
   e.latitude, e.longitude, e.max_attendees, e.approved, e.invite_only, e.attendees";

/// Raw values from an `events` row.
pub struct RawEvent {
  pub event_id:           String,
  pub external_source:    String,
  pub external_subsource: String,
  pub external_id:        String,
  pub name:               String,
  pub start_time:         Option<String>,
  pub end_time:           Option<String>,
  pub description:        Option<String>,
  pub location:           Option<String>,
  pub latitude:           Option<f64>,
  pub longitude:          Option<f64>,
  pub max_attendees:      Option<i64>,
  pub approved:           bool,
  pub invite_only:        bool,
  pub attendees:          i64,
}

impl RawEvent {
  /// Read the [`EVENT_COLUMNS`] starting at column `at`.
  pub fn from_row(row: &rusqlite::Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:           row.get(at)?,
      external_source:    row.get(at + 1)?,
      external_subsource: row.get(at + 2)?,
      external_id:        row.get(at + 3)?,
      name:               row.get(at + 4)?,
      start_time:         row.get(at + 5)?,
      end_time:           row.get(at + 6)?,
      description:        row.get(at + 7)?,
      location:           row.get(at + 8)?,
      latitude:           row.get(at + 9)?,
      longitude:          row.get(at + 10)?,
      max_attendees:      row.get(at + 11)?,
      approved:           row.get(at + 12)?,
      invite_only:        row.get(at + 13)?,
      attendees:          row.get(at + 14)?,
    })
  }

  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:           decode_uuid(&self.event_id)?,
      external_source:    self.external_source,
      external_subsource: self.external_subsource,
      external_id:        self.external_id,
      name:               self.name,
      start_time:         decode_opt_dt(self.start_time)?,
      end_time:           decode_opt_dt(self.end_time)?,
      description:        self.description,
      location:           self.location,
      latitude:           self.latitude,
      longitude:          self.longitude,
      max_attendees:      self.max_attendees,
      approved:           self.approved,
      invite_only:        self.invite_only,
      attendees:          self.attendees,
    })
  }
}

// ─── RSVP rows ───────────────────────────────────────────────────────────────

pub const RSVP_COLUMNS: &str = "r.rsvp_id, r.event_id, r.member_id, r.attended, r.external_id";

pub struct RawRsvp {
  pub rsvp_id:     String,
  pub event_id:    String,
  pub member_id:   String,
  pub attended:    bool,
  pub external_id: Option<String>,
}

impl RawRsvp {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rsvp_id:     row.get(0)?,
      event_id:    row.get(1)?,
      member_id:   row.get(2)?,
      attended:    row.get(3)?,
      external_id: row.get(4)?,
    })
  }

  pub fn into_rsvp(self) -> Result<Rsvp> {
    Ok(Rsvp {
      rsvp_id:     decode_uuid(&self.rsvp_id)?,
      event_id:    decode_uuid(&self.event_id)?,
      member_id:   decode_uuid(&self.member_id)?,
      attended:    self.attended,
      external_id: self.external_id,
    })
  }
}
