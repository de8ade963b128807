//! The `MemberStore` trait: the local side of the connector.
//!
//! Implemented by storage backends (e.g. `nbsync-store-sqlite`). The engine
//! depends on this abstraction and never mutates members any other way.

use std::{collections::BTreeMap, future::Future};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  event::{Event, NewEvent, Rsvp},
  member::{ExternalId, Member},
  update::UpdateSet,
};

/// External ids keyed by system name, as passed to
/// [`MemberStore::upsert_member`].
pub type ExternalIds = BTreeMap<String, String>;

/// Abstraction over the local member datastore.
///
/// All methods return `Send` futures so the engine can drive them from a
/// multi-threaded runtime.
pub trait MemberStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Members ───────────────────────────────────────────────────────────

  fn get_member(
    &self,
    member_id: Uuid,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + '_;

  /// The member holding `external_id` in `system`, if any.
  fn find_by_external_id<'a>(
    &'a self,
    system: &'a str,
    external_id: &'a str,
  ) -> impl Future<Output = Result<Option<Member>, Self::Error>> + Send + 'a;

  /// Apply `update` to a member, creating one when none can be located.
  ///
  /// The member is located by any of `external_ids`, then by the email in
  /// `update`; every id in `external_ids` is recorded against the result.
  /// With `ignore_name_change` an existing member keeps its name parts.
  /// `entry_point` names the caller for the member's audit trail.
  fn upsert_member<'a>(
    &'a self,
    update: &'a UpdateSet,
    external_ids: &'a ExternalIds,
    ignore_name_change: bool,
    entry_point: &'a str,
  ) -> impl Future<Output = Result<Member, Self::Error>> + Send + 'a;

  /// Record that `member_id` is `external_id` in `system`. Re-linking an id
  /// that already exists moves it to `member_id` and refreshes its
  /// `updated_at`.
  fn link_external_id<'a>(
    &'a self,
    member_id: Uuid,
    system: &'a str,
    external_id: &'a str,
  ) -> impl Future<Output = Result<ExternalId, Self::Error>> + Send + 'a;

  // ── Events ────────────────────────────────────────────────────────────

  /// Insert or update the event keyed by its external source triple.
  fn upsert_event(
    &self,
    event: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  fn set_event_attendees(
    &self,
    event_id: Uuid,
    attendees: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert or update the RSVP keyed by `(event_id, member_id)`. A `None`
  /// `external_id` keeps whatever was stored before.
  fn upsert_rsvp(
    &self,
    event_id: Uuid,
    member_id: Uuid,
    attended: bool,
    external_id: Option<String>,
  ) -> impl Future<Output = Result<Rsvp, Self::Error>> + Send + '_;

  /// Unattended RSVPs of `member_ids` to events starting on `day`, each
  /// with its event.
  fn rsvps_starting_on<'a>(
    &'a self,
    member_ids: &'a [Uuid],
    day: NaiveDate,
  ) -> impl Future<Output = Result<Vec<(Rsvp, Event)>, Self::Error>> + Send + 'a;
}
