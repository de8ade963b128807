//! [`SqliteStore`], the SQLite implementation of [`MemberStore`].

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::debug;
use uuid::Uuid;

use nbsync_core::{
  event::{Event, NewEvent, Rsvp},
  member::{ExternalId, Member},
  phone::PhoneSettings,
  store::{ExternalIds, MemberStore},
  update::{Change, SubscriptionAction, UpdateSet},
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, MEMBER_COLUMNS, RSVP_COLUMNS, RawAddress, RawEvent, RawMember, RawRsvp,
    decode_uuid, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A member store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Phone
/// settings decide which stored numbers a mobile or landline update
/// replaces.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  phones: PhoneSettings,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, phones: PhoneSettings) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, phones };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(phones: PhoneSettings) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, phones };
    store.init_schema().await?;
    Ok(store)
  }

  /// Ids of every stored member, oldest first.
  pub async fn member_ids(&self) -> Result<Vec<Uuid>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT member_id FROM members ORDER BY rowid")?;
        let ids = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
      })
      .await?;
    ids.iter().map(|id| decode_uuid(id)).collect()
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Synchronous helpers (run inside `Connection::call`) ─────────────────────

/// Load a member row and all of its child rows.
fn load_member(conn: &Connection, member_id: &str) -> rusqlite::Result<Option<RawMember>> {
  let Some(mut raw) = conn
    .query_row(
      &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = ?1"),
      [member_id],
      RawMember::from_row,
    )
    .optional()?
  else {
    return Ok(None);
  };

  raw.phones = conn
    .prepare(
      "SELECT phone, updated_at FROM member_phones
       WHERE member_id = ?1 ORDER BY updated_at DESC, phone",
    )?
    .query_map([member_id], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<_>>()?;

  raw.addresses = conn
    .prepare(
      "SELECT line1, line2, town, state, postcode, country
       FROM member_addresses WHERE member_id = ?1",
    )?
    .query_map([member_id], |r| {
      Ok(RawAddress {
        line1:    r.get(0)?,
        line2:    r.get(1)?,
        town:     r.get(2)?,
        state:    r.get(3)?,
        postcode: r.get(4)?,
        country:  r.get(5)?,
      })
    })?
    .collect::<rusqlite::Result<_>>()?;

  raw.subscriptions = conn
    .prepare(
      "SELECT subscription, subscribed, updated_at FROM member_subscriptions
       WHERE member_id = ?1 ORDER BY subscription",
    )?
    .query_map([member_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
    .collect::<rusqlite::Result<_>>()?;

  raw.external_ids = conn
    .prepare(
      "SELECT system, external_id, updated_at FROM member_external_ids
       WHERE member_id = ?1 ORDER BY updated_at",
    )?
    .query_map([member_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
    .collect::<rusqlite::Result<_>>()?;

  Ok(Some(raw))
}

fn member_by_external_id(
  conn: &Connection,
  system: &str,
  external_id: &str,
) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT member_id FROM member_external_ids WHERE system = ?1 AND external_id = ?2",
      [system, external_id],
      |r| r.get(0),
    )
    .optional()
}

/// Find the member an upsert applies to: any of its external ids, then its
/// email.
fn locate_member(
  conn: &Connection,
  external_ids: &ExternalIds,
  email: Option<&str>,
) -> rusqlite::Result<Option<String>> {
  for (system, external_id) in external_ids {
    if let Some(id) = member_by_external_id(conn, system, external_id)? {
      return Ok(Some(id));
    }
  }
  match email {
    Some(email) => conn
      .query_row(
        "SELECT member_id FROM members WHERE email = ?1 COLLATE NOCASE
         ORDER BY updated_at DESC LIMIT 1",
        [email],
        |r| r.get(0),
      )
      .optional(),
    None => Ok(None),
  }
}

fn link(
  conn: &Connection,
  member_id: &str,
  system: &str,
  external_id: &str,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO member_external_ids (member_id, system, external_id, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (system, external_id) DO UPDATE
       SET member_id = excluded.member_id, updated_at = excluded.updated_at",
    [member_id, system, external_id, now],
  )?;
  Ok(())
}

/// Apply every key of `update` to `member_id`. Returns whether a record-level
/// attribute (name, email, address) changed.
fn apply_update(
  conn: &Connection,
  member_id: &str,
  update: &UpdateSet,
  keep_name: bool,
  phones: &PhoneSettings,
  now: &str,
) -> rusqlite::Result<bool> {
  let mut record_changed = false;

  if let Some(name) = update.name.as_ref().filter(|_| !keep_name) {
    conn.execute(
      "UPDATE members
       SET title = ?2, first_name = ?3, middle_names = ?4, last_name = ?5, gender = ?6
       WHERE member_id = ?1",
      rusqlite::params![
        member_id,
        name.title,
        name.firstname,
        name.middlenames,
        name.lastname,
        name.gender,
      ],
    )?;
    record_changed = true;
  }

  if let Some(email) = &update.email {
    conn.execute(
      "UPDATE members SET email = ?2 WHERE member_id = ?1",
      rusqlite::params![member_id, email.as_set()],
    )?;
    record_changed = true;
  }

  for change in &update.phones {
    let stored: Vec<String> = conn
      .prepare("SELECT phone FROM member_phones WHERE member_id = ?1")?
      .query_map([member_id], |r| r.get(0))?
      .collect::<rusqlite::Result<_>>()?;
    for number in stored.iter().filter(|n| phones.classify(n) == change.kind) {
      conn.execute(
        "DELETE FROM member_phones WHERE member_id = ?1 AND phone = ?2",
        [member_id, number.as_str()],
      )?;
    }
    if let Change::Set(number) = &change.phone {
      conn.execute(
        "INSERT INTO member_phones (member_id, phone, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (member_id, phone) DO UPDATE SET updated_at = excluded.updated_at",
        [member_id, number.as_str(), now],
      )?;
    }
  }

  for sub in &update.subscriptions {
    let subscribed = sub.action == SubscriptionAction::Subscribe;
    conn.execute(
      "INSERT INTO member_subscriptions (member_id, subscription, subscribed, updated_at)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (member_id, subscription) DO UPDATE
         SET subscribed = excluded.subscribed, updated_at = excluded.updated_at
         WHERE member_subscriptions.subscribed != excluded.subscribed",
      rusqlite::params![member_id, sub.slug(), subscribed, now],
    )?;
  }

  for change in &update.addresses {
    match change {
      Change::Set(a) => conn.execute(
        "INSERT INTO member_addresses (member_id, line1, line2, town, state, postcode, country)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (member_id) DO UPDATE SET
           line1 = excluded.line1, line2 = excluded.line2, town = excluded.town,
           state = excluded.state, postcode = excluded.postcode, country = excluded.country",
        rusqlite::params![member_id, a.line1, a.line2, a.town, a.state, a.postcode, a.country],
      )?,
      Change::Clear => conn.execute(
        "DELETE FROM member_addresses WHERE member_id = ?1",
        [member_id],
      )?,
    };
    record_changed = true;
  }

  Ok(record_changed)
}

/// Member ids bound per `IN (...)` query, well under SQLite's variable limit.
const MEMBER_ID_CHUNK: usize = 900;

/// Unattended RSVPs of `member_ids` to events starting on `day`
/// (`YYYY-MM-DD`).
fn rsvps_for_members(
  conn: &Connection,
  day: &str,
  member_ids: &[String],
) -> rusqlite::Result<Vec<(RawRsvp, RawEvent)>> {
  let placeholders = (0..member_ids.len())
    .map(|i| format!("?{}", i + 2))
    .collect::<Vec<_>>()
    .join(", ");
  let sql = format!(
    "SELECT {RSVP_COLUMNS}, {EVENT_COLUMNS}
     FROM event_rsvps r
     JOIN events e ON e.event_id = r.event_id
     WHERE r.attended = 0
       AND substr(e.start_time, 1, 10) = ?1
       AND r.member_id IN ({placeholders})"
  );
  let mut stmt = conn.prepare(&sql)?;
  let params = std::iter::once(day).chain(member_ids.iter().map(String::as_str));
  let rows = stmt
    .query_map(rusqlite::params_from_iter(params), |row| {
      Ok((RawRsvp::from_row(row)?, RawEvent::from_row(row, 5)?))
    })?
    .collect();
  rows
}

// ─── MemberStore impl ────────────────────────────────────────────────────────

impl MemberStore for SqliteStore {
  type Error = Error;

  // ── Members ───────────────────────────────────────────────────────────────

  async fn get_member(&self, member_id: Uuid) -> Result<Option<Member>> {
    let id_str = encode_uuid(member_id);
    let raw = self.conn.call(move |conn| Ok(load_member(conn, &id_str)?)).await?;
    raw.map(RawMember::into_member).transpose()
  }

  async fn find_by_external_id(&self, system: &str, external_id: &str) -> Result<Option<Member>> {
    let system = system.to_owned();
    let external_id = external_id.to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        match member_by_external_id(conn, &system, &external_id)? {
          Some(id) => Ok(load_member(conn, &id)?),
          None => Ok(None),
        }
      })
      .await?;
    raw.map(RawMember::into_member).transpose()
  }

  async fn upsert_member(
    &self,
    update: &UpdateSet,
    external_ids: &ExternalIds,
    ignore_name_change: bool,
    entry_point: &str,
  ) -> Result<Member> {
    let update       = update.clone();
    let external_ids = external_ids.clone();
    let entry_point  = entry_point.to_owned();
    let phones       = self.phones.clone();
    let now          = encode_dt(Utc::now());
    let new_id       = encode_uuid(Uuid::new_v4());

    let (raw, created) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let email = update.email.as_ref().and_then(Change::as_set).map(String::as_str);

        let (member_id, created) = match locate_member(&tx, &external_ids, email)? {
          Some(id) => (id, false),
          None => {
            tx.execute(
              "INSERT INTO members (member_id, entry_point, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?3)",
              [new_id.as_str(), entry_point.as_str(), now.as_str()],
            )?;
            (new_id, true)
          }
        };

        let keep_name = ignore_name_change && !created;
        if apply_update(&tx, &member_id, &update, keep_name, &phones, &now)? {
          tx.execute(
            "UPDATE members SET updated_at = ?2 WHERE member_id = ?1",
            [member_id.as_str(), now.as_str()],
          )?;
        }
        tx.execute(
          "UPDATE members SET entry_point = ?2 WHERE member_id = ?1",
          [member_id.as_str(), entry_point.as_str()],
        )?;
        for (system, external_id) in &external_ids {
          link(&tx, &member_id, system, external_id, &now)?;
        }

        let raw = load_member(&tx, &member_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok((raw, created))
      })
      .await?;

    let member = raw.into_member()?;
    if created {
      debug!(member_id = %member.member_id, "created member");
    }
    Ok(member)
  }

  async fn link_external_id(
    &self,
    member_id: Uuid,
    system: &str,
    external_id: &str,
  ) -> Result<ExternalId> {
    let linked = ExternalId {
      system:      system.to_owned(),
      external_id: external_id.to_owned(),
      updated_at:  Utc::now(),
    };

    let id_str     = encode_uuid(member_id);
    let system_str = linked.system.clone();
    let ext_str    = linked.external_id.clone();
    let at_str     = encode_dt(linked.updated_at);

    let exists = self
      .conn
      .call(move |conn| {
        if load_member(conn, &id_str)?.is_none() {
          return Ok(false);
        }
        link(conn, &id_str, &system_str, &ext_str, &at_str)?;
        Ok(true)
      })
      .await?;

    if !exists {
      return Err(Error::MemberNotFound(member_id));
    }
    Ok(linked)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn upsert_event(&self, event: NewEvent) -> Result<Event> {
    let id_str     = encode_uuid(Uuid::new_v4());
    let start_time = event.start_time.map(encode_dt);
    let end_time   = event.end_time.map(encode_dt);

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO events (
             event_id, external_source, external_subsource, external_id, name,
             start_time, end_time, description, location, latitude, longitude,
             max_attendees, approved, invite_only
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
           ON CONFLICT (external_source, external_subsource, external_id) DO UPDATE SET
             name = excluded.name, start_time = excluded.start_time,
             end_time = excluded.end_time, description = excluded.description,
             location = excluded.location, latitude = excluded.latitude,
             longitude = excluded.longitude, max_attendees = excluded.max_attendees,
             approved = excluded.approved, invite_only = excluded.invite_only",
          rusqlite::params![
            id_str,
            event.external_source,
            event.external_subsource,
            event.external_id,
            event.name,
            start_time,
            end_time,
            event.description,
            event.location,
            event.latitude,
            event.longitude,
            event.max_attendees,
            event.approved,
            event.invite_only,
          ],
        )?;

        Ok(conn.query_row(
          &format!(
            "SELECT {EVENT_COLUMNS} FROM events e
             WHERE e.external_source = ?1 AND e.external_subsource = ?2 AND e.external_id = ?3"
          ),
          [&event.external_source, &event.external_subsource, &event.external_id],
          |row| RawEvent::from_row(row, 0),
        )?)
      })
      .await?;

    raw.into_event()
  }

  async fn set_event_attendees(&self, event_id: Uuid, attendees: i64) -> Result<()> {
    let id_str = encode_uuid(event_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE events SET attendees = ?2 WHERE event_id = ?1",
          rusqlite::params![id_str, attendees],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::EventNotFound(event_id));
    }
    Ok(())
  }

  async fn upsert_rsvp(
    &self,
    event_id: Uuid,
    member_id: Uuid,
    attended: bool,
    external_id: Option<String>,
  ) -> Result<Rsvp> {
    let rsvp_str   = encode_uuid(Uuid::new_v4());
    let event_str  = encode_uuid(event_id);
    let member_str = encode_uuid(member_id);

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO event_rsvps (rsvp_id, event_id, member_id, attended, external_id)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (event_id, member_id) DO UPDATE SET
             attended = excluded.attended,
             external_id = COALESCE(excluded.external_id, event_rsvps.external_id)",
          rusqlite::params![rsvp_str, event_str, member_str, attended, external_id],
        )?;

        Ok(conn.query_row(
          &format!(
            "SELECT {RSVP_COLUMNS} FROM event_rsvps r WHERE r.event_id = ?1 AND r.member_id = ?2"
          ),
          [&event_str, &member_str],
          RawRsvp::from_row,
        )?)
      })
      .await?;

    raw.into_rsvp()
  }

  async fn rsvps_starting_on(
    &self,
    member_ids: &[Uuid],
    day: NaiveDate,
  ) -> Result<Vec<(Rsvp, Event)>> {
    if member_ids.is_empty() {
      return Ok(Vec::new());
    }

    let day = day.format("%Y-%m-%d").to_string();
    let ids: Vec<String> = member_ids.iter().copied().map(encode_uuid).collect();

    let raws: Vec<(RawRsvp, RawEvent)> = self
      .conn
      .call(move |conn| {
        let mut rows = Vec::new();
        for chunk in ids.chunks(MEMBER_ID_CHUNK) {
          rows.extend(rsvps_for_members(conn, &day, chunk)?);
        }
        Ok(rows)
      })
      .await?;

    let mut due = raws
      .into_iter()
      .map(|(rsvp, event)| Ok((rsvp.into_rsvp()?, event.into_event()?)))
      .collect::<Result<Vec<_>>>()?;
    due.sort_by(|(a, x), (b, y)| (x.start_time, a.rsvp_id).cmp(&(y.start_time, b.rsvp_id)));
    Ok(due)
  }
}

