//! SQL schema for the nbsync SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS members (
    member_id    TEXT PRIMARY KEY,
    title        TEXT,
    first_name   TEXT,
    middle_names TEXT,
    last_name    TEXT,
    gender       TEXT,
    email        TEXT,
    entry_point  TEXT NOT NULL,   -- last writer, e.g. 'nation_builder'
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL    -- record-level clock
);

-- Numbers are stored as received; mobile/landline is classified on read.
CREATE TABLE IF NOT EXISTS member_phones (
    member_id  TEXT NOT NULL REFERENCES members(member_id),
    phone      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (member_id, phone)
);

-- One home address per member.
CREATE TABLE IF NOT EXISTS member_addresses (
    member_id TEXT PRIMARY KEY REFERENCES members(member_id),
    line1     TEXT,
    line2     TEXT,
    town      TEXT,
    state     TEXT,
    postcode  TEXT,
    country   TEXT
);

CREATE TABLE IF NOT EXISTS member_subscriptions (
    member_id    TEXT NOT NULL REFERENCES members(member_id),
    subscription TEXT NOT NULL,   -- 'email' | 'sms' | 'calling'
    subscribed   INTEGER NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (member_id, subscription)
);

-- Never deleted. A remote id belongs to exactly one member.
CREATE TABLE IF NOT EXISTS member_external_ids (
    member_id   TEXT NOT NULL REFERENCES members(member_id),
    system      TEXT NOT NULL,
    external_id TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (system, external_id)
);

CREATE TABLE IF NOT EXISTS events (
    event_id           TEXT PRIMARY KEY,
    external_source    TEXT NOT NULL,
    external_subsource TEXT NOT NULL,
    external_id        TEXT NOT NULL,
    name               TEXT NOT NULL,
    start_time         TEXT,          -- RFC 3339 UTC
    end_time           TEXT,
    description        TEXT,
    location           TEXT,
    latitude           REAL,
    longitude          REAL,
    max_attendees      INTEGER,
    approved           INTEGER NOT NULL DEFAULT 0,
    invite_only        INTEGER NOT NULL DEFAULT 0,
    attendees          INTEGER NOT NULL DEFAULT 0,
    UNIQUE (external_source, external_subsource, external_id)
);

CREATE TABLE IF NOT EXISTS event_rsvps (
    rsvp_id     TEXT PRIMARY KEY,
    event_id    TEXT NOT NULL REFERENCES events(event_id),
    member_id   TEXT NOT NULL REFERENCES members(member_id),
    attended    INTEGER NOT NULL DEFAULT 0,
    external_id TEXT,             -- remote RSVP id
    UNIQUE (event_id, member_id)
);

CREATE INDEX IF NOT EXISTS members_email_idx      ON members(email);
CREATE INDEX IF NOT EXISTS external_ids_member_idx ON member_external_ids(member_id);
CREATE INDEX IF NOT EXISTS events_start_idx       ON events(start_time);
CREATE INDEX IF NOT EXISTS rsvps_member_idx       ON event_rsvps(member_id);

PRAGMA user_version = 1;
";
