//! Sync entrypoints for the scheduling infrastructure.

use nbsync_core::{
  Error, Result, SYSTEM_NAME,
  member::Member,
  person::PersonId,
  remote::RemoteClient,
  store::MemberStore,
};
use serde::{Deserialize, Deserializer, Serialize, de};
use tracing::info;

use crate::{Connector, batch::BatchResult};

/// Members per batch in [`Connector::push_in_batches`] unless configured.
pub const BATCH_AMOUNT: usize = 10;

/// Jobs run by [`Connector::pull_new_events`], in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullJob {
  FetchNewEvents,
}

pub const PULL_JOBS: [PullJob; 1] = [PullJob::FetchNewEvents];

// ─── Parameters ──────────────────────────────────────────────────────────────

/// What a push does with its members, as handed over by the scheduler:
/// `{"sync_type": "rsvp", "event_id": 12}` or
/// `{"sync_type": "tag", "tag": "volunteer"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sync_type", rename_all = "lowercase")]
pub enum SyncParams {
  Rsvp {
    /// Defaults to the configured site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    site_slug:     Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    event_id:      u64,
    #[serde(default)]
    mark_attended: bool,
    #[serde(
      default,
      deserialize_with = "flexible_opt_id",
      skip_serializing_if = "Option::is_none"
    )]
    recruiter_id:  Option<PersonId>,
  },
  Tag {
    tag: String,
  },
}

/// Ids come through as numbers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
  Number(u64),
  Text(String),
}

impl IdRepr {
  fn into_id<E: de::Error>(self) -> Result<u64, E> {
    match self {
      IdRepr::Number(n) => Ok(n),
      IdRepr::Text(s) => s
        .trim()
        .parse()
        .map_err(|_| E::custom(format!("expected a numeric id, got {s:?}"))),
    }
  }
}

fn flexible_id<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
  IdRepr::deserialize(d)?.into_id()
}

fn flexible_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
  Option::<IdRepr>::deserialize(d)?.map(IdRepr::into_id).transpose()
}

impl SyncParams {
  pub fn parse(json: &str) -> Result<Self> {
    serde_json::from_str(json).map_err(|e| Error::InvalidParams(e.to_string()))
  }

  pub fn sync_type(&self) -> &'static str {
    match self {
      Self::Rsvp { .. } => "rsvp",
      Self::Tag { .. } => "tag",
    }
  }

  /// The event id or the tag.
  pub fn item(&self) -> String {
    match self {
      Self::Rsvp { event_id, .. } => event_id.to_string(),
      Self::Tag { tag } => tag.clone(),
    }
  }

  /// The kind of remote record a push writes to.
  pub fn contact_type(&self) -> &'static str {
    match self {
      Self::Rsvp { .. } => "event",
      Self::Tag { .. } => "list",
    }
  }
}

fn titleize(s: &str) -> String {
  s.split('_')
    .filter(|w| !w.is_empty())
    .map(|w| {
      let mut chars = w.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// A human-readable job label, e.g. `Nation Builder - Rsvp: #12 (event)`.
pub fn description(params: &SyncParams) -> String {
  format!(
    "{} - {}: #{} ({})",
    titleize(SYSTEM_NAME),
    titleize(params.sync_type()),
    params.item(),
    params.contact_type(),
  )
}

// ─── Entrypoints ─────────────────────────────────────────────────────────────

impl<C: RemoteClient, S: MemberStore> Connector<C, S> {
  /// Run one push over `members`.
  pub async fn push(&self, members: &[Member], params: &SyncParams) -> Result<BatchResult> {
    match params {
      SyncParams::Rsvp { site_slug, event_id, mark_attended, recruiter_id } => {
        let site_slug = site_slug.as_deref().unwrap_or(&self.api.config().site_slug);
        self
          .rsvp_batch(members, site_slug, *event_id, *mark_attended, *recruiter_id)
          .await
      }
      SyncParams::Tag { tag } => self.tag_batch(members, tag).await,
    }
  }

  /// Push `members` in batches of `batch_size`, calling `on_batch(index,
  /// count)` after each. The first error aborts the remaining batches.
  /// Returns the total count.
  pub async fn push_in_batches(
    &self,
    members: &[Member],
    params: &SyncParams,
    batch_size: usize,
    mut on_batch: impl FnMut(usize, usize),
  ) -> Result<usize> {
    let mut total = 0;
    for (index, batch) in members.chunks(batch_size.max(1)).enumerate() {
      let result = self.push(batch, params).await?;
      on_batch(index, result.count);
      total += result.count;
    }
    info!(description = %description(params), total, "push finished");
    Ok(total)
  }

  /// Run every pull job. Returns the number of records pulled.
  pub async fn pull_new_events(&self) -> Result<usize> {
    let months = self.api.config().pull_months;
    let mut total = 0;
    for job in PULL_JOBS {
      total += match job {
        PullJob::FetchNewEvents => self.fetch_recent_events(months).await?,
      };
    }
    Ok(total)
  }
}
