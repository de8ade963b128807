//! Settings for one NationBuilder nation.

use nbsync_core::person::PersonId;
use serde::Deserialize;

use crate::jobs::BATCH_AMOUNT;

fn default_push_batch_amount() -> usize { BATCH_AMOUNT }

fn default_pull_months() -> u32 { 3 }

fn default_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NationBuilderConfig {
  /// The nation slug, as in `https://<site>.nationbuilder.com`.
  pub site:              String,
  pub token:             String,
  /// The site events are listed under and RSVPs are created on.
  pub site_slug:         String,
  /// Author recorded on lists created for tagging.
  #[serde(default)]
  pub author_id:         Option<PersonId>,
  /// Log every remote call with its parameters, response and timing.
  #[serde(default)]
  pub debug:             bool,
  #[serde(default = "default_push_batch_amount")]
  pub push_batch_amount: usize,
  /// How far back `pull_new_events` looks.
  #[serde(default = "default_pull_months")]
  pub pull_months:       u32,
  #[serde(default)]
  pub base_url:          Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs:      u64,
}

impl NationBuilderConfig {
  pub fn new(
    site: impl Into<String>,
    token: impl Into<String>,
    site_slug: impl Into<String>,
  ) -> Self {
    Self {
      site:              site.into(),
      token:             token.into(),
      site_slug:         site_slug.into(),
      author_id:         None,
      debug:             false,
      push_batch_amount: default_push_batch_amount(),
      pull_months:       default_pull_months(),
      base_url:          None,
      timeout_secs:      default_timeout_secs(),
    }
  }
}
