//! `nbsync`: run NationBuilder sync jobs against the local member store.
//!
//! Reads `nbsync.toml` (or the path given with `--config`) and `NBSYNC_*`
//! environment variables, e.g. `NBSYNC_NATION_BUILDER__TOKEN`.
//!
//! ```
//! nbsync push --params '{"sync_type":"rsvp","event_id":12}'
//! nbsync pull-events
//! nbsync mark-attended 3f0c...
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use nbsync_core::{cache::MemoryCache, member::Member, phone::PhoneSettings, store::MemberStore};
use nbsync_engine::{Connector, NationBuilderConfig, SyncParams, jobs::description};
use nbsync_http::{HttpConfig, HttpNation};
use nbsync_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "nbsync", version, about = "NationBuilder sync for the local member store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "nbsync.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Push members to an event (rsvp) or a tag, in batches.
  Push {
    /// Sync parameters as JSON, e.g. `{"sync_type":"tag","tag":"volunteer"}`.
    #[arg(long)]
    params:     String,
    /// Members per batch; defaults to `push_batch_amount`.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Members to push. All members when none are given.
    members:    Vec<Uuid>,
  },
  /// Reconcile members with their remote people one at a time.
  Sync {
    #[arg(required = true)]
    members: Vec<Uuid>,
  },
  /// Import recent remote events and their RSVPs.
  PullEvents,
  /// Mark today's RSVPs attended. All members when none are given.
  MarkAttended { members: Vec<Uuid> },
  /// Print the job label for a set of sync parameters.
  Describe {
    #[arg(long)]
    params: String,
  },
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Settings {
  #[serde(default = "default_store_path")]
  store_path:     PathBuf,
  nation_builder: NationBuilderConfig,
  #[serde(default)]
  phone:          PhoneSettings,
}

fn default_store_path() -> PathBuf { PathBuf::from("nbsync.db") }

fn load_settings(path: PathBuf) -> Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("NBSYNC")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config")?
    .try_deserialize()
    .context("failed to deserialise settings")
}

type App = Connector<HttpNation, SqliteStore>;

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Describing needs no store or credentials.
  if let Command::Describe { params } = &cli.command {
    println!("{}", description(&SyncParams::parse(params)?));
    return Ok(());
  }

  let settings = load_settings(cli.config)?;
  let store_path = expand_tilde(&settings.store_path);
  let store = SqliteStore::open(&store_path, settings.phone.clone())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let nation = &settings.nation_builder;
  let http = HttpNation::new(HttpConfig {
    site:         nation.site.clone(),
    token:        nation.token.clone(),
    base_url:     nation.base_url.clone(),
    timeout_secs: nation.timeout_secs,
  })
  .context("failed to build HTTP client")?;

  let app: App = Connector::new(
    http,
    store,
    settings.nation_builder.clone(),
    settings.phone,
    Arc::new(MemoryCache::new()),
  );

  match cli.command {
    Command::Push { params, batch_size, members } => {
      let params = SyncParams::parse(&params)?;
      let members = load_members(&app, members).await?;
      let batch_size = batch_size.unwrap_or(app.api().config().push_batch_amount);
      let total = app
        .push_in_batches(&members, &params, batch_size, |index, count| {
          info!(batch = index, count, "batch pushed");
        })
        .await?;
      println!("{}: {total} pushed", description(&params));
    }
    Command::Sync { members } => {
      for member in load_members(&app, members).await? {
        let person_id = app
          .sync_person(&member)
          .await
          .with_context(|| format!("failed to sync member {}", member.member_id))?;
        println!("{} -> {person_id}", member.member_id);
      }
    }
    Command::PullEvents => {
      let count = app.pull_new_events().await?;
      println!("{count} events pulled");
    }
    Command::MarkAttended { members } => {
      let members = load_members(&app, members).await?;
      let count = app.mark_attended_for_today(&members).await?;
      println!("{count} RSVPs marked attended");
    }
    Command::Describe { .. } => {}
  }

  Ok(())
}

/// Load the named members, or every member when `ids` is empty.
async fn load_members(app: &App, ids: Vec<Uuid>) -> Result<Vec<Member>> {
  let ids = if ids.is_empty() { app.store().member_ids().await? } else { ids };
  let mut members = Vec::with_capacity(ids.len());
  for id in ids {
    let member = app
      .store()
      .get_member(id)
      .await?
      .with_context(|| format!("no member {id}"))?;
    members.push(member);
  }
  Ok(members)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
