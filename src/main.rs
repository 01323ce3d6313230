//! # engage
//!
//! Maintenance CLI for the engagement engine: schema migration, the read
//! record pruning job, and a few read-only lookups.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engage_core::{ContainerId, CourseId, PostId, UserId};
use engage_engine::{Engagement, EngineContext};
use engage_settings::{EngageSettings, load_settings, load_settings_from_path, resolve_db_path};
use engage_store::{ConnectionConfig, Store};
use tracing::info;

/// Engagement engine maintenance.
#[derive(Parser, Debug)]
#[command(name = "engage", version, about = "Forum engagement engine maintenance")]
struct Cli {
    /// Settings file (defaults to `~/.engage/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Database path, overriding `store.dbPath`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Delete read records of posts older than the staleness cutoff.
    PruneRead,
    /// Print a user's reputation as seen from a container.
    Reputation {
        #[arg(long)]
        container: ContainerId,
        #[arg(long)]
        user: UserId,
    },
    /// Print unread counts per tracked container of a course.
    Unread {
        #[arg(long)]
        course: CourseId,
        #[arg(long)]
        user: UserId,
    },
    /// Mark posts whose notification delivery failed.
    MarkMailedErrors {
        #[arg(required = true)]
        posts: Vec<PostId>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    engage_logging::init_logging(&settings.logging)?;

    let store = open_store(&cli, &settings)?;
    if let Command::Migrate = cli.command {
        println!("schema version {}", store.schema_version()?);
        return Ok(());
    }

    let engine = Engagement::new(EngineContext::new(store).with_settings(settings));
    match cli.command {
        Command::Migrate => {}
        Command::PruneRead => {
            let pruned = engine.reads.prune_stale_read_records()?;
            println!("{pruned} read records removed");
        }
        Command::Reputation { container, user } => {
            let container = engine.container(container)?;
            println!("{}", engine.ratings.get_reputation(&container, user)?);
        }
        Command::Unread { course, user } => {
            let mut counts: Vec<_> = engine
                .reads
                .count_unread_by_container_for_course(user, course)?
                .into_iter()
                .collect();
            counts.sort_unstable();
            for (container, count) in counts {
                println!("{}\t{count}", container.get());
            }
        }
        Command::MarkMailedErrors { posts } => {
            let updated = engine.finish_mail_dispatch(&posts)?;
            println!("{updated} posts marked as failed");
        }
    }
    Ok(())
}

fn open_store(cli: &Cli, settings: &EngageSettings) -> Result<Store> {
    let path = cli.db.clone().unwrap_or_else(|| resolve_db_path(settings));
    let store = Store::open(&path, &ConnectionConfig::from(&settings.store))
        .with_context(|| format!("failed to open {}", path.display()))?;
    info!(path = %path.display(), "store ready");
    Ok(store)
}
