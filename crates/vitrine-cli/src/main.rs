//! # vitrine
//!
//! Command-line access to the session state database: dump state, deltas and
//! the view stack, replay to a step, verify a delta log, roll back.
//!
//! Every command prints JSON on stdout. Logs go to stderr.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use vitrine_core::{DeltaSource, SystemClock, UuidIds};
use vitrine_settings::{VitrineSettings, load_settings, load_settings_from_path, vitrine_home};
use vitrine_state::sqlite::current_version;
use vitrine_state::{
    ConnectionConfig, RollbackRequest, StateStore, StoreOptions, new_file, run_migrations,
};

/// Vitrine session state tooling.
#[derive(Parser, Debug)]
#[command(name = "vitrine", about = "Inspect, replay and roll back session state")]
struct Cli {
    /// Path to the `SQLite` database (overrides `store.dbPath`).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the settings file (default: `~/.vitrine/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Print the current state of a session.
    State {
        /// Session ID.
        session: String,
    },
    /// Print the delta log of a session.
    Deltas {
        /// Session ID.
        session: String,
        /// Only deltas with `step >= N`.
        #[arg(long, conflicts_with = "until")]
        since: Option<i64>,
        /// Only deltas with `step <= N`.
        #[arg(long)]
        until: Option<i64>,
        /// Only deltas recorded under this turn.
        #[arg(long, conflicts_with_all = ["since", "until"])]
        turn: Option<String>,
    },
    /// Print the navigation stack of a session.
    Stack {
        /// Session ID.
        session: String,
    },
    /// Rebuild the zones as they were at a step.
    Replay {
        /// Session ID.
        session: String,
        /// Target step.
        #[arg(long)]
        to: i64,
    },
    /// Check checksums, step continuity and replay of a delta log.
    Verify {
        /// Session ID.
        session: String,
    },
    /// Restore the zones of an earlier step by appending a rollback delta.
    Rollback {
        /// Session ID.
        session: String,
        /// Step to restore.
        #[arg(long)]
        to: i64,
        /// Actor recorded on the rollback delta.
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// List sessions with state.
    Sessions,
    /// Apply pending schema migrations.
    Migrate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    vitrine_core::logging::init_subscriber(&settings.logging.level);

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| settings.store.resolve_db_path(&vitrine_home()));
    let (store, applied) = open_store(&db_path, &settings)?;
    tracing::debug!(path = %db_path.display(), applied, "database opened");

    let output = run(&store, cli.command, applied)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Open the pool, migrate, and wire a store. Returns the migrations applied.
fn open_store(path: &Path, settings: &VitrineSettings) -> Result<(StateStore, u32)> {
    ensure_parent_dir(path)?;
    let pool = new_file(path, &ConnectionConfig::from(&settings.store))
        .with_context(|| format!("failed to open database: {}", path.display()))?;
    let applied = {
        let conn = pool.get().context("failed to get a connection")?;
        run_migrations(&conn).context("failed to run migrations")?
    };
    let store = StateStore::new(
        pool,
        Arc::new(SystemClock),
        Arc::new(UuidIds),
        StoreOptions::from(&settings.store),
    );
    Ok((store, applied))
}

fn run(store: &StateStore, command: Command, applied: u32) -> Result<Value> {
    let output = match command {
        Command::State { session } => serde_json::to_value(
            store
                .get_state(&session)
                .with_context(|| format!("no state for session {session}"))?,
        )?,
        Command::Deltas {
            session,
            since,
            until,
            turn,
        } => {
            let deltas = match (since, until, turn) {
                (_, _, Some(turn)) => store.get_turn_deltas(&session, &turn)?,
                (Some(from), _, _) => store.get_deltas_since(&session, from)?,
                (_, Some(to), _) => store.get_deltas_until(&session, to)?,
                _ => store.get_deltas(&session)?,
            };
            serde_json::to_value(deltas)?
        }
        Command::Stack { session } => serde_json::to_value(store.get_view_stack(&session)?)?,
        Command::Replay { session, to } => serde_json::to_value(store.reconstruct(&session, to)?)?,
        Command::Verify { session } => serde_json::to_value(store.verify_deltas(&session)?)?,
        Command::Rollback { session, to, actor } => {
            let request = RollbackRequest::to(to).by(DeltaSource::User, actor);
            let outcome = store
                .rollback(&session, &request)
                .with_context(|| format!("rollback of session {session} to step {to} failed"))?;
            serde_json::to_value(outcome)?
        }
        Command::Sessions => serde_json::to_value(store.list_sessions()?)?,
        Command::Migrate => {
            let conn = store.pool().get()?;
            json!({
                "applied": applied,
                "schemaVersion": current_version(&conn)?,
            })
        }
    };
    Ok(output)
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use vitrine_core::{DeltaInfo, Product, ResultMeta, StateData};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_db_after_subcommand() {
        let cli = Cli::try_parse_from(["vitrine", "deltas", "s1", "--since", "3", "--db", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(
            cli.command,
            Command::Deltas {
                session: "s1".into(),
                since: Some(3),
                until: None,
                turn: None,
            }
        );
    }

    #[test]
    fn since_and_until_conflict() {
        assert!(Cli::try_parse_from(["vitrine", "deltas", "s1", "--since", "1", "--until", "2"]).is_err());
    }

    #[test]
    fn rollback_actor_defaults_to_cli() {
        let cli = Cli::try_parse_from(["vitrine", "rollback", "s1", "--to", "2"]).unwrap();
        assert_matches_rollback(&cli.command, "cli");
    }

    fn assert_matches_rollback(command: &Command, expected_actor: &str) {
        match command {
            Command::Rollback { actor, to, .. } => {
                assert_eq!(actor, expected_actor);
                assert_eq!(*to, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn setup() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let (store, applied) = open_store(&path, &VitrineSettings::default()).unwrap();
        assert_eq!(applied, 1);
        store.create_state("s1").unwrap();
        store
            .write_data(
                "s1",
                StateData {
                    products: vec![Product::new("p1", "Sneaker")],
                    services: vec![],
                },
                ResultMeta::count(1),
                DeltaInfo::search("data-agent", "search_products"),
            )
            .unwrap();
        (dir, store)
    }

    #[test]
    fn state_and_deltas_print_json() {
        let (_dir, store) = setup();
        let state = run(&store, Command::State { session: "s1".into() }, 0).unwrap();
        assert_eq!(state["step"], 1);
        assert_eq!(state["sessionId"], "s1");

        let deltas = run(
            &store,
            Command::Deltas {
                session: "s1".into(),
                since: None,
                until: None,
                turn: None,
            },
            0,
        )
        .unwrap();
        assert_eq!(deltas.as_array().unwrap().len(), 1);
    }

    #[test]
    fn verify_and_rollback() {
        let (_dir, store) = setup();
        let report = run(&store, Command::Verify { session: "s1".into() }, 0).unwrap();
        assert_eq!(report["replayMatches"], true);

        let outcome = run(
            &store,
            Command::Rollback {
                session: "s1".into(),
                to: 0,
                actor: "ops".into(),
            },
            0,
        )
        .unwrap();
        assert_eq!(outcome["delta"]["actorId"], "ops");
        assert_eq!(outcome["state"]["step"], 2);
    }

    #[test]
    fn missing_session_is_an_error() {
        let (_dir, store) = setup();
        let err = run(&store, Command::State { session: "ghost".into() }, 0).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn migrate_reports_version() {
        let (_dir, store) = setup();
        let out = run(&store, Command::Migrate, 0).unwrap();
        assert_eq!(out["schemaVersion"], 1);
    }
}
