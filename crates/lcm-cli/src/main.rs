//! # lcm-ledger
//!
//! Maintenance CLI for the context ledger: inspect summary graphs and active
//! context, dissolve condensed summaries, and transplant summary footprints
//! between conversations. Mutating commands are dry runs unless `--apply`.
//! Every command except `init` requires an existing ledger and never changes
//! its schema.

#![deny(unsafe_code)]

mod render;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lcm_core::{RandomIds, SummaryId, SystemClock};
use lcm_engine::{
    DissolveEngine, DissolveRequest, Expansion, SummaryGraph, TransplantEngine, TransplantRequest,
};
use lcm_settings::LedgerSettings;
use lcm_store::repositories::{ContextItemRepo, ConversationRepo, MessageRepo};
use lcm_store::{
    ConnectionConfig, ConnectionPool, check_contiguity, missing_tables, open_existing,
    run_migrations,
};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

/// Context ledger maintenance.
#[derive(Parser, Debug)]
#[command(name = "lcm-ledger", about = "Inspect and maintain the context ledger")]
struct Cli {
    /// Path to the `SQLite` ledger (overrides settings).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Replace a condensed summary in the active context with its parents.
    Dissolve {
        /// Conversation whose context is rewritten.
        conversation_id: i64,
        /// Condensed summary to dissolve.
        #[arg(long)]
        summary_id: String,
        /// Execute instead of printing the plan.
        #[arg(long)]
        apply: bool,
        /// Also delete the summary record and its edges.
        #[arg(long)]
        purge: bool,
    },
    /// Copy the source's active summaries and their ancestors into the target.
    Transplant {
        /// Conversation copied from.
        source_id: i64,
        /// Conversation copied into.
        target_id: i64,
        /// Execute instead of printing the plan.
        #[arg(long)]
        apply: bool,
    },
    /// Show a conversation's summary DAG.
    Graph {
        /// Conversation to show.
        #[arg(required_unless_present = "session", conflicts_with = "session")]
        conversation_id: Option<i64>,
        /// Resolve the latest conversation of this session instead.
        #[arg(long)]
        session: Option<String>,
        /// Show roots only.
        #[arg(long)]
        collapsed: bool,
    },
    /// List a conversation's active context with token counts.
    Context {
        /// Conversation to list.
        conversation_id: i64,
    },
    /// List the messages a summary was built from.
    Sources {
        /// Summary to look up.
        summary_id: String,
    },
    /// Verify that a conversation's context ordinals are contiguous.
    Check {
        /// Conversation to verify.
        conversation_id: i64,
    },
    /// List conversations with summary and context counts.
    Conversations,
    /// Create the ledger database and its tables if they do not exist.
    Init,
}

/// How a successful command ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Ok,
    /// The ledger was readable but failed a check.
    Broken,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();
    match run(&cli, &mut stdout) {
        Ok(Outcome::Ok) => ExitCode::SUCCESS,
        Ok(Outcome::Broken) => ExitCode::from(2),
        Err(e) => {
            let _ = stdout.flush();
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, out: &mut dyn Write) -> Result<Outcome> {
    let mut settings = lcm_settings::load_settings().context("failed to load settings")?;
    apply_flags(&mut settings, cli);
    lcm_core::logging::init_subscriber(&settings.logging.level);

    if cli.command == Command::Init {
        let applied = init_ledger(&settings)?;
        writeln!(
            out,
            "Ledger ready at {} ({applied} migrations applied).",
            settings.database.path
        )?;
        return Ok(Outcome::Ok);
    }

    let pool = open_ledger(&settings)?;
    let conn = pool.get().context("failed to check out a ledger connection")?;
    execute(&cli.command, &conn, cli.json, out)
}

fn apply_flags(settings: &mut LedgerSettings, cli: &Cli) {
    if let Some(db) = &cli.db {
        settings.database.path = db.to_string_lossy().into_owned();
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
}

fn connection_config(settings: &LedgerSettings) -> ConnectionConfig {
    ConnectionConfig {
        pool_size: settings.database.pool_size,
        busy_timeout_ms: settings.database.busy_timeout_ms,
    }
}

/// Open an existing ledger. Fails on a missing file or missing tables.
fn open_ledger(settings: &LedgerSettings) -> Result<ConnectionPool> {
    let path = Path::new(&settings.database.path);
    let pool = open_existing(path, &connection_config(settings))
        .with_context(|| format!("failed to open ledger at {}", path.display()))?;
    let conn = pool.get().context("failed to check out a ledger connection")?;
    let missing = missing_tables(&conn).context("failed to inspect ledger schema")?;
    if !missing.is_empty() {
        anyhow::bail!(
            "{} is not a context ledger (missing tables: {}); run `lcm-ledger init` to create one",
            path.display(),
            missing.join(", ")
        );
    }
    Ok(pool)
}

/// Create the ledger file and apply pending migrations.
fn init_ledger(settings: &LedgerSettings) -> Result<u32> {
    let path = Path::new(&settings.database.path);
    let pool = lcm_store::new_file(path, &connection_config(settings))
        .with_context(|| format!("failed to create ledger at {}", path.display()))?;
    let conn = pool.get().context("failed to check out a ledger connection")?;
    let applied = run_migrations(&conn).context("failed to migrate ledger schema")?;
    info!(applied, path = %path.display(), "ledger initialized");
    Ok(applied)
}

fn execute(command: &Command, conn: &Connection, json: bool, out: &mut dyn Write) -> Result<Outcome> {
    match command {
        Command::Dissolve {
            conversation_id,
            summary_id,
            apply,
            purge,
        } => {
            let request = DissolveRequest {
                conversation_id: *conversation_id,
                summary_id: SummaryId::from_string(summary_id.clone()),
                purge: *purge,
            };
            let clock = SystemClock;
            let engine = DissolveEngine::new(conn, &clock);
            let report = if *apply {
                engine.apply(&request)
            } else {
                engine.plan(&request)
            }
            .with_context(|| format!("dissolve {summary_id} in conversation {conversation_id}"))?;
            emit(out, json, &report, |out| render::dissolve(out, &report))?;
        }
        Command::Transplant {
            source_id,
            target_id,
            apply,
        } => {
            let request = TransplantRequest {
                source_conversation_id: *source_id,
                target_conversation_id: *target_id,
            };
            let clock = SystemClock;
            let ids = RandomIds;
            let engine = TransplantEngine::new(conn, &clock, &ids);
            let report = if *apply {
                engine.apply(request)
            } else {
                engine.plan(request)
            }
            .with_context(|| format!("transplant conversation {source_id} -> {target_id}"))?;
            emit(out, json, &report, |out| render::transplant(out, &report))?;
        }
        Command::Graph {
            conversation_id,
            session,
            collapsed,
        } => {
            let graph = match (conversation_id, session) {
                (_, Some(session)) => SummaryGraph::load_for_session(conn, session),
                (Some(id), None) => SummaryGraph::load(conn, *id),
                (None, None) => anyhow::bail!("graph needs a conversation id or --session"),
            }
            .context("failed to load summary graph")?;
            let expansion = if *collapsed {
                Expansion::collapsed()
            } else {
                Expansion::All
            };
            emit(out, json, &graph, |out| render::graph(out, &graph, &expansion))?;
        }
        Command::Context { conversation_id } => {
            let _ = ConversationRepo::require(conn, *conversation_id)?;
            let entries = ContextItemRepo::list_with_tokens(conn, *conversation_id)
                .context("failed to list context items")?;
            emit(out, json, &entries, |out| render::context(out, &entries))?;
        }
        Command::Sources { summary_id } => {
            let id = SummaryId::from_string(summary_id.clone());
            let messages =
                MessageRepo::sources_of(conn, &id).context("failed to list source messages")?;
            emit(out, json, &messages, |out| render::sources(out, &messages))?;
        }
        Command::Check { conversation_id } => {
            let _ = ConversationRepo::require(conn, *conversation_id)?;
            let report = check_contiguity(conn, *conversation_id)?;
            emit(out, json, &report, |out| {
                render::check(out, *conversation_id, &report)
            })?;
            if !report.is_contiguous() {
                return Ok(Outcome::Broken);
            }
        }
        Command::Conversations => {
            let overview =
                ConversationRepo::list_overview(conn).context("failed to list conversations")?;
            emit(out, json, &overview, |out| render::conversations(out, &overview))?;
        }
        Command::Init => anyhow::bail!("init runs before a ledger is opened"),
    }
    Ok(Outcome::Ok)
}

fn emit<T, F>(out: &mut dyn Write, json: bool, value: &T, text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    if json {
        serde_json::to_writer_pretty(&mut *out, value)?;
        writeln!(out)?;
    } else {
        text(out)?;
    }
    Ok(())
}
