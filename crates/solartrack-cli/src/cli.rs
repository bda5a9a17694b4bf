use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use solartrack_model::{
    snapshot_from_json, CellChange, ChangeKind, ChangeLogEntry, CoordinateResolver, EntryId,
    IdGenerator, TableKind, TableSnapshot,
};
use solartrack_sync::persist::load_change_log;
use solartrack_sync::{
    DiffOptions, Differ, GoogleSheetsWriter, HttpTableSource, KeyValueStore, MemoryKvStore,
    PollScheduler, PollState, SqliteKvStore, SyncClient, SyncConfig, SyncEngine,
};

const DEFAULT_DATABASE: &str = "solartrack.sqlite";

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "solartrack",
    about = "Track inventory sheet changes and highlight them in Google Sheets."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Diff two provider payloads (JSON) of the same table.
    Diff {
        /// `inventory` or `install_history`.
        table: TableKind,
        previous: PathBuf,
        current: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Do not report rows that disappeared.
        #[arg(long)]
        no_removals: bool,
    },
    /// Print the A1 reference of a field in a zero-based row.
    CellRef {
        table: TableKind,
        row_index: usize,
        /// Field name or sheet header (`modules_count`, "No. Of Modules").
        field: String,
    },
    /// Parse an A1 reference and show what each table keeps there.
    ParseCell { cell: String },
    /// Print the persisted change log.
    Log {
        /// SQLite database holding the log (defaults to the configured path).
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Only entries not yet marked read.
        #[arg(long)]
        unread: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Poll the providers and sync highlights until interrupted.
    Watch {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Run a single poll cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

pub async fn run() -> Result<()> {
    let args = Args::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_args(args, &mut out).await
}

pub async fn run_with_args(args: Args, out: &mut dyn Write) -> Result<()> {
    match args.command {
        Command::Diff {
            table,
            previous,
            current,
            format,
            no_removals,
        } => diff_files(table, &previous, &current, format, !no_removals, out),
        Command::CellRef {
            table,
            row_index,
            field,
        } => {
            let cell = CoordinateResolver::default().to_cell_ref_by_name(table, row_index, &field)?;
            writeln!(out, "{cell}")?;
            Ok(())
        }
        Command::ParseCell { cell } => parse_cell(&cell, out),
        Command::Log {
            db,
            config,
            unread,
            format,
        } => {
            let config = load_config(config.as_deref())?;
            let path = db
                .or(config.database_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));
            print_log(&path, unread, format, out)
        }
        Command::Watch { config, once } => {
            let config = load_config(config.as_deref())?;
            watch(config, once, out).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn read_snapshot(table: TableKind, path: &Path) -> Result<TableSnapshot> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(snapshot_from_json(table, &payload, Utc::now())?)
}

fn kind_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Modified => "modified",
        ChangeKind::Removed => "removed",
    }
}

pub fn diff_files(
    table: TableKind,
    previous: &Path,
    current: &Path,
    format: OutputFormat,
    detect_removed_rows: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let previous = read_snapshot(table, previous)?;
    let current = read_snapshot(table, current)?;
    let resolver = CoordinateResolver::default();
    let changes: Vec<CellChange> = Differ::new(
        &resolver,
        DiffOptions {
            detect_removed_rows,
        },
    )
    .diff(Some(&previous), &current, &mut IdGenerator::new())?;

    match format {
        OutputFormat::Text => {
            if changes.is_empty() {
                writeln!(out, "No differences.")?;
                return Ok(());
            }
            writeln!(out, "{} changes in {}", changes.len(), table.display_name())?;
            for change in &changes {
                writeln!(out, "  {:<8} {}", kind_label(change.kind), change.describe())?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &changes)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn parse_cell(cell: &str, out: &mut dyn Write) -> Result<()> {
    let parsed = CoordinateResolver::from_cell_ref(cell)?;
    writeln!(
        out,
        "{parsed}: row {} (index {}), column {} (index {})",
        parsed.row_number(),
        parsed.row,
        parsed.column_letters(),
        parsed.col
    )?;
    let resolver = CoordinateResolver::default();
    for table in TableKind::ALL {
        match resolver.locate(table, parsed) {
            Some((row_index, field)) => writeln!(
                out,
                "  {}: row index {row_index}, {}",
                table.display_name(),
                field.label()
            )?,
            None => writeln!(out, "  {}: (header or unmapped column)", table.display_name())?,
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonLog<'a> {
    total: usize,
    unread: usize,
    entries: Vec<&'a ChangeLogEntry>,
}

pub fn print_log(path: &Path, unread_only: bool, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    let store = SqliteKvStore::open_path(path)
        .with_context(|| format!("open change log database {}", path.display()))?;
    let entries = load_change_log(&store);
    let unread = entries.iter().filter(|e| !e.read).count();
    let shown: Vec<&ChangeLogEntry> = entries
        .iter()
        .filter(|e| !unread_only || !e.read)
        .collect();

    match format {
        OutputFormat::Text => {
            writeln!(out, "Change log: {} entries, {unread} unread", entries.len())?;
            for entry in shown {
                writeln!(
                    out,
                    "{} {} [{}] {}: {}",
                    if entry.read { " " } else { "*" },
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    entry.scope(),
                    entry.summary
                )?;
            }
        }
        OutputFormat::Json => {
            let report = JsonLog {
                total: entries.len(),
                unread,
                entries: shown,
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

async fn watch(config: SyncConfig, once: bool, out: &mut dyn Write) -> Result<()> {
    let store: Arc<dyn KeyValueStore> = match &config.database_path {
        Some(path) => Arc::new(
            SqliteKvStore::open_path(path)
                .with_context(|| format!("open change log database {}", path.display()))?,
        ),
        None => Arc::new(MemoryKvStore::new()),
    };
    let resolver = config.resolver();
    let engine = SyncEngine::new(resolver.clone(), config.diff, config.change_log).with_store(store);
    let engine = Arc::new(Mutex::new(engine));

    let source = HttpTableSource::new(config.provider.urls()?, config.provider.timeout())?;
    let sync = if config.sheets_enabled() {
        let writer = GoogleSheetsWriter::new(
            &config.sheets.api_base,
            &config.sheets.spreadsheet_id,
            config.sheets.access_token.clone(),
            config.provider.timeout(),
        )?;
        Some(SyncClient::new(writer, &resolver, config.sync.clone()))
    } else {
        log::info!("no spreadsheet configured; highlights will not be pushed");
        None
    };

    let mut scheduler_config = config.scheduler;
    scheduler_config.poll_on_start = true;
    let scheduler = PollScheduler::spawn(scheduler_config, engine, source, sync);
    log::info!(
        "polling every {}s (auto sync: {})",
        scheduler_config.poll_interval_secs,
        scheduler_config.auto_sync
    );

    let mut log_rx = scheduler.events().subscribe_log();
    let mut status_rx = scheduler.events().subscribe_status();
    let mut seen: BTreeSet<EntryId> = log_rx.borrow().iter().map(|e| e.id.clone()).collect();

    loop {
        tokio::select! {
            changed = log_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let entries: Vec<ChangeLogEntry> = log_rx.borrow_and_update().clone();
                for entry in entries.iter().rev().filter(|e| !seen.contains(&e.id)) {
                    writeln!(out, "[{}] {}: {}", entry.action, entry.scope(), entry.summary)?;
                }
                seen = entries.into_iter().map(|e| e.id).collect();
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if once && status.cycles_completed > 0 && status.state == PollState::Idle {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt received; stopping");
                break;
            }
        }
    }

    // Entries recorded right before the loop stopped.
    let remaining: Vec<ChangeLogEntry> = log_rx.borrow().clone();
    for entry in remaining.iter().rev().filter(|e| !seen.contains(&e.id)) {
        writeln!(out, "[{}] {}: {}", entry.action, entry.scope(), entry.summary)?;
    }
    scheduler.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from([
            "solartrack",
            "diff",
            "inventory",
            "a.json",
            "b.json",
            "--format",
            "json",
            "--no-removals",
        ])
        .unwrap();
        match args.command {
            Command::Diff {
                table,
                format,
                no_removals,
                ..
            } => {
                assert_eq!(table, TableKind::Inventory);
                assert!(matches!(format, OutputFormat::Json));
                assert!(no_removals);
            }
            _ => panic!("expected diff"),
        }

        let args = Args::try_parse_from(["solartrack", "cell-ref", "sheet2", "3", "Panels"]).unwrap();
        assert!(matches!(
            args.command,
            Command::CellRef {
                table: TableKind::InstallHistory,
                row_index: 3,
                ..
            }
        ));

        assert!(Args::try_parse_from(["solartrack", "diff", "warehouse", "a", "b"]).is_err());
    }
}
