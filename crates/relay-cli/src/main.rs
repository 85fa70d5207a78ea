//! Record store inspection CLI.
//!
//! Provides the `relay` binary for looking into store snapshots written by
//! `StoreData::to_json`. Every subcommand loads the snapshot into a fresh
//! `StoreData` and reads through the same layered `RecordStore` the
//! library uses, so what it prints is what a reader would see.

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use relay_core::interface::connection;
use relay_core::{Call, DataId, Lookup};
use relay_store::{StoreConfig, StoreData};

/// Exit code for a failed lookup or bad arguments.
const EXIT_NOT_FOUND: i32 = 1;
/// Exit code for unreadable input files.
const EXIT_IO: i32 = 3;

/// Relay record store tools.
#[derive(Parser)]
#[command(name = "relay", about = "Inspect normalized record store snapshots")]
struct Cli {
    /// Store config file (JSON). Absent keys use defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print tier sizes and the root call index.
    Inspect {
        /// Path to the snapshot file.
        snapshot: PathBuf,
    },

    /// Print one record as each tier holds it.
    Record {
        /// Path to the snapshot file.
        snapshot: PathBuf,

        /// Id of the record.
        id: String,
    },

    /// Print a window of a connection's range.
    Range {
        /// Path to the snapshot file.
        snapshot: PathBuf,

        /// Id of the connection record.
        connection: String,

        /// Number of edges from the head.
        #[arg(long, conflicts_with = "last")]
        first: Option<u64>,

        /// Number of edges from the tail.
        #[arg(long)]
        last: Option<u64>,

        /// Cursor to start after.
        #[arg(long)]
        after: Option<String>,

        /// Cursor to end before.
        #[arg(long)]
        before: Option<String>,
    },

    /// Resolve a root call to a record id.
    Lookup {
        /// Path to the snapshot file.
        snapshot: PathBuf,

        /// Storage key of the root call, e.g. `viewer`.
        storage_key: String,

        /// Identifying argument of the root call.
        #[arg(short, long)]
        arg: Option<String>,
    },
}

impl Commands {
    fn snapshot(&self) -> &Path {
        match self {
            Commands::Inspect { snapshot }
            | Commands::Record { snapshot, .. }
            | Commands::Range { snapshot, .. }
            | Commands::Lookup { snapshot, .. } => snapshot,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().ok();
            process::exit(if err.use_stderr() { EXIT_NOT_FOUND } else { 0 });
        }
    };
    init_tracing(cli.verbose);
    process::exit(run(&cli));
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs one command and prints its JSON result.
///
/// Returns exit code: 0 = success, 1 = lookup failure, 3 = I/O or parse
/// error.
fn run(cli: &Cli) -> i32 {
    let data = match load_store(cli.command.snapshot(), cli.config.as_deref()) {
        Ok(data) => data,
        Err(code) => return code,
    };
    match execute(&cli.command, &data) {
        Ok(output) => {
            let json = serde_json::to_string_pretty(&output)
                .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize output: {}\"}}", e));
            println!("{}", json);
            0
        }
        Err(code) => code,
    }
}

fn load_store(snapshot: &Path, config: Option<&Path>) -> Result<StoreData, i32> {
    let config = match config {
        Some(path) => StoreConfig::load(path).map_err(|e| {
            eprintln!("Error: failed to load config '{}': {}", path.display(), e);
            EXIT_IO
        })?,
        None => StoreConfig::default(),
    };
    let text = std::fs::read_to_string(snapshot).map_err(|e| {
        eprintln!("Error: failed to read snapshot '{}': {}", snapshot.display(), e);
        EXIT_IO
    })?;
    let data = StoreData::from_json(&text, config).map_err(|e| {
        eprintln!("Error: failed to parse snapshot '{}': {}", snapshot.display(), e);
        EXIT_IO
    })?;
    info!(snapshot = %snapshot.display(), "loaded snapshot");
    Ok(data)
}

fn execute(command: &Commands, data: &StoreData) -> Result<Value, i32> {
    match command {
        Commands::Inspect { .. } => {
            let snapshot = data.snapshot();
            Ok(json!({
                "stats": data.stats(),
                "rootCalls": snapshot.root_call_map,
                "cachedRootCalls": snapshot.cached_root_call_map,
            }))
        }
        Commands::Record { id, .. } => record(data, &DataId::from(id.as_str())),
        Commands::Range {
            connection,
            first,
            last,
            after,
            before,
            ..
        } => {
            let mut calls = Vec::new();
            if let Some(first) = first {
                calls.push(Call::new(connection::FIRST, *first));
            }
            if let Some(last) = last {
                calls.push(Call::new(connection::LAST, *last));
            }
            if let Some(after) = after {
                calls.push(Call::new(connection::AFTER, after.as_str()));
            }
            if let Some(before) = before {
                calls.push(Call::new(connection::BEFORE, before.as_str()));
            }
            range(data, &DataId::from(connection.as_str()), &calls)
        }
        Commands::Lookup { storage_key, arg, .. } => {
            match data.queued_store().get_data_id(storage_key, arg.as_deref()) {
                Some(id) => Ok(json!({ "storageKey": storage_key, "arg": arg, "id": id })),
                None => {
                    eprintln!("Error: no record for root call '{}'", storage_key);
                    Err(EXIT_NOT_FOUND)
                }
            }
        }
    }
}

fn record(data: &StoreData, id: &DataId) -> Result<Value, i32> {
    let store = data.queued_store();
    let state = store.get_record_state(id);
    let snapshot = data.snapshot();
    let tiers = [
        ("queued", &snapshot.queued_records),
        ("cached", &snapshot.cached_records),
        ("base", &snapshot.records),
    ];
    let mut held = serde_json::Map::new();
    for (name, tier) in tiers {
        if let Some(record) = tier.get(id) {
            held.insert(name.to_string(), serde_json::to_value(record).unwrap_or(Value::Null));
        }
    }
    if held.is_empty() {
        eprintln!("Error: record '{}' is unknown", id);
        return Err(EXIT_NOT_FOUND);
    }
    debug!(%id, tiers = held.len(), "record found");
    Ok(json!({
        "id": id,
        "state": state,
        "type": store.get_type(id),
        "optimistic": store.has_optimistic_update(id),
        "mutationIds": store.client_mutation_ids(id),
        "connections": store.get_connection_ids_for_node(id).unwrap_or_default(),
        "tiers": held,
    }))
}

fn range(data: &StoreData, connection_id: &DataId, calls: &[Call]) -> Result<Value, i32> {
    match data.queued_store().get_range_metadata(connection_id, calls) {
        Ok(Lookup::Found(metadata)) => Ok(json!(metadata)),
        Ok(Lookup::Null) => {
            eprintln!("Error: connection '{}' was deleted", connection_id);
            Err(EXIT_NOT_FOUND)
        }
        Ok(Lookup::Undefined) => {
            eprintln!("Error: '{}' has no range", connection_id);
            Err(EXIT_NOT_FOUND)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(EXIT_NOT_FOUND)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use relay_core::{QueryField, QueryIdGenerator, QueryRoot};

    fn snapshot_file() -> tempfile::NamedTempFile {
        let query = QueryRoot::builder("viewer")
            .type_name("Viewer")
            .child(
                QueryField::builder("actor")
                    .type_name("User")
                    .child(QueryField::id())
                    .child(QueryField::scalar("name"))
                    .build(),
            )
            .build_with(&QueryIdGenerator::new());
        let payload = json!({"viewer": {"actor": {"id": "4", "name": "Zuck"}}});
        let mut data = StoreData::default();
        data.handle_query_payload(&query, payload.as_object().unwrap(), None)
            .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data.to_json().unwrap().as_bytes()).unwrap();
        file
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("relay").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn lookup_resolves_root_calls() {
        let file = snapshot_file();
        let path = file.path().to_str().unwrap();
        let cli = cli(&["lookup", path, "viewer"]);
        let data = load_store(cli.command.snapshot(), None).unwrap();
        let output = execute(&cli.command, &data).unwrap();
        assert_eq!(output["id"], json!("client:0"));
    }

    #[test]
    fn records_report_their_tiers() {
        let file = snapshot_file();
        let path = file.path().to_str().unwrap();
        let cli = cli(&["record", path, "4"]);
        let data = load_store(cli.command.snapshot(), None).unwrap();
        let output = execute(&cli.command, &data).unwrap();
        assert_eq!(output["type"], json!("User"));
        assert!(output["tiers"].get("base").is_some());
        assert!(output["tiers"].get("queued").is_none());
    }

    #[test]
    fn unknown_ids_and_files_have_distinct_exit_codes() {
        let file = snapshot_file();
        let path = file.path().to_str().unwrap();
        assert_eq!(run(&cli(&["record", path, "404"])), EXIT_NOT_FOUND);
        assert_eq!(run(&cli(&["lookup", path, "nobody"])), EXIT_NOT_FOUND);
        assert_eq!(run(&cli(&["inspect", "/nonexistent/snapshot.json"])), EXIT_IO);
    }

    #[test]
    fn first_and_last_conflict() {
        let parsed = Cli::try_parse_from(["relay", "range", "s.json", "client:1", "--first", "2", "--last", "2"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn config_files_are_applied() {
        let file = snapshot_file();
        let mut config = tempfile::NamedTempFile::new().unwrap();
        config.write_all(br#"{"initialForceIndex": 9}"#).unwrap();
        let mut data = load_store(file.path(), Some(config.path())).unwrap();
        assert_eq!(data.next_force_index(), 9);
        assert!(data.config().write_through_cache);
    }
}
