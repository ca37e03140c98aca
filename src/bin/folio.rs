//! Folio CLI
//!
//! Command-line interface for operating on a Folio store.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use folio::document::into_document;
use folio::{CollectionConfig, Config, Engine, Query, Row};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// Folio CLI
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Embedded JSON document store with WAL and snapshots")]
#[command(version)]
struct Args {
    /// Primary database file (collection files are written next to it)
    #[arg(short, long, default_value = "./folio_data/folio.json")]
    db: PathBuf,

    /// WAL file (defaults to <dir>/wal/<basename>.wal.log)
    #[arg(short, long)]
    wal: Option<PathBuf>,

    /// Commits between flushes
    #[arg(short = 'n', long, default_value = "100")]
    max_writes: usize,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert a record, print its id
    Insert {
        collection: String,
        /// Record as a JSON object
        record: String,
    },

    /// Print matching records
    Find {
        collection: String,
        /// Query as a JSON object (default: match all)
        query: Option<String>,
    },

    /// Print the number of matching records
    Count {
        collection: String,
        query: Option<String>,
    },

    /// Print N random matching records
    Sample {
        collection: String,
        n: usize,
        query: Option<String>,
    },

    /// Merge fields into the first matching record
    Update {
        collection: String,
        query: String,
        fields: String,
    },

    /// Update the first match or insert the record
    Upsert {
        collection: String,
        query: String,
        record: String,
    },

    /// Delete matching records
    Delete {
        collection: String,
        query: String,
        /// Delete every match instead of the first
        #[arg(long)]
        all: bool,
    },

    /// Empty a collection
    Drop { collection: String },

    /// Empty the whole store
    Clear,

    /// Declare primary/secondary key fields of a collection
    Configure {
        collection: String,
        pk: String,
        sk: Option<String>,
    },

    /// Snapshot everything and truncate the WAL
    Flush,

    /// Print every collection
    Dump,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.verbose { "info,folio=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> folio::Result<()> {
    let mut builder = Config::builder()
        .db_path(&args.db)
        .max_writes_before_flush(args.max_writes);
    if let Some(wal) = &args.wal {
        builder = builder.wal_path(wal);
    }

    let engine = Engine::open(builder.build())?;
    let recovery = engine.last_recovery();
    if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
        tracing::info!(
            "Recovered {} WAL entries ({} skipped)",
            recovery.entries_recovered,
            recovery.entries_corrupted
        );
    }

    let outcome = execute(&engine, args.command);
    engine.shutdown()?;
    outcome
}

fn execute(engine: &Engine, command: Commands) -> folio::Result<()> {
    match command {
        Commands::Insert { collection, record } => {
            let id = engine.insert_one(&collection, parse_document(&record)?)?;
            println!("{}", id);
        }
        Commands::Find { collection, query } => {
            let rows = engine.find(&collection, &parse_query(query.as_deref())?);
            print_json(&rows)?;
        }
        Commands::Count { collection, query } => {
            println!("{}", engine.count(&collection, &parse_query(query.as_deref())?));
        }
        Commands::Sample {
            collection,
            n,
            query,
        } => {
            let rows: Vec<Option<Row>> =
                engine.sample(&collection, &parse_query(query.as_deref())?, n);
            print_json(&rows)?;
        }
        Commands::Update {
            collection,
            query,
            fields,
        } => {
            let updated =
                engine.update_one(&collection, &parse_query(Some(query.as_str()))?, parse_document(&fields)?)?;
            println!("{}", if updated { "updated" } else { "not found" });
        }
        Commands::Upsert {
            collection,
            query,
            record,
        } => {
            let id = engine.upsert(&collection, &parse_query(Some(query.as_str()))?, parse_document(&record)?)?;
            println!("{}", id);
        }
        Commands::Delete {
            collection,
            query,
            all,
        } => {
            let query = parse_query(Some(query.as_str()))?;
            let deleted = if all {
                engine.delete_many(&collection, &query)?
            } else {
                usize::from(engine.delete_one(&collection, &query)?)
            };
            println!("{}", deleted);
        }
        Commands::Drop { collection } => engine.drop_collection(&collection)?,
        Commands::Clear => engine.clear()?,
        Commands::Configure { collection, pk, sk } => {
            let mut config = CollectionConfig::new(pk);
            if let Some(sk) = sk {
                config = config.with_sk(sk);
            }
            engine.configure(&collection, config)?;
        }
        Commands::Flush => engine.flush()?,
        Commands::Dump => print_json(&engine.get_data())?,
    }
    Ok(())
}

fn parse_document(text: &str) -> folio::Result<folio::Document> {
    let value: Value = serde_json::from_str(text)?;
    into_document(value)
}

fn parse_query(text: Option<&str>) -> folio::Result<Query> {
    match text {
        Some(text) => Ok(Query::from(parse_document(text)?)),
        None => Ok(Query::all()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> folio::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
