//! CLI interface for the LSH index

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lsh_search::persistence::SnapshotManager;
use lsh_search::{IndexConfig, LshIndex, MemoryStore, Record, Vector};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lsh-search")]
#[command(about = "Approximate nearest-neighbor search with locality-sensitive hashing", long_about = None)]
struct Cli {
    /// Directory holding the saved index
    #[arg(long, default_value = "lsh-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty index with freshly sampled hyperplanes
    Init {
        /// JSON index configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Replace an index that already exists in the data directory
        #[arg(long)]
        force: bool,
    },
    /// Replace the indexed records with the contents of a JSON file
    Train {
        /// JSON array of {"id": ..., "vector": [...]} records
        records: PathBuf,
    },
    /// Search for records close to a query vector
    Search {
        /// Query vector as comma-separated values (e.g., "1.0,2.0,3.0")
        query: String,
    },
    /// Write the hasher state to a file
    DumpHasher {
        /// Output file
        out: PathBuf,
    },
    /// Replace the hasher state with one read from a file
    LoadHasher {
        /// Input file written by dump-hasher
        from: PathBuf,
    },
    /// Start the HTTP API server
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: String,
    },
}

fn open_index(snapshots: &SnapshotManager) -> Result<LshIndex<MemoryStore>> {
    match snapshots.open()? {
        Some(index) => Ok(index),
        None => bail!(
            "no index in {}; run `lsh-search init --config <file>` first",
            snapshots.dir().display()
        ),
    }
}

fn run(snapshots: SnapshotManager, command: Commands) -> Result<()> {
    match command {
        Commands::Init { config, force } => {
            if snapshots.exists() && !force {
                bail!(
                    "an index already exists in {}; pass --force to replace it",
                    snapshots.dir().display()
                );
            }
            let config = IndexConfig::from_json_file(&config)
                .with_context(|| format!("reading config {}", config.display()))?;
            let index = LshIndex::new(config, MemoryStore::new())?;
            snapshots.save(&index)?;
            println!(
                "Initialized index with {} permutations in {}",
                index.hasher().n_permutations(),
                snapshots.dir().display()
            );
        }
        Commands::Train { records } => {
            let index = open_index(&snapshots)?;
            let bytes = fs::read(&records)
                .with_context(|| format!("reading records {}", records.display()))?;
            let records: Vec<Record> = serde_json::from_slice(&bytes)?;
            index.train(&records)?;
            snapshots.save(&index)?;
            println!("Trained index with {} records", records.len());
        }
        Commands::Search { query } => {
            let index = open_index(&snapshots)?;
            let q = Vector::from_str(&query)?;
            let results = index.search(&q)?;

            if results.is_empty() {
                println!("No neighbors found");
            } else {
                let metric = index.config().metric()?;
                println!("{} neighbors:", results.len());
                for (i, record) in results.iter().enumerate() {
                    let value = metric.distance(&record.vector, &q)?;
                    println!("{}. {} ({}: {:.4})", i + 1, record.id, metric, value);
                }
            }
        }
        Commands::DumpHasher { out } => {
            let index = open_index(&snapshots)?;
            fs::write(&out, index.dump_hasher()?)?;
            println!("Wrote hasher to {}", out.display());
        }
        Commands::LoadHasher { from } => {
            let mut index = open_index(&snapshots)?;
            index.load_hasher(&fs::read(&from)?)?;
            snapshots.save(&index)?;
            println!("Loaded hasher from {}", from.display());
        }
        Commands::Serve { .. } => {
            unreachable!("Serve handled separately");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let snapshots = SnapshotManager::new(&cli.data_dir)?;

    // Serve needs the async runtime; everything else is synchronous
    if let Commands::Serve { ref addr } = cli.command {
        let index = open_index(&snapshots)?;
        lsh_search::server::start(addr, index, Some(snapshots)).await?;
        return Ok(());
    }

    run(snapshots, cli.command)
}
