use std::fs;

use clap::{Parser, Subcommand};
use depot_store::{digest, FileStore, HashIndex, StoreConfig};

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Depot file store admin CLI")]
struct Cli {
    /// Storage root holding the uploaded files
    #[arg(long, default_value = depot_store::DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Directory holding the metadata record file
    #[arg(long, default_value = depot_store::DEFAULT_METADATA_DIR)]
    metadata_dir: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all stored files
    List,
    /// Find the stored file matching a content hash
    Find {
        /// Content hash to look up
        hash: String,
    },
    /// Cross-check the hash index against the files on disk
    Verify,
    /// Count words across all stored files
    WordCount,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let store = FileStore::open(StoreConfig::new(&cli.data_dir, &cli.metadata_dir)?)?;

    match cli.command {
        Some(Commands::List) => {
            let files = store.list()?;
            if files.is_empty() {
                println!("No files stored.");
            } else {
                for file in files {
                    println!("{}", file);
                }
            }
        }
        Some(Commands::Find { hash }) => match store.find_match(&hash) {
            Some(name) => println!("{}", name),
            None => println!("unmatched"),
        },
        Some(Commands::WordCount) => {
            println!("{}", store.word_count()?);
        }
        Some(Commands::Verify) => {
            verify(&store)?;
        }
        None => {
            println!("Use 'depot --help' for commands");
        }
    }

    Ok(())
}

/// Reports index records without a file, files without a record, and
/// sha-256 records whose digest no longer matches the content on disk.
/// Records carrying a caller-supplied hash that is not sha-256 hex are
/// counted but cannot be checked against content.
fn verify(store: &FileStore) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot: HashIndex = store.snapshot();
    let mut problems = 0usize;
    let mut unverifiable = 0usize;

    for record in snapshot.records() {
        let path = store.data_dir().join(&record.file_name);
        if !path.is_file() {
            println!("missing file for record '{}'", record.file_name);
            problems += 1;
            continue;
        }
        if !looks_like_sha256(&record.hash) {
            unverifiable += 1;
            continue;
        }
        let mut file = fs::File::open(&path)?;
        let on_disk = digest::hash_reader(&mut file)?;
        if on_disk != record.hash {
            println!(
                "hash mismatch for '{}': index has {}, disk has {}",
                record.file_name, record.hash, on_disk
            );
            problems += 1;
        }
    }

    for file in store.list()? {
        if snapshot.hash_for(&file).is_none() {
            println!("no index record for stored file '{}'", file);
            problems += 1;
        }
    }

    if problems > 0 {
        return Err(format!("found {problems} problem(s)").into());
    }
    println!(
        "Verified {} record(s), {} with caller-supplied hashes left unchecked.",
        snapshot.len(),
        unverifiable
    );
    Ok(())
}

fn looks_like_sha256(hash: &str) -> bool {
    hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}
