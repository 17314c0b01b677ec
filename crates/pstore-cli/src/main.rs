// Path: crates/pstore-cli/src/main.rs

//! Minimal driver exercising the core store directly: open-or-create a
//! database file, put a key/value pair, or look one up, each in its own
//! transaction (spec §6, out of scope of the status server itself).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pstore_storage::{Database, HamtPolicy};
use pstore_types::{Error, Result};

#[derive(Parser)]
#[command(name = "pstore-cli", about = "Minimal driver for a pstore database")]
struct Cli {
    /// Path to the database file; created if it doesn't exist yet.
    #[arg(long, short = 'f')]
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a key/value pair and print the revision it was committed as.
    Put { key: String, value: String },
    /// Look up a key in the latest revision.
    Get { key: String },
}

struct StringPolicy;

impl HamtPolicy for StringPolicy {
    type Key = String;
    type Value = String;

    fn hash_key(key: &Self::Key) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn keys_equal(a: &Self::Key, b: &Self::Key) -> bool {
        a == b
    }

    fn encode_leaf(key: &Self::Key, value: &Self::Value) -> Vec<u8> {
        let key_bytes = key.as_bytes();
        let mut out = Vec::with_capacity(4 + key_bytes.len() + value.len());
        out.extend_from_slice(&(key_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(key_bytes);
        out.extend_from_slice(value.as_bytes());
        out
    }

    fn decode_leaf(bytes: &[u8]) -> Result<(Self::Key, Self::Value)> {
        if bytes.len() < 4 {
            return Err(Error::IndexCorrupt("leaf record too short".to_string()));
        }
        let key_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let rest = &bytes[4..];
        if rest.len() < key_len {
            return Err(Error::IndexCorrupt("leaf key length out of range".to_string()));
        }
        let key = String::from_utf8(rest[..key_len].to_vec())
            .map_err(|_| Error::IndexCorrupt("leaf key is not valid UTF-8".to_string()))?;
        let value = String::from_utf8(rest[key_len..].to_vec())
            .map_err(|_| Error::IndexCorrupt("leaf value is not valid UTF-8".to_string()))?;
        Ok((key, value))
    }
}

fn open_or_create(path: &std::path::Path) -> Result<Database> {
    match Database::open(path) {
        Ok(db) => Ok(db),
        Err(_) => Database::create(path),
    }
}

fn main() -> anyhow::Result<()> {
    pstore_telemetry::init_tracing()?;
    let cli = Cli::parse();
    let db = open_or_create(&cli.file)?;

    match cli.command {
        Command::Put { key, value } => {
            let mut tx = db.begin::<StringPolicy>()?;
            tx.insert_or_assign(key, value)?;
            let revision = tx.commit()?;
            println!("committed as revision {revision}");
        }
        Command::Get { key } => {
            let tx = db.begin::<StringPolicy>()?;
            match tx.find(&key)? {
                Some(value) => println!("{value}"),
                None => println!("(not found)"),
            }
            tx.rollback();
        }
    }
    Ok(())
}
