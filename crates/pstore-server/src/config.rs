// Path: crates/pstore-server/src/config.rs

//! Configuration: an optional TOML file layered under CLI flags/env vars
//! (teacher pattern: `node/src/bin/guardian.rs` reads a `guardian.toml`
//! and overlays `--listen-addr`/`GUARDIAN_LISTEN_ADDR` on top of it).

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ANNOUNCE_INTERVAL_SECS: u64 = 2;

#[derive(Parser, Debug)]
#[command(name = "pstore-server", about = "pstore status server")]
pub struct Opts {
    /// Path to an optional TOML config file; CLI flags and env vars win
    /// over anything it sets.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// TCP port the status server listens on.
    #[arg(long, short = 'p', alias = "listen-port", env = "PSTORE_PORT")]
    pub port: Option<u16>,

    /// Path to the database file; created if it doesn't exist yet.
    #[arg(long = "store", env = "PSTORE_STORE")]
    pub store_path: Option<PathBuf>,

    /// How often the background task publishes a status blob on the
    /// `status` channel.
    #[arg(long, env = "PSTORE_ANNOUNCE_INTERVAL_SECS")]
    pub announce_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    port: Option<u16>,
    store_path: Option<PathBuf>,
    announce_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_path: PathBuf,
    pub announce_interval_secs: u64,
}

impl Config {
    pub fn load(opts: &Opts) -> anyhow::Result<Self> {
        let file = match &opts.config {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => FileConfig::default(),
        };
        let store_path = opts
            .store_path
            .clone()
            .or(file.store_path)
            .ok_or_else(|| anyhow::anyhow!("a store path is required (--store or config file)"))?;
        Ok(Config {
            port: opts.port.or(file.port).unwrap_or(DEFAULT_PORT),
            store_path,
            announce_interval_secs: opts
                .announce_interval_secs
                .or(file.announce_interval_secs)
                .unwrap_or(DEFAULT_ANNOUNCE_INTERVAL_SECS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_win_over_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("pstore.toml");
        std::fs::write(&config_path, "port = 9000\nstore_path = \"from-file.db\"\n").unwrap();

        let opts = Opts {
            config: Some(config_path),
            port: Some(1234),
            store_path: None,
            announce_interval_secs: None,
        };
        let config = Config::load(&opts).unwrap();
        assert_eq!(config.port, 1234);
        assert_eq!(config.store_path, PathBuf::from("from-file.db"));
        assert_eq!(config.announce_interval_secs, DEFAULT_ANNOUNCE_INTERVAL_SECS);
    }

    #[test]
    fn missing_store_path_is_an_error() {
        let opts = Opts { config: None, port: None, store_path: None, announce_interval_secs: None };
        assert!(Config::load(&opts).is_err());
    }
}
