// Path: crates/pstore-server/src/main.rs

//! The status server binary: opens the store, builds the romfs/dispatch
//! table, and runs the HTTP/WebSocket accept loop (§4.I, §6). A background
//! thread publishes a status blob on the `status` channel every
//! `announce_interval_secs`; `GET /cmd/quit` triggers the self-connect
//! shutdown described in §4.I's cancellation note.

mod config;

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use pstore_channel::Registry as ChannelRegistry;
use pstore_http::{run, CommandRegistry, DynamicResponse, ServerConfig, Shutdown};
use pstore_romfs::Romfs;
use pstore_storage::Database;
use tracing::{info, warn};

use config::{Config, Opts};

const VERSION: (u16, u16) = (0, 1);

fn open_or_create(path: &std::path::Path) -> pstore_types::Result<Database> {
    match Database::open(path) {
        Ok(db) => Ok(db),
        Err(_) => Database::create(path),
    }
}

fn status_blob(uptime: Duration, uuid: &str, channels: &ChannelRegistry) -> String {
    let mut clients = String::new();
    for (name, count) in channels.snapshot() {
        if !clients.is_empty() {
            clients.push(',');
        }
        clients.push_str(&format!("\"{name}\":{count}"));
    }
    format!(
        "{{\"uptime_secs\":{},\"uuid\":\"{uuid}\",\"clients\":{{{clients}}}}}",
        uptime.as_secs()
    )
}

fn spawn_status_broadcast(
    channels: Arc<ChannelRegistry>,
    uuid: String,
    interval: Duration,
    shutdown: Arc<Shutdown>,
) {
    std::thread::spawn(move || {
        let started = Instant::now();
        let status = match channels.get_or_create("status") {
            Ok(channel) => channel,
            Err(err) => {
                warn!(error = %err, "failed to create status channel, announcements disabled");
                return;
            }
        };
        while !shutdown.requested() {
            std::thread::sleep(interval);
            status.publish(&status_blob(started.elapsed(), &uuid, &channels));
        }
    });
}

fn main() -> anyhow::Result<()> {
    pstore_telemetry::init_tracing()?;
    pstore_telemetry::metrics::install()?;

    let opts = Opts::parse();
    let config = Config::load(&opts)?;

    let db = open_or_create(&config.store_path)?;
    let uuid = db.uuid().to_string();
    info!(store = %config.store_path.display(), uuid = %uuid, "opened database");

    let listener = TcpListener::bind(("127.0.0.1", config.port))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "status server listening");

    let channels = Arc::new(ChannelRegistry::new());
    let shutdown = Arc::new(Shutdown::new());

    let mut commands = CommandRegistry::with_defaults();
    let shutdown_for_quit = Arc::clone(&shutdown);
    commands.register("quit", move |_params, _version| {
        shutdown_for_quit.signal();
        let _ = TcpStream::connect(local_addr);
        Ok(DynamicResponse {
            content_type: "application/json",
            body: br#"{"status":"closing"}"#.to_vec(),
        })
    });

    let server_config = Arc::new(ServerConfig {
        romfs: Romfs::new(),
        commands,
        channels: Arc::clone(&channels),
        version: VERSION,
    });

    spawn_status_broadcast(
        Arc::clone(&channels),
        uuid,
        Duration::from_secs(config.announce_interval_secs),
        Arc::clone(&shutdown),
    );

    run(&listener, &server_config, &shutdown)?;
    info!("status server shut down");
    Ok(())
}
