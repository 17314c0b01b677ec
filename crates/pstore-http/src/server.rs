// Path: crates/pstore-http/src/server.rs

//! The accept loop and per-connection state machine (§4.I "Server loop").
//! Each accepted connection runs its own cooperative wait/dispatch cycle;
//! the listener itself just accepts and hands off (§5 "single cooperative
//! thread per accepted connection ... and a single listener thread").

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pstore_channel::Registry as ChannelRegistry;
use pstore_io::BufferedReader;
use pstore_romfs::Romfs;
use pstore_types::{Error, Result};
use tracing::{info_span, warn};

use crate::dispatch::{self, CommandRegistry};
use crate::request::{parse_request, RequestInfo};
use crate::response::report_error;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ServerConfig {
    pub romfs: Romfs,
    pub commands: CommandRegistry,
    pub channels: Arc<ChannelRegistry>,
    pub version: (u16, u16),
}

/// Shared shutdown flag. The quit path (a loopback self-connect) lives in
/// the caller, which owns the listening socket; `run` only needs to see
/// the flag go high once that connect has forced `accept` to return.
#[derive(Default)]
pub struct Shutdown {
    flag: AtomicBool,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Accepts connections until `shutdown` is signalled, handling each on its
/// own thread.
pub fn run(listener: &TcpListener, config: &Arc<ServerConfig>, shutdown: &Arc<Shutdown>) -> Result<()> {
    while !shutdown.requested() {
        let (stream, addr) = listener.accept()?;
        if shutdown.requested() {
            break;
        }
        let config = Arc::clone(config);
        std::thread::spawn(move || {
            let span = info_span!("connection", peer = %addr);
            let _enter = span.enter();
            if let Err(err) = handle_connection(stream, &config) {
                warn!(error = %err, "connection ended with an error");
            }
        });
    }
    Ok(())
}

fn handle_connection(stream: TcpStream, config: &ServerConfig) -> Result<()> {
    stream.set_read_timeout(Some(CONNECTION_TIMEOUT))?;
    let mut read_half = stream.try_clone()?;
    let mut write_half = stream;

    let mut reader = BufferedReader::new(move |dest: &mut [u8]| match read_half.read(dest) {
        Ok(n) => Ok(n),
        Err(e) => Err(Error::from(e)),
    });

    let request = match parse_request(&mut reader) {
        Ok(request) => request,
        Err(e) => {
            let _ = write_half.write_all(&report_error(&e, now()));
            return Ok(());
        }
    };

    let (path, query) = dispatch::split_uri(&request.uri);

    if request.is_websocket_upgrade() {
        if let Err(e) = ws_loop::handle_websocket(&request, path, reader, &mut write_half, config) {
            // The upgrade itself failed (bad version, unknown channel, ...);
            // there is no live WS connection yet, so reply as plain HTTP.
            let _ = write_half.write_all(&report_error(&e, now()));
        }
        return Ok(());
    }

    if let Err(e) = dispatch_http(&request, path, query, config, &mut write_half) {
        let _ = write_half.write_all(&report_error(&e, now()));
    }
    Ok(())
}

fn dispatch_http(
    _request: &RequestInfo,
    path: &str,
    query: &str,
    config: &ServerConfig,
    stream: &mut TcpStream,
) -> Result<()> {
    let when = now();
    if let Some(name) = path.strip_prefix("/cmd/") {
        let params = dispatch::query_to_kvp(query);
        let response = config.commands.dispatch(name, &params, config.version)?;
        dispatch::serve_dynamic(&response, when, |chunk| stream.write_all(chunk).map_err(Error::from))
    } else {
        dispatch::serve_static(&config.romfs, path, when, |chunk| stream.write_all(chunk).map_err(Error::from))
    }
}

#[cfg(unix)]
mod ws_loop {
    use std::os::unix::io::AsRawFd;

    use pstore_channel::Subscriber;

    use super::{BufferedReader, Error, RequestInfo, Result, ServerConfig, TcpStream, Write, CONNECTION_TIMEOUT};
    use crate::ws::frame::{self, close_code, Opcode};
    use crate::ws::{self, Delivered, Reassembler};

    enum Activity {
        Socket,
        Wake,
        Both,
        Timeout,
    }

    fn wait_for_activity(
        socket_fd: libc::c_int,
        wake_fd: libc::c_int,
        timeout: std::time::Duration,
    ) -> Result<Activity> {
        let mut fds = [
            libc::pollfd { fd: socket_fd, events: libc::POLLIN, revents: 0 },
            libc::pollfd { fd: wake_fd, events: libc::POLLIN, revents: 0 },
        ];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        loop {
            // SAFETY: `fds` is a valid two-element array for the duration of the call.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
            if rc < 0 {
                let e = std::io::Error::last_os_error();
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::from(e));
            }
            if rc == 0 {
                return Ok(Activity::Timeout);
            }
            let socket_ready = fds[0].revents & libc::POLLIN != 0;
            let wake_ready = fds[1].revents & libc::POLLIN != 0;
            return Ok(match (socket_ready, wake_ready) {
                (true, true) => Activity::Both,
                (true, false) => Activity::Socket,
                (false, true) => Activity::Wake,
                (false, false) => Activity::Timeout,
            });
        }
    }

    fn drain_subscriber(subscriber: &Subscriber, stream: &mut TcpStream) -> Result<()> {
        subscriber.reset();
        while let Some(message) = subscriber.pop() {
            stream.write_all(&frame::text_frame(&message)?)?;
        }
        Ok(())
    }

    /// Applies one received frame, replying (pong/echo/close) as needed.
    /// Returns `true` once the connection should close.
    fn handle_frame(frame: frame::Frame, reassembler: &mut Reassembler, stream: &mut TcpStream) -> Result<bool> {
        match frame.opcode {
            Opcode::Ping => {
                stream.write_all(&frame::pong_frame(&frame.payload)?)?;
                Ok(false)
            }
            Opcode::Pong => Ok(false),
            Opcode::Close => {
                let (code, _reason) =
                    frame::parse_close_payload(&frame.payload).unwrap_or_else(|code| (code, String::new()));
                let _ = stream.write_all(&frame::close_frame(code, "")?);
                Ok(true)
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => match reassembler.push(frame) {
                Ok(Delivered::Text(text)) => {
                    stream.write_all(&frame::text_frame(&text)?)?;
                    Ok(false)
                }
                Ok(Delivered::Binary(bytes)) => {
                    stream.write_all(&frame::write_frame(Opcode::Binary, &bytes)?)?;
                    Ok(false)
                }
                Ok(Delivered::None) => Ok(false),
                Err(failure) => {
                    let _ = stream.write_all(&frame::close_frame(failure.close_code(), "")?);
                    Ok(true)
                }
            },
        }
    }

    pub(super) fn handle_websocket<R>(
        request: &RequestInfo,
        path: &str,
        mut reader: BufferedReader<R>,
        stream: &mut TcpStream,
        config: &ServerConfig,
    ) -> Result<()>
    where
        R: pstore_io::Refiller,
    {
        let version = request.header("sec-websocket-version").ok_or(Error::BadWebsocketVersion)?;
        if version != ws::PROTOCOL_VERSION.to_string() {
            return Err(Error::BadWebsocketVersion);
        }
        let key = request.header("sec-websocket-key").ok_or(Error::BadRequest)?;

        let channel_name = path.trim_start_matches('/');
        let channel = config.channels.get(channel_name).ok_or(Error::Enoent)?;
        let subscriber = channel.new_subscriber()?;

        pstore_telemetry::metrics::inc_http_requests(101);
        stream.write_all(&ws::build_handshake_response(key))?;

        let mut reassembler = Reassembler::new();
        let socket_fd = stream.as_raw_fd();
        let wake_fd = subscriber.wait_descriptor();

        let result = (|| -> Result<()> {
            loop {
                if reader.available() == 0 {
                    match wait_for_activity(socket_fd, wake_fd, CONNECTION_TIMEOUT)? {
                        Activity::Wake => {
                            drain_subscriber(&subscriber, stream)?;
                            continue;
                        }
                        Activity::Timeout => {
                            let _ = stream.write_all(&frame::close_frame(close_code::NORMAL, "idle timeout")?);
                            return Ok(());
                        }
                        Activity::Socket | Activity::Both => {
                            drain_subscriber(&subscriber, stream)?;
                        }
                    }
                } else {
                    drain_subscriber(&subscriber, stream)?;
                }

                let frame = match frame::read_frame(&mut reader) {
                    Ok(frame) => frame,
                    Err(e) => {
                        let code = frame::close_code_for_error(&e);
                        let _ = stream.write_all(&frame::close_frame(code, "")?);
                        return Ok(());
                    }
                };
                if handle_frame(frame, &mut reassembler, stream)? {
                    return Ok(());
                }
            }
        })();

        channel.unsubscribe(subscriber.id());
        result
    }
}

#[cfg(not(unix))]
mod ws_loop {
    use super::{BufferedReader, Error, RequestInfo, Result, ServerConfig, TcpStream};

    pub(super) fn handle_websocket<R>(
        _request: &RequestInfo,
        _path: &str,
        _reader: BufferedReader<R>,
        _stream: &mut TcpStream,
        _config: &ServerConfig,
    ) -> Result<()>
    where
        R: pstore_io::Refiller,
    {
        Err(Error::NotImplemented)
    }
}
