// Path: crates/pstore-http/src/dispatch.rs

//! Static (romfs) and dynamic (`/cmd/*`) content dispatch (§4.J).

use std::collections::BTreeMap;

use pstore_romfs::Romfs;
use pstore_types::{Error, Result};

use crate::http_date::http_date;
use crate::response::build_headers;
use crate::response::build_status_line;

const CHUNK_SIZE: usize = 1024;

#[must_use]
pub fn query_to_kvp(query: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        if !key.is_empty() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// Splits a request URI into its path and (possibly empty) query string.
#[must_use]
pub fn split_uri(uri: &str) -> (&str, &str) {
    match uri.split_once('?') {
        Some((path, query)) => (path, query),
        None => (uri, ""),
    }
}

#[derive(Debug)]
pub struct DynamicResponse {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Boxed rather than a bare `fn` pointer so a command can close over server
/// state (e.g. `quit` closing over a [`crate::server::Shutdown`] handle).
pub type DynamicCommand = Box<dyn Fn(&BTreeMap<String, String>, (u16, u16)) -> Result<DynamicResponse> + Send + Sync>;

fn cmd_version(_params: &BTreeMap<String, String>, version: (u16, u16)) -> Result<DynamicResponse> {
    let body = format!("{{\"version\":\"{}.{}\"}}", version.0, version.1);
    Ok(DynamicResponse { content_type: "application/json", body: body.into_bytes() })
}

fn cmd_metrics(_params: &BTreeMap<String, String>, _version: (u16, u16)) -> Result<DynamicResponse> {
    Ok(DynamicResponse {
        content_type: "text/plain; version=0.0.4",
        body: pstore_telemetry::metrics::gather_metrics_text().into_bytes(),
    })
}

/// The sorted associative container of dynamic commands (§4.J); `version`
/// is the one the spec requires out of the box.
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, DynamicCommand>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CommandRegistry {
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut commands: BTreeMap<&'static str, DynamicCommand> = BTreeMap::new();
        commands.insert("version", Box::new(cmd_version));
        commands.insert("metrics", Box::new(cmd_metrics));
        Self { commands }
    }

    pub fn register<F>(&mut self, name: &'static str, command: F)
    where
        F: Fn(&BTreeMap<String, String>, (u16, u16)) -> Result<DynamicResponse> + Send + Sync + 'static,
    {
        self.commands.insert(name, Box::new(command));
    }

    pub fn dispatch(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
        version: (u16, u16),
    ) -> Result<DynamicResponse> {
        let command = self.commands.get(name).ok_or(Error::BadRequest)?;
        command(params, version)
    }
}

fn media_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// `/` becomes `/index.html`; a path ending in `/` has `index.html`
/// appended (§4.J).
#[must_use]
pub fn resolve_static_path(path: &str) -> String {
    let path = if path.is_empty() { "/" } else { path };
    if path.ends_with('/') {
        format!("{path}index.html")
    } else {
        path.to_string()
    }
}

/// Writes a `200 OK` response for the romfs file at `path`: status line,
/// headers (`Content-length`/`Content-type`/`Last-Modified` from the
/// file's own stat), then the body in 1 KiB chunks (§4.J).
pub fn serve_static<W>(romfs: &Romfs, path: &str, now: u64, mut write: W) -> Result<()>
where
    W: FnMut(&[u8]) -> Result<()>,
{
    let resolved = resolve_static_path(path);
    let stat = romfs.stat(&resolved)?;
    let mut file = romfs.open(&resolved)?;

    let headers = vec![
        ("Content-length".to_string(), stat.size.to_string()),
        ("Content-type".to_string(), media_type_for(&resolved).to_string()),
        ("Connection".to_string(), "close".to_string()),
        ("Date".to_string(), http_date(now)),
        ("Last-Modified".to_string(), http_date(stat.mtime)),
    ];
    pstore_telemetry::metrics::inc_http_requests(200);
    write(build_status_line(200, "OK").as_bytes())?;
    write(build_headers(&headers).as_bytes())?;

    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut chunk);
        if n == 0 {
            break;
        }
        write(&chunk[..n])?;
    }
    Ok(())
}

/// Writes the `200 OK` JSON response for a resolved dynamic command.
pub fn serve_dynamic<W>(response: &DynamicResponse, now: u64, mut write: W) -> Result<()>
where
    W: FnMut(&[u8]) -> Result<()>,
{
    let headers = vec![
        ("Content-length".to_string(), response.body.len().to_string()),
        ("Content-type".to_string(), response.content_type.to_string()),
        ("Connection".to_string(), "close".to_string()),
        ("Date".to_string(), http_date(now)),
    ];
    pstore_telemetry::metrics::inc_http_requests(200);
    write(build_status_line(200, "OK").as_bytes())?;
    write(build_headers(&headers).as_bytes())?;
    write(&response.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_to_kvp_parses_ampersand_separated_pairs() {
        let kvp = query_to_kvp("a=1&b=2&c=");
        assert_eq!(kvp.get("a"), Some(&"1".to_string()));
        assert_eq!(kvp.get("b"), Some(&"2".to_string()));
        assert_eq!(kvp.get("c"), Some(&String::new()));
    }

    #[test]
    fn split_uri_separates_path_and_query() {
        assert_eq!(split_uri("/cmd/version?x=1"), ("/cmd/version", "x=1"));
        assert_eq!(split_uri("/cmd/version"), ("/cmd/version", ""));
    }

    #[test]
    fn resolve_static_path_appends_index_html() {
        assert_eq!(resolve_static_path(""), "/index.html");
        assert_eq!(resolve_static_path("/"), "/index.html");
        assert_eq!(resolve_static_path("/css/"), "/css/index.html");
        assert_eq!(resolve_static_path("/status.js"), "/status.js");
    }

    #[test]
    fn version_command_reports_the_given_version() {
        let registry = CommandRegistry::with_defaults();
        let response = registry.dispatch("version", &BTreeMap::new(), (1, 0)).unwrap();
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, br#"{"version":"1.0"}"#);
    }

    #[test]
    fn metrics_command_reports_prometheus_text() {
        let registry = CommandRegistry::with_defaults();
        let response = registry.dispatch("metrics", &BTreeMap::new(), (1, 0)).unwrap();
        assert!(response.content_type.starts_with("text/plain"));
    }

    #[test]
    fn register_accepts_a_closure_that_captures_state() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag_for_command = flag.clone();
        let mut registry = CommandRegistry::with_defaults();
        registry.register("quit", move |_params, _version| {
            flag_for_command.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(DynamicResponse { content_type: "application/json", body: b"{}".to_vec() })
        });
        registry.dispatch("quit", &BTreeMap::new(), (1, 0)).unwrap();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn unknown_command_is_bad_request() {
        let registry = CommandRegistry::with_defaults();
        assert_eq!(registry.dispatch("nope", &BTreeMap::new(), (1, 0)).unwrap_err(), Error::BadRequest);
    }

    #[test]
    fn serve_static_streams_the_romfs_file_in_chunks() {
        let romfs = Romfs::new();
        let mut expected = Vec::new();
        let mut f = romfs.open("/status.js").unwrap();
        let mut buf = [0u8; 4096];
        loop {
            let n = f.read(&mut buf);
            if n == 0 {
                break;
            }
            expected.extend_from_slice(&buf[..n]);
        }

        let mut out = Vec::new();
        serve_static(&romfs, "/status.js", 0, |chunk| {
            out.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();
        let body_start = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(&out[body_start..], expected.as_slice());
    }

    #[test]
    fn serve_static_missing_file_is_enoent() {
        let romfs = Romfs::new();
        let err = serve_static(&romfs, "/nope.txt", 0, |_| Ok(())).unwrap_err();
        assert_eq!(err, Error::Enoent);
    }
}
