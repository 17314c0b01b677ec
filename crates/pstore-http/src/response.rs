// Path: crates/pstore-http/src/response.rs

//! Response line/header building and error-page rendering (§4.H).

use pstore_types::Error;

use crate::http_date::http_date;
use crate::wrap::wrap_text;

const WRAP_WIDTH: usize = 72;

#[must_use]
pub fn status_text(code: u16) -> &'static str {
    match code {
        101 => "Switching Protocols",
        400 => "Bad Request",
        404 => "Not Found",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Internal Server Error",
    }
}

#[must_use]
pub fn build_status_line(code: u16, text: &str) -> String {
    format!("HTTP/1.1 {code} {text}\r\n")
}

/// Emits `Name: Value\r\n` for every header in `headers`, then the
/// `Server` header and the blank-line terminator (§4.H `build_headers`).
#[must_use]
pub fn build_headers(headers: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("Server: pstore-http\r\n\r\n");
    out
}

/// Composes a short HTML error document and the full set of headers it
/// needs (`Content-length`, `Content-type`, `Connection: close`, `Date`,
/// `Last-Modified`), returning the complete response bytes.
#[must_use]
pub fn send_error_page(code: u16, long_message: &str, cause: Option<&str>, now: u64) -> Vec<u8> {
    let text = status_text(code);
    let wrapped = wrap_text(long_message, WRAP_WIDTH).join("\n");
    let cause_html = cause.map_or(String::new(), |c| format!("<p>Cause: {c}</p>\n"));
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {text}</title></head>\n\
         <body><h1>{code} {text}</h1>\n<pre>{wrapped}</pre>\n{cause_html}</body></html>\n"
    );
    let headers = vec![
        ("Content-length".to_string(), body.len().to_string()),
        ("Content-type".to_string(), "text/html".to_string()),
        ("Connection".to_string(), "close".to_string()),
        ("Date".to_string(), http_date(now)),
        ("Last-Modified".to_string(), http_date(now)),
    ];
    let mut out = build_status_line(code, text).into_bytes();
    out.extend_from_slice(build_headers(&headers).as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}

/// Maps an [`Error`] to the HTTP status (and any extra headers) §4.H
/// `report_error` specifies, and builds the resulting error page.
#[must_use]
pub fn report_error(err: &Error, now: u64) -> Vec<u8> {
    let (code, page) = match err {
        Error::BadRequest => (400, send_error_page(400, "The request could not be understood.", None, now)),
        Error::Enoent | Error::Enotdir => {
            (404, send_error_page(404, "The requested resource was not found.", Some(&err.to_string()), now))
        }
        Error::BadWebsocketVersion => {
            let body = send_error_page(
                426,
                "This server only supports WebSocket protocol version 13.",
                None,
                now,
            );
            (426, inject_header(body, "Sec-WebSocket-Version", "13"))
        }
        Error::NotImplemented => (501, send_error_page(501, "This method is not implemented.", None, now)),
        other => (500, send_error_page(500, "An internal error occurred.", Some(&other.to_string()), now)),
    };
    pstore_telemetry::metrics::inc_http_requests(code);
    page
}

/// Splices an extra header line in just before the blank line terminating
/// the header block. Used only for the one response (426) that needs a
/// header `send_error_page` doesn't know about.
fn inject_header(mut response: Vec<u8>, name: &str, value: &str) -> Vec<u8> {
    let marker = b"\r\n\r\n";
    if let Some(pos) = response.windows(4).position(|w| w == marker) {
        let mut line = format!("{name}: {value}\r\n").into_bytes();
        line.extend_from_slice(&response[pos + 2..]);
        response.truncate(pos + 2);
        response.extend_from_slice(&line);
    }
    response
}
