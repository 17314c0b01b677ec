// Path: crates/pstore-http/src/request.rs

//! Request-line and header parsing (§4.H steps 1-3): `METHOD SP URI SP
//! VERSION`, only `GET` accepted, then `Name: Value` headers (case-folded
//! to lower) until a blank line.

use std::collections::BTreeMap;

use pstore_io::{BufferedReader, Refiller};
use pstore_types::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: BTreeMap<String, String>,
}

impl RequestInfo {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade").is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
            && self
                .header("connection")
                .is_some_and(|v| v.to_ascii_lowercase().split(',').any(|tok| tok.trim() == "upgrade"))
    }
}

pub fn parse_request<R: Refiller>(reader: &mut BufferedReader<R>) -> Result<RequestInfo> {
    let request_line = reader.gets()?;
    let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
    let method = parts.next().ok_or(Error::BadRequest)?.to_string();
    let uri = parts.next().ok_or(Error::BadRequest)?.to_string();
    let version = parts.next().ok_or(Error::BadRequest)?.to_string();
    if parts.next().is_some() {
        return Err(Error::BadRequest);
    }
    if method != "GET" {
        return Err(Error::NotImplemented);
    }

    let mut headers = BTreeMap::new();
    loop {
        let line = reader.gets()?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or(Error::BadRequest)?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(RequestInfo { method, uri, version, headers })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(data: &'static [u8]) -> BufferedReader<impl Refiller> {
        use std::cell::RefCell;
        let remaining = RefCell::new(data);
        BufferedReader::new(move |dest: &mut [u8]| {
            let mut src = remaining.borrow_mut();
            let n = src.len().min(dest.len());
            dest[..n].copy_from_slice(&src[..n]);
            *src = &src[n..];
            Ok(n)
        })
    }

    #[test]
    fn parses_method_uri_version_and_headers() {
        let mut r = reader_over(b"GET /cmd/version HTTP/1.1\r\nHost: x\r\nAccept: */*\r\n\r\n");
        let req = parse_request(&mut r).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.uri, "/cmd/version");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("host"), Some("x"));
        assert_eq!(req.header("accept"), Some("*/*"));
    }

    #[test]
    fn non_get_method_is_not_implemented() {
        let mut r = reader_over(b"POST / HTTP/1.1\r\n\r\n");
        assert_eq!(parse_request(&mut r).unwrap_err(), Error::NotImplemented);
    }

    #[test]
    fn malformed_request_line_is_bad_request() {
        let mut r = reader_over(b"GET /\r\n\r\n");
        assert_eq!(parse_request(&mut r).unwrap_err(), Error::BadRequest);
    }

    #[test]
    fn websocket_upgrade_is_detected() {
        let mut r = reader_over(
            b"GET /status HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
        );
        let req = parse_request(&mut r).unwrap();
        assert!(req.is_websocket_upgrade());
    }
}
