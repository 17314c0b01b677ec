// Path: crates/pstore-http/src/ws/mod.rs

//! WebSocket framing, handshake, and message reassembly (§4.I).

pub mod frame;
pub mod handshake;

pub use frame::{close_code, close_code_for_error, is_valid_close_code, parse_close_payload, Frame, Opcode};
pub use handshake::accept_key;

use crate::response::{build_headers, build_status_line};

pub const PROTOCOL_VERSION: u16 = 13;

/// Builds the `101 Switching Protocols` response for an upgrade request
/// already validated as version 13.
#[must_use]
pub fn build_handshake_response(client_key: &str) -> Vec<u8> {
    let headers = vec![
        ("Upgrade".to_string(), "websocket".to_string()),
        ("Connection".to_string(), "Upgrade".to_string()),
        ("Sec-WebSocket-Accept".to_string(), accept_key(client_key)),
    ];
    let mut out = build_status_line(101, "Switching Protocols").into_bytes();
    out.extend_from_slice(build_headers(&headers).as_bytes());
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    None,
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyFailure {
    Protocol,
    InvalidUtf8,
}

impl ReassemblyFailure {
    #[must_use]
    pub fn close_code(self) -> u16 {
        match self {
            ReassemblyFailure::Protocol => close_code::PROTOCOL_ERROR,
            ReassemblyFailure::InvalidUtf8 => close_code::INVALID_PAYLOAD,
        }
    }
}

/// Accumulates a text/binary frame plus its continuations into a complete
/// message, enforcing §4.I's interleaving rules: no continuation without a
/// message in progress, no starting a new message while one is open.
#[derive(Default)]
pub struct Reassembler {
    in_progress: Option<(Opcode, Vec<u8>)>,
}

impl Reassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) -> Result<Delivered, ReassemblyFailure> {
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                if self.in_progress.is_some() {
                    return Err(ReassemblyFailure::Protocol);
                }
                self.in_progress = Some((frame.opcode, frame.payload));
            }
            Opcode::Continuation => match self.in_progress.as_mut() {
                Some((_, buf)) => buf.extend_from_slice(&frame.payload),
                None => return Err(ReassemblyFailure::Protocol),
            },
            Opcode::Close | Opcode::Ping | Opcode::Pong => {
                return Err(ReassemblyFailure::Protocol);
            }
        }

        if !frame.fin {
            return Ok(Delivered::None);
        }

        let Some((opcode, payload)) = self.in_progress.take() else {
            return Err(ReassemblyFailure::Protocol);
        };
        match opcode {
            Opcode::Text => match String::from_utf8(payload) {
                Ok(text) => Ok(Delivered::Text(text)),
                Err(_) => Err(ReassemblyFailure::InvalidUtf8),
            },
            _ => Ok(Delivered::Binary(payload)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fin: bool, opcode: Opcode, payload: &[u8]) -> Frame {
        Frame { fin, opcode, payload: payload.to_vec() }
    }

    #[test]
    fn single_fin_text_frame_delivers_immediately() {
        let mut r = Reassembler::new();
        assert_eq!(r.push(frame(true, Opcode::Text, b"hi")).unwrap(), Delivered::Text("hi".to_string()));
    }

    #[test]
    fn continuation_frames_accumulate_until_fin() {
        let mut r = Reassembler::new();
        assert_eq!(r.push(frame(false, Opcode::Text, b"hel")).unwrap(), Delivered::None);
        assert_eq!(r.push(frame(false, Opcode::Continuation, b"l")).unwrap(), Delivered::None);
        assert_eq!(
            r.push(frame(true, Opcode::Continuation, b"o")).unwrap(),
            Delivered::Text("hello".to_string())
        );
    }

    #[test]
    fn continuation_without_an_open_message_is_a_protocol_error() {
        let mut r = Reassembler::new();
        assert_eq!(r.push(frame(true, Opcode::Continuation, b"x")).unwrap_err(), ReassemblyFailure::Protocol);
    }

    #[test]
    fn starting_a_new_message_while_one_is_open_is_a_protocol_error() {
        let mut r = Reassembler::new();
        r.push(frame(false, Opcode::Text, b"hel")).unwrap();
        assert_eq!(r.push(frame(true, Opcode::Binary, b"x")).unwrap_err(), ReassemblyFailure::Protocol);
    }

    #[test]
    fn invalid_utf8_at_fin_is_reported_distinctly() {
        let mut r = Reassembler::new();
        assert_eq!(r.push(frame(true, Opcode::Text, &[0xFF, 0xFE])).unwrap_err(), ReassemblyFailure::InvalidUtf8);
        assert_eq!(ReassemblyFailure::InvalidUtf8.close_code(), close_code::INVALID_PAYLOAD);
    }

    #[test]
    fn handshake_response_contains_the_computed_accept_key() {
        let response = build_handshake_response("dGhlIHNhbXBsZSBub25jZQ==");
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }
}
