//! Wire protocol.
//!
//! A connection starts with a single protocol-version byte. After that the
//! client sends messages, each terminated by an unescaped `$`:
//!
//! ```text
//! g<key>$             get
//! p<key>,<value>$     put
//! ```
//!
//! A `\` makes the next byte literal, so `\$`, `\,` and `\\` stand for `$`,
//! `,` and `\`. Payloads are separated by unescaped `,`.
//!
//! A get is answered with `s<value>$` on a hit and `f$` otherwise. A put is
//! not answered.

use std::collections::VecDeque;

pub const COMMAND_GET: u8 = b'g';
pub const COMMAND_PUT: u8 = b'p';

const TERMINATOR: u8 = b'$';
const SEPARATOR: u8 = b',';
const ESCAPE: u8 = b'\\';

const RESPONSE_HIT: u8 = b's';
const RESPONSE_MISS: u8 = b'f';

/// Errors for messages that decode but don't form a valid request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The command byte is neither `g` nor `p`.
    UnknownCommand(u8),
    /// The command got the wrong number of payloads.
    WrongPayloadCount {
        command: u8,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCommand(c) => write!(f, "unknown command byte {c:#04x}"),
            Self::WrongPayloadCount {
                command,
                expected,
                actual,
            } => write!(
                f,
                "command '{}' takes {expected} payloads, got {actual}",
                char::from(*command)
            ),
        }
    }
}

impl std::error::Error for WireError {}

/// A decoded message: command byte plus unescaped payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub command: u8,
    pub payloads: Vec<Vec<u8>>,
}

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { key: Vec<u8> },
    Put { key: Vec<u8>, value: Vec<u8> },
}

impl Message {
    /// Validate the command and payload count.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands or a wrong number of payloads.
    pub fn into_request(self) -> Result<Request, WireError> {
        let expected = match self.command {
            COMMAND_GET => 1,
            COMMAND_PUT => 2,
            other => return Err(WireError::UnknownCommand(other)),
        };
        if self.payloads.len() != expected {
            return Err(WireError::WrongPayloadCount {
                command: self.command,
                expected,
                actual: self.payloads.len(),
            });
        }

        let mut payloads = self.payloads.into_iter();
        let key = payloads.next().unwrap_or_default();
        Ok(if self.command == COMMAND_GET {
            Request::Get { key }
        } else {
            Request::Put {
                key,
                value: payloads.next().unwrap_or_default(),
            }
        })
    }
}

impl Request {
    /// Encode as a `$`-terminated message, escaping payload bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Get { key } => {
                out.push(COMMAND_GET);
                escape_into(key, &mut out);
            }
            Self::Put { key, value } => {
                out.push(COMMAND_PUT);
                escape_into(key, &mut out);
                out.push(SEPARATOR);
                escape_into(value, &mut out);
            }
        }
        out.push(TERMINATOR);
        out
    }
}

fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if matches!(b, TERMINATOR | SEPARATOR | ESCAPE) {
            out.push(ESCAPE);
        }
        out.push(b);
    }
}

/// Response to a get. The value is sent as is.
#[must_use]
pub fn encode_get_response(value: Option<&[u8]>) -> Vec<u8> {
    match value {
        Some(value) => {
            let mut out = Vec::with_capacity(value.len() + 2);
            out.push(RESPONSE_HIT);
            out.extend_from_slice(value);
            out.push(TERMINATOR);
            out
        }
        None => vec![RESPONSE_MISS, TERMINATOR],
    }
}

/// Incremental message decoder.
///
/// Bytes may arrive in arbitrary chunks; a message or an escape sequence
/// can span any number of `consume` calls. In telnet mode `\r` and `\n` are
/// dropped before decoding.
#[derive(Debug, Default)]
pub struct Decoder {
    telnet_mode: bool,
    escaped: bool,
    command: Option<u8>,
    payloads: Vec<Vec<u8>>,
    messages: VecDeque<Message>,
}

impl Decoder {
    #[must_use]
    pub fn new(telnet_mode: bool) -> Self {
        Self {
            telnet_mode,
            ..Self::default()
        }
    }

    /// Feed a chunk of bytes. Completed messages are queued.
    pub fn consume(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if self.telnet_mode && matches!(b, b'\r' | b'\n') {
                continue;
            }

            if self.escaped {
                self.escaped = false;
                self.push_byte(b);
                continue;
            }

            match b {
                ESCAPE => self.escaped = true,
                TERMINATOR => self.finish_message(),
                SEPARATOR if self.command.is_some() => {
                    if self.payloads.is_empty() {
                        self.payloads.push(Vec::new());
                    }
                    self.payloads.push(Vec::new());
                }
                _ => self.push_byte(b),
            }
        }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        !self.messages.is_empty()
    }

    /// Take the oldest completed message.
    pub fn next_message(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    fn push_byte(&mut self, b: u8) {
        if self.command.is_none() {
            self.command = Some(b);
            return;
        }
        match self.payloads.last_mut() {
            Some(payload) => payload.push(b),
            None => self.payloads.push(vec![b]),
        }
    }

    fn finish_message(&mut self) {
        // An empty frame carries nothing to act on.
        if let Some(command) = self.command.take() {
            self.messages.push_back(Message {
                command,
                payloads: std::mem::take(&mut self.payloads),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut Decoder) -> Vec<Message> {
        std::iter::from_fn(|| decoder.next_message()).collect()
    }

    fn message(command: u8, payloads: &[&[u8]]) -> Message {
        Message {
            command,
            payloads: payloads.iter().map(|p| p.to_vec()).collect(),
        }
    }

    #[test]
    fn test_simple_get() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"gkey$");
        assert!(decoder.has_next());
        assert_eq!(decode_all(&mut decoder), vec![message(b'g', &[b"key"])]);
        assert!(!decoder.has_next());
    }

    #[test]
    fn test_simple_put() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"pkey,value$");
        assert_eq!(
            decode_all(&mut decoder),
            vec![message(b'p', &[b"key", b"value"])]
        );
    }

    #[test]
    fn test_escaped_get() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"gk\\\\e\\,y\\\\\\\\$");
        assert_eq!(
            decode_all(&mut decoder),
            vec![message(b'g', &[b"k\\e,y\\\\"])]
        );
    }

    #[test]
    fn test_escaped_put() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"pk\\\\e\\,y\\\\\\\\,\\\\v\\$al$");
        assert_eq!(
            decode_all(&mut decoder),
            vec![message(b'p', &[b"k\\e,y\\\\", b"\\v$al"])]
        );
    }

    #[test]
    fn test_many_in_one_chunk() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"gkey$pkey,val$");
        assert_eq!(
            decode_all(&mut decoder),
            vec![message(b'g', &[b"key"]), message(b'p', &[b"key", b"val"])]
        );
    }

    #[test]
    fn test_one_in_many_chunks() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"pkey,v");
        assert!(!decoder.has_next());
        decoder.consume(b"al$");
        assert_eq!(
            decode_all(&mut decoder),
            vec![message(b'p', &[b"key", b"val"])]
        );
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"gab\\");
        decoder.consume(b"$cd$");
        assert_eq!(decode_all(&mut decoder), vec![message(b'g', &[b"ab$cd"])]);
    }

    #[test]
    fn test_every_split_point() {
        let input = b"pk\\,1,v\\$1$gk\\,1$";
        let expected = vec![
            message(b'p', &[b"k,1", b"v$1"]),
            message(b'g', &[b"k,1"]),
        ];
        for split in 0..=input.len() {
            let mut decoder = Decoder::new(false);
            decoder.consume(&input[..split]);
            decoder.consume(&input[split..]);
            assert_eq!(decode_all(&mut decoder), expected, "split at {split}");
        }
    }

    #[test]
    fn test_telnet_mode_drops_line_endings() {
        let mut decoder = Decoder::new(true);
        decoder.consume(b"gke\r\ny$\r\n");
        assert_eq!(decode_all(&mut decoder), vec![message(b'g', &[b"key"])]);

        let mut decoder = Decoder::new(false);
        decoder.consume(b"gke\ny$");
        assert_eq!(decode_all(&mut decoder), vec![message(b'g', &[b"ke\ny"])]);
    }

    #[test]
    fn test_payload_splitting_edges() {
        let mut decoder = Decoder::new(false);
        decoder.consume(b"g$p,$pkey,$$");
        assert_eq!(
            decode_all(&mut decoder),
            vec![
                message(b'g', &[]),
                message(b'p', &[b"", b""]),
                message(b'p', &[b"key", b""]),
            ]
        );
    }

    #[test]
    fn test_into_request() {
        assert_eq!(
            message(b'g', &[b"key"]).into_request(),
            Ok(Request::Get {
                key: b"key".to_vec()
            })
        );
        assert_eq!(
            message(b'p', &[b"key", b"value"]).into_request(),
            Ok(Request::Put {
                key: b"key".to_vec(),
                value: b"value".to_vec()
            })
        );
        assert_eq!(
            message(b'x', &[b"key"]).into_request(),
            Err(WireError::UnknownCommand(b'x'))
        );
        assert_eq!(
            message(b'g', &[b"a", b"b"]).into_request(),
            Err(WireError::WrongPayloadCount {
                command: b'g',
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(
            message(b'p', &[b"key"]).into_request(),
            Err(WireError::WrongPayloadCount {
                command: b'p',
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_request_encoding_decodes_back() {
        let requests = vec![
            Request::Put {
                key: b"a,b".to_vec(),
                value: b"$\\".to_vec(),
            },
            Request::Get {
                key: b"a,b".to_vec(),
            },
        ];
        let mut decoder = Decoder::new(false);
        for request in &requests {
            decoder.consume(&request.encode());
        }
        let decoded: Vec<Request> = decode_all(&mut decoder)
            .into_iter()
            .map(|m| m.into_request().expect("valid request"))
            .collect();
        assert_eq!(decoded, requests);
    }

    #[test]
    fn test_get_response() {
        assert_eq!(encode_get_response(Some(b"b")), b"sb$");
        assert_eq!(encode_get_response(Some(b"")), b"s$");
        assert_eq!(encode_get_response(None), b"f$");
    }
}
