use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use mythlink_transport::BackendStream;
use tracing::debug;

use crate::codec::{decode_header, split_payload, FrameConfig, Header, Message, LENGTH_FIELD_SIZE};
use crate::error::{FrameError, Result};
use crate::WIRE_TARGET;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;
const LOG_PREVIEW_CHARS: usize = 80;

/// Reads complete replies from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete messages.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete reply (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached
    /// before a whole message arrived.
    pub fn read_message(&mut self) -> Result<Message> {
        self.buf.clear();
        let got = self.fill(LENGTH_FIELD_SIZE)?;
        if got == 0 {
            return Err(FrameError::ConnectionClosed);
        }

        let header = match decode_header(&self.buf[..got]) {
            Ok(header) => header,
            Err(err) => {
                debug!(
                    target: WIRE_TARGET,
                    header = %String::from_utf8_lossy(&self.buf[..got]),
                    "unparseable length field"
                );
                return Err(err);
            }
        };

        let payload_len = match header {
            Header::Ack => {
                debug!(target: WIRE_TARGET, "read  <- OK (short ack)");
                return Ok(Message::ack());
            }
            Header::Length(_) if got < LENGTH_FIELD_SIZE => {
                return Err(FrameError::ConnectionClosed);
            }
            Header::Length(len) => len,
        };

        if payload_len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        if self.fill(payload_len)? < payload_len {
            return Err(FrameError::ConnectionClosed);
        }

        let tokens = split_payload(&self.buf, &self.config.separator);
        debug!(
            target: WIRE_TARGET,
            "read  <- {}",
            preview(&String::from_utf8_lossy(&self.buf))
        );
        Ok(Message::new(tokens))
    }

    /// Accumulate bytes until `want` are buffered or the peer closes.
    /// Returns the number of bytes buffered.
    fn fill(&mut self, want: usize) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while self.buf.len() < want {
            let limit = (want - self.buf.len()).min(READ_CHUNK_SIZE);
            let read = match self.inner.read(&mut chunk[..limit]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                break;
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(self.buf.len())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent replies.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageReader<BackendStream> {
    /// Create a reader for a backend socket and apply the read timeout from config.
    pub fn with_config_backend(inner: BackendStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

pub(crate) fn transport_to_frame_error(err: mythlink_transport::TransportError) -> FrameError {
    match err {
        mythlink_transport::TransportError::Io(io) => FrameError::Io(io),
        mythlink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{encode_message, DEFAULT_SEPARATOR};

    fn wire(tokens: &[&str]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_message(tokens, DEFAULT_SEPARATOR, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn read_single_message() {
        let mut reader = MessageReader::new(Cursor::new(wire(&["ACCEPT", "40"])));
        let message = reader.read_message().unwrap();
        assert_eq!(message.tokens(), &["ACCEPT", "40"]);
    }

    #[test]
    fn read_multiple_messages() {
        let mut bytes = wire(&["one"]);
        bytes.extend(wire(&["two", "2"]));
        bytes.extend(wire(&["three"]));

        let mut reader = MessageReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_message().unwrap().tokens(), &["one"]);
        assert_eq!(reader.read_message().unwrap().tokens(), &["two", "2"]);
        assert_eq!(reader.read_message().unwrap().tokens(), &["three"]);
    }

    #[test]
    fn read_does_not_consume_following_message() {
        let mut bytes = wire(&["first"]);
        bytes.extend_from_slice(b"trailing raw bytes");

        let mut reader = MessageReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_message().unwrap().tokens(), &["first"]);

        let mut rest = Vec::new();
        reader.get_mut().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"trailing raw bytes");
    }

    #[test]
    fn read_message_with_large_payload() {
        let big = "x".repeat(64 * 1024);
        let mut reader = MessageReader::new(Cursor::new(wire(&[big.as_str(), "tail"])));
        let message = reader.read_message().unwrap();
        assert_eq!(message.token(0).map(str::len), Some(64 * 1024));
        assert_eq!(message.token(1), Some("tail"));
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&["QUERY_LOAD", "0.5", "0.25", "0.1"]),
            pos: 0,
        };
        let mut reader = MessageReader::new(byte_reader);

        let message = reader.read_message().unwrap();
        assert_eq!(message.tokens(), &["QUERY_LOAD", "0.5", "0.25", "0.1"]);
    }

    #[test]
    fn ok_header_short_circuits() {
        let mut bytes = b"OK      ".to_vec();
        bytes.extend(wire(&["next"]));

        let mut reader = MessageReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_message().unwrap(), Message::ack());
        assert_eq!(reader.read_message().unwrap().tokens(), &["next"]);
    }

    #[test]
    fn bare_ok_before_close_is_ack() {
        let mut reader = MessageReader::new(Cursor::new(b"ok".to_vec()));
        assert_eq!(reader.read_message().unwrap(), Message::ack());
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_header() {
        let mut reader = MessageReader::new(Cursor::new(b"12 ".to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_payload() {
        let mut partial = b"16      ".to_vec();
        partial.extend_from_slice(b"only-part");

        let mut reader = MessageReader::new(Cursor::new(partial));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn invalid_length_in_stream() {
        let mut reader = MessageReader::new(Cursor::new(b"garbage!and more".to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::InvalidLength(_)));
    }

    #[test]
    fn oversized_message_in_stream() {
        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = MessageReader::with_config(Cursor::new(b"1024    ".to_vec()), cfg);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&["ok-after-eintr"]),
            pos: 0,
        };
        let mut framed = MessageReader::new(reader);
        assert_eq!(framed.read_message().unwrap().tokens(), &["ok-after-eintr"]);
    }

    #[test]
    fn would_block_propagates_io_error() {
        let reader = WouldBlockReader;
        let mut framed = MessageReader::new(reader);
        let err = framed.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = MessageReader::new(cursor);
        reader.set_max_payload_size(32);
        assert_eq!(reader.config().max_payload_size, 32);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    fn roundtrip_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = MessageReader::with_config_backend(
                BackendStream::from_tcp(stream),
                FrameConfig::default(),
            )
            .unwrap();
            reader.read_message().unwrap()
        });

        let stream = BackendStream::from_tcp(TcpStream::connect(addr).unwrap());
        let mut writer = crate::writer::MessageWriter::new(stream);
        writer.send(&["QUERY_UPTIME"]).unwrap();

        assert_eq!(server.join().unwrap().tokens(), &["QUERY_UPTIME"]);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
