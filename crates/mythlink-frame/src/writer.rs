use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use mythlink_transport::BackendStream;
use tracing::debug;

use crate::codec::{encode_message, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::{preview, transport_to_frame_error};
use crate::WIRE_TARGET;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete token messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one request (blocking).
    ///
    /// A write timeout surfaces as `FrameError::Io` with `WouldBlock` or
    /// `TimedOut`; only `Interrupted` is retried.
    pub fn send<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<()> {
        self.buf.clear();
        encode_message(tokens, &self.config.separator, &mut self.buf)?;

        let payload_len = self.buf.len() - crate::codec::LENGTH_FIELD_SIZE;
        if payload_len > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: self.config.max_payload_size,
            });
        }

        debug!(
            target: WIRE_TARGET,
            "write -> {}",
            preview(&String::from_utf8_lossy(&self.buf))
        );

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageWriter<BackendStream> {
    /// Create a writer for a backend socket and apply the write timeout from config.
    pub fn with_config_backend(inner: BackendStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_message, Message};

    fn written(writer: MessageWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn write_single_message() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(&["MYTH_PROTO_VERSION 40"]).unwrap();

        assert_eq!(written(writer), b"21      MYTH_PROTO_VERSION 40");
    }

    #[test]
    fn write_multiple_messages() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(&["QUERY_LOAD"]).unwrap();
        writer.send(&["QUERY_RECORDER 3", "IS_RECORDING"]).unwrap();

        let config = FrameConfig::default();
        let mut wire = BytesMut::from(written(writer).as_slice());
        let first = decode_message(&mut wire, &config).unwrap().unwrap();
        let second = decode_message(&mut wire, &config).unwrap().unwrap();
        assert_eq!(first, Message::new(["QUERY_LOAD"]));
        assert_eq!(second.tokens(), &["QUERY_RECORDER 3", "IS_RECORDING"]);
        assert!(wire.is_empty());
    }

    #[test]
    fn writes_with_custom_separator() {
        let config = FrameConfig {
            separator: "|".to_string(),
            ..FrameConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), config);
        writer.send(&["a", "b"]).unwrap();
        assert_eq!(written(writer), b"3       a|b");
    }

    #[test]
    fn reject_oversized_payload() {
        let config = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), config);
        let err = writer.send(&["too long"]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 4 }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn write_zero_is_connection_closed() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.send(&["DONE"]).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_retries_partial_writes() {
        let mut writer = MessageWriter::new(FlakyWriter {
            calls: 0,
            data: Vec::new(),
        });
        writer.send(&["ANN Playback host 0"]).unwrap();
        assert_eq!(writer.get_ref().data, b"19      ANN Playback host 0");
    }

    #[test]
    fn write_timeout_is_reported() {
        let mut writer = MessageWriter::new(Stalled {
            kind: ErrorKind::WouldBlock,
            calls: 0,
        });
        let err = writer.send(&["QUERY_LOAD"]).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(writer.get_ref().calls, 1);

        let mut writer = MessageWriter::new(Stalled {
            kind: ErrorKind::TimedOut,
            calls: 0,
        });
        let err = writer.send(&["QUERY_LOAD"]).unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::TimedOut));
    }

    #[test]
    fn flush_timeout_is_reported() {
        let mut writer = MessageWriter::new(StalledFlush);
        let err = writer.flush().unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn flush_retries_interrupted() {
        let flushed = Arc::new(AtomicBool::new(false));
        let mut writer = MessageWriter::new(InterruptedFlush {
            first: true,
            flushed: Arc::clone(&flushed),
        });
        writer.flush().unwrap();
        assert!(flushed.load(Ordering::SeqCst));
    }

    #[test]
    fn accessors() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(writer.config().separator, "[]:[]");
        let _ = writer.get_mut();
        let _ = writer.get_ref();
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FlakyWriter {
        calls: usize,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls {
                1 | 3 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                _ => {
                    let n = buf.len().min(5);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// A socket whose send timeout has expired.
    struct Stalled {
        kind: ErrorKind,
        calls: usize,
    }

    impl Write for Stalled {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            Err(std::io::Error::from(self.kind))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct StalledFlush;

    impl Write for StalledFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    struct InterruptedFlush {
        first: bool,
        flushed: Arc<AtomicBool>,
    }

    impl Write for InterruptedFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if self.first {
                self.first = false;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
