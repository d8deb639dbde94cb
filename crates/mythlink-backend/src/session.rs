use std::io::{Read, Write};
use std::time::Duration;

use mythlink_frame::{FrameConfig, Message, MessageReader, MessageWriter};
use mythlink_transport::{BackendStream, TcpEndpoint};
use tracing::debug;

use crate::error::Result;

/// Token that tells the backend a command socket is going away.
pub const DONE: &str = "DONE";

/// One command socket: a framed reader and writer over the same stream.
///
/// Strictly request/reply; at most one request is outstanding.
pub struct Session<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
}

/// A session over a TCP socket to a backend.
pub type BackendSession = Session<BackendStream, BackendStream>;

impl<R: Read, W: Write> Session<R, W> {
    pub fn from_parts(reader: MessageReader<R>, writer: MessageWriter<W>) -> Self {
        Self { reader, writer }
    }

    /// Send one message without waiting for a reply.
    pub fn send<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<()> {
        Ok(self.writer.send(tokens)?)
    }

    /// Read one reply.
    pub fn recv(&mut self) -> Result<Message> {
        Ok(self.reader.read_message()?)
    }

    /// Send a request and read its reply.
    pub fn request<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<Message> {
        self.send(tokens)?;
        self.recv()
    }

    /// The raw inbound stream, for reading unframed bytes.
    pub fn stream_mut(&mut self) -> &mut R {
        self.reader.get_mut()
    }

    pub fn into_parts(self) -> (MessageReader<R>, MessageWriter<W>) {
        (self.reader, self.writer)
    }
}

impl BackendSession {
    /// Open a TCP socket to `endpoint` and frame it with `config`.
    pub fn connect(
        endpoint: &TcpEndpoint,
        config: &FrameConfig,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = match connect_timeout {
            Some(timeout) => endpoint.connect_timeout(timeout)?,
            None => endpoint.connect()?,
        };
        let reader_stream = stream.try_clone()?;

        let reader = MessageReader::with_config_backend(reader_stream, config.clone())?;
        let writer = MessageWriter::with_config_backend(stream, config.clone())?;
        debug!(%endpoint, "opened backend socket");
        Ok(Self::from_parts(reader, writer))
    }

    /// Shut the socket down without notifying the backend.
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.writer.get_ref().shutdown()?)
    }

    /// Send `DONE`, then shut the socket down.
    ///
    /// The socket is shut down even when `DONE` cannot be written; the first
    /// error is returned.
    pub fn close(mut self) -> Result<()> {
        let done = self.send(&[DONE]);
        let shutdown = self.shutdown();
        done.and(shutdown)
    }
}
