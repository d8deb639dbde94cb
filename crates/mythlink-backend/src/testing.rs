//! Scripted loopback backend for tests.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use mythlink_frame::{encode_message, FrameError, MessageReader, DEFAULT_SEPARATOR};

use crate::config::BackendConfig;
use crate::connection::{Announce, Connection};
use crate::events::{EventBus, ListenerBus};
use crate::negotiate::Negotiator;
use crate::protocol::ProtocolRegistry;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

enum Step {
    /// Read one message and record it.
    Recv,
    /// Send a framed message.
    Send(Vec<String>),
    /// Send bytes verbatim.
    Raw(Vec<u8>),
    /// Close the socket and stop.
    HangUp,
}

/// What the backend does on one accepted socket, in order.
///
/// After the last step every further message is recorded until the client
/// hangs up.
#[derive(Default)]
pub(crate) struct ConnScript {
    steps: Vec<Step>,
}

impl ConnScript {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Handshake at `version` followed by a successful playback announce.
    pub(crate) fn handshake(version: u32) -> Self {
        Self::new()
            .reply(&["ACCEPT", &version.to_string()])
            .reply(&["OK"])
    }

    /// Wait for a request, then answer it.
    pub(crate) fn reply(mut self, tokens: &[&str]) -> Self {
        self.steps.push(Step::Recv);
        self.steps
            .push(Step::Send(tokens.iter().map(|t| t.to_string()).collect()));
        self
    }

    /// Wait for a request without answering.
    pub(crate) fn recv(mut self) -> Self {
        self.steps.push(Step::Recv);
        self
    }

    /// Push raw bytes without waiting for a request.
    pub(crate) fn raw(mut self, bytes: Vec<u8>) -> Self {
        self.steps.push(Step::Raw(bytes));
        self
    }

    /// Close the socket; later steps are not played.
    pub(crate) fn hang_up(mut self) -> Self {
        self.steps.push(Step::HangUp);
        self
    }
}

/// A loopback backend that plays one [`ConnScript`] per accepted socket.
pub(crate) struct ScriptedBackend {
    port: u16,
    handle: JoinHandle<Vec<Vec<Vec<String>>>>,
}

impl ScriptedBackend {
    pub(crate) fn start(scripts: Vec<ConnScript>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener.local_addr().expect("listener addr").port();

        let handle = thread::spawn(move || {
            let mut workers = Vec::new();
            for script in scripts {
                let (stream, _) = listener.accept().expect("listener should accept");
                workers.push(thread::spawn(move || play(stream, script)));
            }
            workers
                .into_iter()
                .map(|w| w.join().expect("connection worker should finish"))
                .collect()
        });

        Self { port, handle }
    }

    /// Negotiator that already knows the server speaks `version`.
    pub(crate) fn negotiator(version: u32) -> Arc<Negotiator> {
        Arc::new(Negotiator::pinned(ProtocolRegistry::standard(), version))
    }

    pub(crate) fn config(&self) -> BackendConfig {
        BackendConfig {
            client_hostname: "test-frontend".to_string(),
            ..BackendConfig::new("127.0.0.1", self.port).with_timeout(TEST_TIMEOUT)
        }
    }

    /// Open a playback connection at protocol 40 with a throw-away bus.
    pub(crate) fn connection(&self) -> Connection {
        self.connection_with_bus(Arc::new(ListenerBus::new()))
    }

    pub(crate) fn connection_with_bus(&self, bus: Arc<dyn EventBus>) -> Connection {
        Connection::open_with(
            self.config(),
            Self::negotiator(40),
            bus,
            Some(Announce::Playback),
        )
        .expect("connection should open")
    }

    /// Wait for every socket to finish; returns the messages received per socket.
    pub(crate) fn finish(self) -> Vec<Vec<Vec<String>>> {
        self.handle.join().expect("backend thread should finish")
    }
}

fn play(stream: TcpStream, script: ConnScript) -> Vec<Vec<String>> {
    stream
        .set_read_timeout(Some(TEST_TIMEOUT))
        .expect("read timeout");
    let mut writer = stream.try_clone().expect("stream should clone");
    let mut reader = MessageReader::new(stream);
    let mut received = Vec::new();

    for step in script.steps {
        match step {
            Step::Recv => received.push(
                reader
                    .read_message()
                    .expect("scripted backend expected a request")
                    .into_tokens(),
            ),
            Step::Send(tokens) => {
                let mut buf = BytesMut::new();
                encode_message(tokens.as_slice(), DEFAULT_SEPARATOR, &mut buf).expect("encode reply");
                writer.write_all(&buf).expect("write reply");
            }
            Step::Raw(bytes) => writer.write_all(&bytes).expect("write raw bytes"),
            Step::HangUp => {
                let _ = writer.shutdown(std::net::Shutdown::Both);
                return received;
            }
        }
    }

    loop {
        match reader.read_message() {
            Ok(message) => received.push(message.into_tokens()),
            Err(FrameError::ConnectionClosed) | Err(FrameError::Io(_)) => break,
            Err(err) => panic!("scripted backend read garbage: {err}"),
        }
    }
    received
}
