#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use mythlink::frame::{encode_message, FrameError, MessageReader, DEFAULT_SEPARATOR};

enum Step {
    Reply(Vec<String>),
    Raw(Vec<u8>),
}

/// Answers each request on one socket with the next scripted reply.
struct Script(Vec<Step>);

impl Script {
    fn new() -> Self {
        Script(Vec::new())
    }

    fn reply(mut self, tokens: &[&str]) -> Self {
        self.0
            .push(Step::Reply(tokens.iter().map(|t| t.to_string()).collect()));
        self
    }

    fn raw(mut self, bytes: &[u8]) -> Self {
        self.0.push(Step::Raw(bytes.to_vec()));
        self
    }
}

/// Loopback backend playing one script per accepted socket, in accept order.
struct Backend {
    port: u16,
    handle: JoinHandle<Vec<Vec<Vec<String>>>>,
}

impl Backend {
    fn start(scripts: Vec<Script>) -> Self {
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
                .map(|w| w.join().expect("worker should finish"))
                .collect()
        });
        Self { port, handle }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mythlink"))
            .args(["--log-level", "error", "--format", "json"])
            .args(args)
            .args(["--host", "127.0.0.1", "--port", &self.port.to_string()])
            .args(["--client-hostname", "cli-test", "--timeout", "10s"])
            .output()
            .expect("mythlink should run")
    }

    fn finish(self) -> Vec<Vec<Vec<String>>> {
        self.handle.join().expect("backend should finish")
    }
}

fn play(stream: TcpStream, script: Script) -> Vec<Vec<String>> {
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    let mut writer = stream.try_clone().expect("stream should clone");
    let mut reader = MessageReader::new(stream);
    let mut received = Vec::new();

    for step in script.0 {
        match step {
            Step::Reply(tokens) => {
                received.push(reader.read_message().expect("request").into_tokens());
                let mut buf = BytesMut::new();
                encode_message(tokens.as_slice(), DEFAULT_SEPARATOR, &mut buf).expect("encode");
                writer.write_all(&buf).expect("write reply");
            }
            Step::Raw(bytes) => writer.write_all(&bytes).expect("write raw"),
        }
    }
    loop {
        match reader.read_message() {
            Ok(message) => received.push(message.into_tokens()),
            Err(FrameError::ConnectionClosed) | Err(FrameError::Io(_)) => break,
            Err(err) => panic!("backend read garbage: {err}"),
        }
    }
    received
}

/// The version probe socket plus the announced command socket.
fn command_scripts(version: &str, command: Script) -> Vec<Script> {
    vec![
        Script::new().reply(&["ACCEPT", version]),
        command.reply(&["OK"]),
    ]
}

fn command_socket(version: &str) -> Script {
    Script::new().reply(&["ACCEPT", version])
}

fn unique_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "mythlink-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_mythlink"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("mythlink {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn probe_reports_negotiated_protocol() {
    let backend = Backend::start(command_scripts("56", command_socket("56")));

    let output = backend.run(&["probe"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"protocol_version\":56"));
    assert!(stdout.contains("\"record_size\":47"));

    let received = backend.finish();
    assert_eq!(received[0], vec![vec!["MYTH_PROTO_VERSION 40"]]);
    assert_eq!(received[1][0], vec!["MYTH_PROTO_VERSION 56"]);
    assert_eq!(received[1][1], vec!["ANN Playback cli-test 0"]);
    assert_eq!(received[1][2], vec!["DONE"]);
}

#[test]
fn probe_older_backend_returns_60() {
    let backend = Backend::start(vec![Script::new().reply(&["REJECT", "23"])]);

    let output = backend.run(&["probe"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("server protocol version 23"));
    backend.finish();
}

#[test]
fn probe_unreachable_returns_3() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        listener.local_addr().expect("listener addr").port()
    };

    let output = Command::new(env!("CARGO_BIN_EXE_mythlink"))
        .args(["probe", "--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--timeout", "2s"])
        .output()
        .expect("probe should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn status_reports_disk_and_load() {
    let command = command_socket("40")
        .reply(&["OK"])
        .reply(&[
            "ignored",
            "backend",
            "/var/lib/mythtv",
            "1",
            "-1",
            "1",
            "0",
            "0",
            "1073741824",
        ])
        .reply(&["0.5", "0.25", "0.125"])
        .reply(&["7200"])
        .reply(&["2"]);
    let backend = Backend::start(vec![Script::new().reply(&["ACCEPT", "40"]), command]);

    let output = backend.run(&["status"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"total\":4294967296"));
    assert!(stdout.contains("\"used\":1073741824"));
    assert!(stdout.contains("\"uptime_secs\":7200"));
    assert!(stdout.contains("\"free_tuners\":2"));

    let received = backend.finish();
    let commands: Vec<&str> = received[1].iter().map(|m| m[0].as_str()).collect();
    assert_eq!(
        commands,
        vec![
            "MYTH_PROTO_VERSION 40",
            "ANN Playback cli-test 0",
            "QUERY_FREE_SPACE",
            "QUERY_LOAD",
            "QUERY_UPTIME",
            "GET_FREE_RECORDER_COUNT",
            "DONE",
        ]
    );
}

#[test]
fn fetch_copies_remote_file() {
    let dest = unique_path("fetch");
    let backend = Backend::start(vec![
        Script::new().reply(&["ACCEPT", "40"]),
        command_socket("40").reply(&["OK"]).reply(&["11"]),
        Script::new()
            .reply(&["ACCEPT", "40"])
            .reply(&["OK", "5", "0", "11"])
            .raw(b"hello world"),
    ]);

    let output = backend.run(&["fetch", "/1001_1.mpg", dest.to_str().expect("utf-8 path")]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"bytes\":11"));
    assert_eq!(std::fs::read(&dest).expect("dest should exist"), b"hello world");
    let _ = std::fs::remove_file(&dest);

    let received = backend.finish();
    assert_eq!(received[1][2], vec!["QUERY_FILETRANSFER 5", "REQUEST_BLOCK", "11"]);
    assert_eq!(received[2][1], vec!["ANN FileTransfer cli-test", "/1001_1.mpg"]);
}

#[test]
fn fetch_empty_file_writes_nothing() {
    let dest = unique_path("empty");
    let backend = Backend::start(vec![
        Script::new().reply(&["ACCEPT", "40"]),
        command_socket("40").reply(&["OK"]),
        Script::new()
            .reply(&["ACCEPT", "40"])
            .reply(&["OK", "5", "0", "0"]),
    ]);

    let output = backend.run(&["fetch", "/empty.mpg", dest.to_str().expect("utf-8 path")]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"created\":false"));
    assert!(!dest.exists());
    backend.finish();
}

#[test]
fn fetch_refused_returns_1() {
    let dest = unique_path("refused");
    let backend = Backend::start(vec![
        Script::new().reply(&["ACCEPT", "40"]),
        command_socket("40").reply(&["OK"]),
        Script::new()
            .reply(&["ACCEPT", "40"])
            .reply(&["ERROR", "file not found"]),
    ]);

    let output = backend.run(&["fetch", "/missing.mpg", dest.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!dest.exists());
    backend.finish();
}
