use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::BackendStream;

/// A backend address: host name (or IP literal) plus TCP port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpEndpoint {
    host: String,
    port: u16,
}

impl TcpEndpoint {
    /// Create an endpoint for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host part of the endpoint.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part of the endpoint.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same port, different host. Used to reach slave backends.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self::new(host, self.port)
    }

    /// Connect to the endpoint (blocking, no connect deadline).
    pub fn connect(&self) -> Result<BackendStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            TransportError::Connect {
                addr: self.to_string(),
                source: e,
            }
        })?;
        debug!(endpoint = %self, "connected to backend");
        Ok(BackendStream::from_tcp(stream))
    }

    /// Connect with a per-address deadline.
    ///
    /// Every resolved address is tried in turn; the last failure is reported.
    pub fn connect_timeout(&self, timeout: Duration) -> Result<BackendStream> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Connect {
                addr: self.to_string(),
                source: e,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    debug!(endpoint = %self, %addr, "connected to backend");
                    return Ok(BackendStream::from_tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(source) => Err(TransportError::Connect {
                addr: self.to_string(),
                source,
            }),
            None => Err(TransportError::Resolve {
                addr: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn connect_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            buf
        });

        let mut stream = TcpEndpoint::new("127.0.0.1", port).connect().unwrap();
        stream.write_all(b"hello").unwrap();
        assert_eq!(&server.join().unwrap(), b"hello");
    }

    #[test]
    fn connect_timeout_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || listener.accept().map(|_| ()));

        let stream = TcpEndpoint::new("127.0.0.1", port)
            .connect_timeout(Duration::from_secs(2))
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
        server.join().unwrap().unwrap();
    }

    #[test]
    fn refused_connection_reports_address() {
        // Bind then drop so the port is known to be closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = TcpEndpoint::new("127.0.0.1", port).connect().unwrap_err();
        match err {
            TransportError::Connect { addr, .. } => {
                assert_eq!(addr, format!("127.0.0.1:{port}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn with_host_keeps_port() {
        let master = TcpEndpoint::new("master", 6543);
        let slave = master.with_host("slave");
        assert_eq!(slave.host(), "slave");
        assert_eq!(slave.port(), 6543);
        assert_eq!(slave.to_string(), "slave:6543");
    }
}
