//! File transfer: a data socket announced with `ANN FileTransfer` and blocks
//! requested over a command socket.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use mythlink_frame::{longlong, FrameError, WIRE_TARGET};
use tracing::{debug, info, warn};

use crate::commands::token;
use crate::connection::{Announce, Connection};
use crate::error::{BackendError, Result};
use crate::session::{BackendSession, Session};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// An announced data socket plus the remote handle and size.
///
/// Owned by the transfer caller and closed when the transfer ends.
pub struct FileTransfer {
    handle: String,
    size: u64,
    data: BackendSession,
}

impl FileTransfer {
    /// Opaque token naming the remote file in `QUERY_FILETRANSFER`.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Remote file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Shut the data socket down.
    pub fn close(self) -> Result<()> {
        self.data.shutdown()
    }
}

/// Pull `size` bytes of `handle` in blocks of at most `max_block` bytes.
///
/// Each block is requested on `command`, read in full from `data` and written
/// to `sink`; then one acknowledgement is consumed from `command`. A block
/// that fails still has its acknowledgement consumed when the command socket
/// allows it.
pub fn pull_blocks<R, W, D, S>(
    command: &mut Session<R, W>,
    handle: &str,
    size: u64,
    max_block: usize,
    data: &mut D,
    sink: &mut S,
) -> Result<u64>
where
    R: Read,
    W: Write,
    D: Read + ?Sized,
    S: Write + ?Sized,
{
    pull_blocks_synced(command, handle, size, max_block, data, sink).map_err(|failed| failed.error)
}

/// A failed block loop.
pub(crate) struct PullError {
    pub(crate) error: BackendError,
    /// False when a request or reply on the command socket was cut short, so
    /// the next reply read there would belong to the wrong request.
    pub(crate) in_sync: bool,
}

impl PullError {
    fn in_sync(error: BackendError) -> Self {
        Self {
            error,
            in_sync: true,
        }
    }

    fn out_of_sync(error: BackendError) -> Self {
        Self {
            error,
            in_sync: false,
        }
    }
}

pub(crate) fn pull_blocks_synced<R, W, D, S>(
    command: &mut Session<R, W>,
    handle: &str,
    size: u64,
    max_block: usize,
    data: &mut D,
    sink: &mut S,
) -> std::result::Result<u64, PullError>
where
    R: Read,
    W: Write,
    D: Read + ?Sized,
    S: Write + ?Sized,
{
    if max_block == 0 {
        return Err(PullError::in_sync(BackendError::Client(
            "maximum block size must be positive".into(),
        )));
    }

    let request = format!("QUERY_FILETRANSFER {handle}");
    let mut buf = vec![0u8; READ_CHUNK_SIZE.min(max_block)];
    let mut remaining = size;
    let mut blocks = 0usize;

    while remaining > 0 {
        let block = remaining.min(max_block as u64) as usize;
        command
            .send(&[request.as_str(), "REQUEST_BLOCK", &block.to_string()])
            .map_err(PullError::out_of_sync)?;

        let received = receive_block(data, sink, &mut buf, block);
        match (received, command.recv()) {
            (Ok(()), Ok(ack)) => {
                debug!(target: WIRE_TARGET, block, %ack, "block received");
            }
            (Err(err), Ok(ack)) => {
                debug!(target: WIRE_TARGET, block, %ack, "reply drained after failed block");
                return Err(PullError::in_sync(err));
            }
            (Ok(()), Err(err)) => return Err(PullError::out_of_sync(err)),
            (Err(err), Err(drain)) => {
                warn!(handle, error = %drain, "block reply lost after failed block");
                return Err(PullError::out_of_sync(err));
            }
        }
        remaining -= block as u64;
        blocks += 1;
    }

    sink.flush().map_err(|err| PullError::in_sync(BackendError::Sink(err)))?;
    debug!(handle, size, blocks, "transfer complete");
    Ok(size)
}

/// Read exactly `block` bytes from `data` into `sink`.
///
/// Once the sink fails the rest of the block is read and dropped, so the
/// backend is never left writing into a socket nobody reads.
fn receive_block<D, S>(data: &mut D, sink: &mut S, buf: &mut [u8], block: usize) -> Result<()>
where
    D: Read + ?Sized,
    S: Write + ?Sized,
{
    let mut received = 0usize;
    let mut sink_error = None;
    while received < block {
        let want = (block - received).min(buf.len());
        let n = match data.read(&mut buf[..want]) {
            Ok(0) => return Err(FrameError::ConnectionClosed.into()),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err).into()),
        };
        if sink_error.is_none() {
            if let Err(err) = sink.write_all(&buf[..n]) {
                sink_error = Some(err);
            }
        }
        received += n;
    }
    sink_error.map_or(Ok(()), |err| Err(BackendError::Sink(err)))
}

impl Connection {
    /// Open a data socket to `backend_host` for the file at `path`.
    pub fn announce_file_transfer(&self, backend_host: &str, path: &str) -> Result<FileTransfer> {
        let mut data = self.connect(None, Some(backend_host))?;
        let announce = self
            .protocol()
            .announce_file_transfer(&self.config().client_hostname, path);
        let reply = data.request(announce.as_slice())?;
        if !reply.is_ok() {
            let _ = data.shutdown();
            return Err(BackendError::Server(format!(
                "backend filetransfer refused: {reply}"
            )));
        }

        const COMMAND: &str = "ANN FileTransfer";
        let handle = token(&reply, 1, COMMAND)?.to_string();
        let size = longlong::parse(token(&reply, 3, COMMAND)?, token(&reply, 2, COMMAND)?)?;
        debug!(path, handle = %handle, size, "file transfer announced");
        Ok(FileTransfer { handle, size, data })
    }

    /// Size of a remote file, found by announcing a transfer for it.
    pub fn remote_file_size(&self, path: &str, backend_host: Option<&str>) -> Result<u64> {
        let host = backend_host.unwrap_or(self.host());
        let transfer = self.announce_file_transfer(host, path)?;
        let size = transfer.size();
        transfer.close()?;
        Ok(size)
    }

    /// Copy a remote file to `dest`. Returns the bytes written; a 0-byte
    /// remote file writes nothing and does not create `dest`.
    ///
    /// `backend_host` names the backend that recorded the file; `None` means
    /// the master.
    pub fn transfer_file(
        &mut self,
        path: &str,
        dest: &Path,
        backend_host: Option<&str>,
    ) -> Result<u64> {
        self.transfer_with(path, backend_host, || {
            File::create(dest).map(BufWriter::new)
        })
    }

    /// Copy a remote file into `sink`. Returns the bytes written.
    pub fn transfer_to<S: Write + ?Sized>(
        &mut self,
        path: &str,
        backend_host: Option<&str>,
        sink: &mut S,
    ) -> Result<u64> {
        self.transfer_with(path, backend_host, || Ok(sink))
    }

    fn transfer_with<S, F>(&mut self, path: &str, backend_host: Option<&str>, open: F) -> Result<u64>
    where
        S: Write,
        F: FnOnce() -> io::Result<S>,
    {
        let host = backend_host.unwrap_or(self.host()).to_string();
        let mut transfer = self.announce_file_transfer(&host, path)?;
        let result = if transfer.size == 0 {
            debug!(path, "remote file is empty");
            Ok(0)
        } else {
            self.pull_into(&host, &mut transfer, open)
        };
        if let Err(err) = transfer.close() {
            warn!(error = %err, "failed to shut down data socket");
        }

        let written = result?;
        info!(path, host = %host, bytes = written, "file transferred");
        Ok(written)
    }

    /// Run the block loop over the master command socket, or over a fresh
    /// socket when the file lives on a slave backend.
    fn pull_into<S, F>(&mut self, host: &str, transfer: &mut FileTransfer, open: F) -> Result<u64>
    where
        S: Write,
        F: FnOnce() -> io::Result<S>,
    {
        let mut sink = open().map_err(BackendError::Sink)?;
        let max_block = self.config().max_block_size;
        let FileTransfer { handle, size, data } = transfer;

        if self.config().is_master(host) {
            let command = self.session()?;
            let result =
                pull_blocks_synced(command, handle, *size, max_block, data.stream_mut(), &mut sink);
            result.map_err(|failed| {
                if !failed.in_sync {
                    self.discard();
                }
                failed.error
            })
        } else {
            debug!(host, "requesting file from slave backend");
            let mut command = self.connect(Some(Announce::Playback), Some(host))?;
            let result = pull_blocks_synced(
                &mut command,
                handle,
                *size,
                max_block,
                data.stream_mut(),
                &mut sink,
            );
            let closed = match &result {
                Err(failed) if !failed.in_sync => command.shutdown(),
                _ => command.close(),
            };
            if let Err(err) = closed {
                warn!(host, error = %err, "failed to close slave command socket");
            }
            result.map_err(|failed| failed.error)
        }
    }
}
