use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::cmd::FetchArgs;
use crate::exit::{backend_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};
use crate::output::{human_bytes, print_json, OutputFormat};

#[derive(Serialize)]
struct FetchOutput {
    path: String,
    dest: PathBuf,
    bytes: u64,
    created: bool,
}

/// Destination file opened on the first write, so an empty remote file
/// leaves nothing behind. Writes fail once `running` is cleared.
struct Destination<'a> {
    path: &'a Path,
    file: Option<BufWriter<File>>,
    running: Arc<AtomicBool>,
}

impl Destination<'_> {
    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "transfer cancelled"));
        }
        match &mut self.file {
            Some(file) => Ok(file),
            slot => Ok(slot.insert(BufWriter::new(File::create(self.path)?))),
        }
    }
}

impl Write for Destination<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

pub fn run(args: FetchArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut conn = args.backend.open()?;
    let mut dest = Destination {
        path: &args.dest,
        file: None,
        running: running.clone(),
    };
    let copied = conn.transfer_to(&args.path, args.backend_host.as_deref(), &mut dest);
    let created = dest.file.is_some();
    drop(dest);
    let closed = conn.close();

    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(_) if !running.load(Ordering::SeqCst) => {
            if created {
                let _ = std::fs::remove_file(&args.dest);
            }
            return Err(CliError::new(INTERRUPTED, "transfer cancelled"));
        }
        Err(err) => return Err(backend_error("fetch failed", err)),
    };
    closed.map_err(|err| backend_error("close failed", err))?;
    info!(path = %args.path, bytes, "fetched");

    let out = FetchOutput {
        path: args.path,
        dest: args.dest,
        bytes,
        created,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty if out.created => println!(
            "{} -> {} ({})",
            out.path,
            out.dest.display(),
            human_bytes(out.bytes)
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("{} is empty; nothing written", out.path)
        }
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
