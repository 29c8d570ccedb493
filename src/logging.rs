use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use once_cell::sync::{Lazy, OnceCell};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::{self, time::UtcTime, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "RIGNET_LOG";
pub const LOG_FILE_NAME: &str = "rignet.log";
const DEFAULT_FILTER: &str = "rignet=info,sqlx=warn";
const MAX_LOG_BYTES: usize = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 4;

static SUBSCRIBER: OnceCell<()> = OnceCell::new();
static FILE_SINK: Lazy<Mutex<Option<FileSink>>> = Lazy::new(|| Mutex::new(None));

struct FileSink {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

/// Hands out the current file writer, or a sink that discards output until
/// [`init_file_logging`] has run.
#[derive(Clone, Copy)]
struct FileSinkWriter;

enum FileSinkHandle {
    Active(NonBlocking),
    Inactive,
}

impl io::Write for FileSinkHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileSinkHandle::Active(writer) => writer.write(buf),
            FileSinkHandle::Inactive => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileSinkHandle::Active(writer) => writer.flush(),
            FileSinkHandle::Inactive => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for FileSinkWriter {
    type Writer = FileSinkHandle;

    fn make_writer(&'a self) -> Self::Writer {
        let sink = FILE_SINK.lock().ok();
        match sink.as_ref().and_then(|guard| guard.as_ref()) {
            Some(sink) => FileSinkHandle::Active(sink.writer.clone()),
            None => FileSinkHandle::Inactive,
        }
    }
}

fn env_filter() -> EnvFilter {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber: human-readable lines on stderr plus a JSON
/// file layer that stays silent until a log directory is configured. Safe to
/// call more than once.
pub fn init_logging() {
    SUBSCRIBER.get_or_init(|| {
        let _ = tracing_log::LogTracer::init();

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_timer(UtcTime::rfc_3339());
        let file_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(FileSinkWriter);

        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .with(file_layer)
            .try_init();
    });
}

/// Starts writing JSON lines to `<dir>/rignet.log`, rotated by size.
pub fn init_file_logging(dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create logs directory {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);

    let rotate = FileRotate::new(
        &path,
        AppendCount::new(MAX_LOG_FILES),
        ContentLimit::Bytes(MAX_LOG_BYTES),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let (writer, guard) = tracing_appender::non_blocking(rotate);

    let mut sink = FILE_SINK
        .lock()
        .map_err(|_| anyhow::anyhow!("log sink lock poisoned"))?;
    *sink = Some(FileSink {
        writer,
        _guard: guard,
    });
    drop(sink);

    tracing::info!(target: "rignet", event = "file_logging_started", path = %path.display());
    Ok(path)
}

/// Flushes and closes the file sink. Later events go to stderr only.
pub fn flush_file_logs() {
    let taken = FILE_SINK.lock().ok().and_then(|mut sink| sink.take());
    drop(taken);
}
