//! Output routing for engine runs.
//!
//! The engine may write to its standard output and standard error from
//! independent threads during a single run, so every caller-facing sink is
//! wrapped in an [`OutputSink`]: a cloneable handle that serializes writes
//! through a mutex. Cloning the handle shares the underlying writer, which
//! is how combined forwarding routes both streams into one destination
//! without interleaving corruption.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A shared, thread-safe destination for engine output bytes.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl OutputSink {
    /// Wrap a caller-supplied writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A sink mirroring the harness process's own standard output, used by
    /// combined forwarding.
    pub fn process_stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Write one chunk atomically: the lock is held for the whole chunk, so
    /// concurrent writers never interleave within it.
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(bytes)?;
        writer.flush()
    }

    /// Whether two handles share the same underlying writer.
    pub(crate) fn shares_writer_with(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OutputSink")
    }
}
