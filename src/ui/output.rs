//! Shared terminal handles

use console::Term;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// A writer shared between the result printer and the stdout stream sink.
///
/// Both write to the same handle, so each write takes the lock and flushes
/// before releasing it. Lines from different writers never interleave.
#[derive(Clone)]
pub struct SharedOutput {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedOutput {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Term::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(Term::stderr())
    }

    /// Writer that discards everything.
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    /// In-memory writer plus a handle to read back what was written.
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = CapturedOutput::default();
        (Self::new(buffer.clone()), buffer)
    }

    pub fn write_str(&self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.lock();
        writer.write_all(bytes)?;
        writer.flush()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bytes collected by [`SharedOutput::capture`].
#[derive(Clone, Default)]
pub struct CapturedOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
