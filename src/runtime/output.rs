//! Output relay for running code
//!
//! Every write made through an [`OutputRelay`] is forwarded to its sink and
//! then suspends the worker with a refresh request, so the driver gets a
//! chance to redraw after each unit of output.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::Interrupted;
use super::worker::WorkerContext;

/// `io::Write` adapter that yields to the driver after every write.
pub struct OutputRelay<'w, W> {
    worker: &'w WorkerContext,
    sink: W,
}

impl<'w, W: Write> OutputRelay<'w, W> {
    /// Relay writes to `sink` on behalf of `worker`.
    pub fn new(worker: &'w WorkerContext, sink: W) -> Self {
        Self { worker, sink }
    }

    /// Write `data` as one unit of output.
    ///
    /// An interrupt delivered while suspended comes back as an `io::Error`
    /// recognised by [`Interrupted::in_io`](super::error::Interrupted::in_io).
    pub fn relay(&mut self, data: &str) -> io::Result<()> {
        self.write_all(data.as_bytes())
    }

    /// Write each item as its own unit of output.
    pub fn relay_lines<I, S>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.relay(line.as_ref())?;
        }
        Ok(())
    }

    /// Relayed output always reports itself as interactive.
    pub fn is_terminal(&self) -> bool {
        true
    }

    /// Recover the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write> Write for OutputRelay<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A cancelled worker no longer owns the sink.
        if self.worker.is_cancelled() {
            return Err(Interrupted.into());
        }
        self.sink.write_all(buf)?;
        // The resumed value carries nothing for output; only an interrupt matters.
        self.worker.request_refresh()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W> fmt::Debug for OutputRelay<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputRelay")
            .field("worker", &self.worker.id())
            .finish()
    }
}

/// A cloneable handle on one writer, shared by the driver and the worker.
///
/// Only one side runs at a time, so the lock is never contended in practice.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<dyn Write + Send>>,
}

impl SharedSink {
    /// Share `writer`.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Share a writer the caller keeps a handle on (for example a captured
    /// `Vec<u8>` in tests).
    pub fn from_shared<W: Write + Send + 'static>(writer: Arc<Mutex<W>>) -> Self {
        Self { inner: writer }
    }

    /// A sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.lock().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl fmt::Debug for SharedSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_sink_writes_through() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mut sink = SharedSink::from_shared(Arc::clone(&buffer));
        let mut clone = sink.clone();

        sink.write_all(b"one ").unwrap();
        clone.write_all(b"two").unwrap();
        clone.flush().unwrap();

        assert_eq!(&*buffer.lock(), b"one two");
    }
}
