//! Console output sink
//!
//! User-facing text output of the driver. Diagnostics go through `tracing`;
//! this is what the person running a test script reads.

use parking_lot::Mutex;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable handle to the output and error streams
#[derive(Clone)]
pub struct Console {
    out: Sink,
    err: Sink,
    verbose: bool,
}

impl Console {
    /// Console writing to the process stdout/stderr
    pub fn stdio(verbose: bool) -> Self {
        Self::with_writers(io::stdout(), io::stderr(), verbose)
    }

    pub fn with_writers(
        out: impl Write + Send + 'static,
        err: impl Write + Send + 'static,
        verbose: bool,
    ) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            err: Arc::new(Mutex::new(Box::new(err))),
            verbose,
        }
    }

    /// Console capturing everything into a single buffer
    pub fn captured(verbose: bool) -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let console = Self::with_writers(buffer.clone(), buffer.clone(), verbose);
        (console, buffer)
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn print(&self, text: impl Display) {
        Self::emit(&self.out, text);
    }

    /// Printed only in verbose mode
    pub fn print_verbose(&self, text: impl Display) {
        if self.verbose {
            Self::emit(&self.out, text);
        }
    }

    pub fn print_error(&self, text: impl Display) {
        Self::emit(&self.err, text);
    }

    fn emit(sink: &Sink, text: impl Display) {
        let mut sink = sink.lock();
        // Console output is best effort; a closed pipe must not fail a session operation
        let _ = write!(sink, "{}", text);
        let _ = sink.flush();
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// In-memory writer shared between clones
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
