//! Console sink implementation

use crate::core::{LogRecord, Renderer, Result};
use std::fmt;
use std::io::Write;

enum ConsoleTarget {
    Stdout,
    Stderr,
    Writer(Box<dyn Write + Send>),
}

/// Writes one rendered line per record to standard output
pub struct ConsoleSink {
    renderer: Renderer,
    target: ConsoleTarget,
}

impl ConsoleSink {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            target: ConsoleTarget::Stdout,
        }
    }

    pub fn stderr(renderer: Renderer) -> Self {
        Self {
            renderer,
            target: ConsoleTarget::Stderr,
        }
    }

    /// Write to an arbitrary target instead of stdout
    ///
    /// # Example
    ///
    /// ```
    /// use axum_structlog::sinks::ConsoleSink;
    /// use axum_structlog::Renderer;
    ///
    /// let sink = ConsoleSink::with_writer(Renderer::json(), Vec::new());
    /// ```
    pub fn with_writer<W: Write + Send + 'static>(renderer: Renderer, writer: W) -> Self {
        Self {
            renderer,
            target: ConsoleTarget::Writer(Box::new(writer)),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn write(&mut self, record: &LogRecord) -> Result<()> {
        let mut line = self.renderer.render(record);
        line.push('\n');
        match &mut self.target {
            ConsoleTarget::Stdout => std::io::stdout().lock().write_all(line.as_bytes())?,
            ConsoleTarget::Stderr => std::io::stderr().lock().write_all(line.as_bytes())?,
            ConsoleTarget::Writer(w) => w.write_all(line.as_bytes())?,
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.target {
            ConsoleTarget::Stdout => std::io::stdout().flush()?,
            ConsoleTarget::Stderr => std::io::stderr().flush()?,
            ConsoleTarget::Writer(w) => w.flush()?,
        }
        Ok(())
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            ConsoleTarget::Stdout => "stdout",
            ConsoleTarget::Stderr => "stderr",
            ConsoleTarget::Writer(_) => "writer",
        };
        f.debug_struct("ConsoleSink")
            .field("renderer", &self.renderer)
            .field("target", &target)
            .finish()
    }
}
