use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Where a command reads its input from.
pub enum Input {
    /// The process's own stdin; children inherit it directly.
    Inherit,
    Reader(Box<dyn Read + Send>),
}

/// Where a command writes output to.
pub enum Output {
    /// The process's own stdout.
    Stdout,
    /// The process's own stderr.
    Stderr,
    Writer(Box<dyn Write + Send>),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout => io::stdout().write(buf),
            Output::Stderr => io::stderr().write(buf),
            Output::Writer(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout => io::stdout().flush(),
            Output::Stderr => io::stderr().flush(),
            Output::Writer(w) => w.flush(),
        }
    }
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Input::Inherit => io::stdin().read(buf),
            Input::Reader(r) => r.read(buf),
        }
    }
}

/// A cloneable in-memory writer. Every clone appends to the same buffer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap_or_else(|e| e.into_inner());
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The environment a command runs in: working directory, standard
/// streams and the verbosity chosen by the logging flags.
pub struct Context {
    pub dir: PathBuf,
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
    pub verbose: bool,
    pub quiet: bool,
}

impl Context {
    /// A context bound to the current directory and the process streams.
    pub fn new() -> Self {
        let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            dir,
            stdin: Input::Inherit,
            stdout: Output::Stdout,
            stderr: Output::Stderr,
            verbose: false,
            quiet: false,
        }
    }

    /// Resolves `path` against the context directory.
    pub fn abs_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let p = path.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }

    /// Writes an informational message to stderr unless quiet.
    pub fn infof(&mut self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        log::info!("{}", msg);
        if !self.quiet {
            let _ = writeln!(self.stderr, "{}", msg);
        }
    }

    /// Writes a message to stderr only in verbose mode.
    pub fn verbosef(&mut self, msg: impl AsRef<str>) {
        if self.verbose {
            let msg = msg.as_ref();
            log::info!("{}", msg);
            let _ = writeln!(self.stderr, "{}", msg);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing;

    #[test]
    fn test_verbosity_gates_messages() {
        let (mut ctx, out) = testing::context();
        ctx.verbosef("hidden");
        ctx.infof("shown");
        ctx.verbose = true;
        ctx.verbosef("detail");
        ctx.quiet = true;
        ctx.infof("quiet");
        assert_eq!(out.stderr(), "shown\ndetail\n");
    }
}
