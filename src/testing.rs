//! Helpers for exercising commands without touching the real terminal.

use std::io;
use std::path::PathBuf;

use crate::context::{Context, Input, Output, SharedBuffer};

/// Handles onto the buffers behind a context built by [`context`].
#[derive(Clone)]
pub struct Captured {
    stdout: SharedBuffer,
    stderr: SharedBuffer,
}

impl Captured {
    pub fn stdout(&self) -> String {
        self.stdout.contents()
    }

    pub fn stderr(&self) -> String {
        self.stderr.contents()
    }
}

/// A context with empty stdin and in-memory stdout/stderr, rooted at the
/// current directory.
pub fn context() -> (Context, Captured) {
    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    context_in(dir)
}

pub fn context_in(dir: impl Into<PathBuf>) -> (Context, Captured) {
    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();
    let ctx = Context {
        dir: dir.into(),
        stdin: Input::Reader(Box::new(io::empty())),
        stdout: Output::Writer(Box::new(stdout.clone())),
        stderr: Output::Writer(Box::new(stderr.clone())),
        verbose: false,
        quiet: false,
    };
    (ctx, Captured { stdout, stderr })
}
