// (C) 2025 - Enzo Lombardi

//! Fatal error type for the console host.
//!
//! Per-request failures are never represented here — they travel back to
//! the caller as a [`crate::protocol::Status`] alongside the reply, because
//! a single bad request must not unwind the dispatcher loop. This type is
//! reserved for the handful of conditions that really do end the process:
//! a broken transport handle, a scratch-buffer allocation failure at
//! startup, or a transport call that fails mid-loop.

use std::backtrace::Backtrace;
use std::fmt::{Display, Formatter};

/// Error type for fatal console host failures.
#[derive(Debug)]
pub struct ConsoleHostError {
    kind: ErrorKind,
    backtrace: Backtrace,
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    /// I/O operation failed (tty write, transport read/write).
    Io(std::io::Error),

    /// The transport handle supplied at startup was unusable.
    TransportInit(String),

    /// A scratch buffer or screen buffer could not be allocated.
    NoMemory(String),

    /// Command-line bootstrap failed (unknown option, missing value).
    Bootstrap(String),
}

impl ConsoleHostError {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn transport_init(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportInit(msg.into()))
    }

    pub fn no_memory(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoMemory(msg.into()))
    }

    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Bootstrap(msg.into()))
    }

    /// Returns `true` if this error is an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Io(_))
    }

    /// Returns `true` if this error is a transport initialization error.
    pub fn is_transport_init(&self) -> bool {
        matches!(self.kind, ErrorKind::TransportInit(_))
    }
}

impl Display for ConsoleHostError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ErrorKind::Io(e) => write!(f, "I/O error: {}", e)?,
            ErrorKind::TransportInit(msg) => write!(f, "transport initialization failed: {}", msg)?,
            ErrorKind::NoMemory(msg) => write!(f, "allocation failed: {}", msg)?,
            ErrorKind::Bootstrap(msg) => write!(f, "bootstrap failed: {}", msg)?,
        }

        if self.backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            write!(f, "\n\nBacktrace:\n{}", self.backtrace)?;
        }

        Ok(())
    }
}

impl std::error::Error for ConsoleHostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConsoleHostError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(e))
    }
}

/// Result type for fatal console host operations.
pub type Result<T> = std::result::Result<T, ConsoleHostError>;
