//! Errors raised while talking to the daemon.
//!
//! I/O errors are wrapped in `Arc` so [`ClamdError`] stays cheap to clone and
//! small enough for the `result_large_err` Clippy lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from connection and command operations.
#[derive(Debug, Clone, Error)]
pub enum ClamdError {
    /// The socket could not be dialled or its address could not be resolved.
    #[error("failed to connect to daemon at {endpoint}: {source}")]
    Connect {
        /// Display form of the endpoint that was dialled.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing a command or chunk frame failed.
    #[error("failed to send request to daemon: {source}")]
    Write {
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Draining the reply stream failed.
    #[error("failed to read response from daemon: {source}")]
    Read {
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The daemon answered a command with something other than the expected token.
    #[error("invalid response to {command}, got {response:?}")]
    InvalidResponse {
        /// Command that was issued.
        command: &'static str,
        /// Text the daemon sent back.
        response: String,
    },

    /// A zero-length chunk was passed where a data chunk is required.
    #[error("stream chunks must not be empty; the empty frame is the stream terminator")]
    EmptyChunk,

    /// A chunk exceeds what a 32-bit length prefix can describe.
    #[error("stream chunk of {len} bytes exceeds the 4-byte length prefix")]
    ChunkTooLarge {
        /// Length of the rejected chunk.
        len: usize,
    },

    /// `read_response` was called twice on the same connection.
    #[error("a reply reader is already running on this connection")]
    ReaderAlreadyStarted,

    /// The background reply reader terminated abnormally.
    #[error("reply reader thread panicked")]
    ReaderPanicked,
}

impl ClamdError {
    pub(crate) fn connect(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn write(source: io::Error) -> Self {
        Self::Write {
            source: Arc::new(source),
        }
    }

    pub(crate) fn read(source: io::Error) -> Self {
        Self::Read {
            source: Arc::new(source),
        }
    }

    /// Returns true when the daemon is most likely not listening.
    #[must_use]
    pub fn is_daemon_unavailable(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::AddrNotAvailable
            ),
            _ => false,
        }
    }
}
