//! Shared configuration for the clamd client.
//!
//! The crate describes where the daemon listens, how long socket operations
//! may block, and how diagnostics are rendered. It owns no file format:
//! [`Config`] is a plain serde record that callers embed in whatever document
//! their application already loads.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT, DEFAULT_UNIX_SOCKET, default_log_filter,
    default_log_filter_string, default_log_format, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, TransportKind};

/// Optional deadlines applied to a daemon connection.
///
/// Every deadline defaults to `None`, which blocks indefinitely. A stalled
/// daemon therefore stalls the caller unless a deadline is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound on establishing the socket connection.
    pub connect: Option<Duration>,
    /// Upper bound on a single blocking read while draining a reply.
    pub read: Option<Duration>,
    /// Upper bound on a single blocking write while framing a request.
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Returns a set of timeouts that never expire.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            connect: None,
            read: None,
            write: None,
        }
    }

    /// Applies the same deadline to connect, read, and write.
    #[must_use]
    pub const fn uniform(deadline: Duration) -> Self {
        Self {
            connect: Some(deadline),
            read: Some(deadline),
            write: Some(deadline),
        }
    }
}

/// Client configuration record.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Where the daemon listens.
    pub daemon_socket: SocketEndpoint,
    /// Connect deadline in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Per-read deadline in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Per-write deadline in milliseconds.
    pub write_timeout_ms: Option<u64>,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log rendering format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Builds a configuration pointing at `endpoint` with default settings.
    #[must_use]
    pub fn for_endpoint(endpoint: SocketEndpoint) -> Self {
        Self {
            daemon_socket: endpoint,
            ..Self::default()
        }
    }

    /// Endpoint the client dials.
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// Socket deadlines derived from the millisecond settings.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: self.connect_timeout_ms.map(Duration::from_millis),
            read: self.read_timeout_ms.map(Duration::from_millis),
            write: self.write_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for the tracing subscriber.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
