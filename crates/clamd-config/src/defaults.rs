use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Port clamd listens on when `TCPSocket` is enabled without an override.
pub const DEFAULT_TCP_PORT: u16 = 3310;

/// Local socket path used by the stock clamd packaging.
pub const DEFAULT_UNIX_SOCKET: &str = "/var/run/clamav/clamd.ctl";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Endpoint used when the caller does not name one.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::unix(DEFAULT_UNIX_SOCKET)
}
