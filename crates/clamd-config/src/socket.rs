use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use url::Url;

/// Socket family used to reach the daemon.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TransportKind {
    /// Local domain socket addressed by a filesystem path.
    #[default]
    Unix,
    /// TCP socket addressed by `host:port`.
    Tcp,
}

/// Declarative description of where the daemon listens.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint.
    Tcp { host: String, port: u16 },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Interprets a bare address according to the requested transport.
    ///
    /// Unix addresses are taken as filesystem paths. TCP addresses must be
    /// `host:port`; IPv6 hosts may be bracketed (`[::1]:3310`).
    pub fn from_address(address: &str, kind: TransportKind) -> Result<Self, SocketParseError> {
        match kind {
            TransportKind::Unix => {
                if address.is_empty() {
                    return Err(SocketParseError::MissingUnixPath(address.to_owned()));
                }
                Ok(Self::unix(address))
            }
            TransportKind::Tcp => {
                let (host, port) = address
                    .rsplit_once(':')
                    .ok_or_else(|| SocketParseError::MissingPort(address.to_owned()))?;
                let host = strip_brackets(host);
                if host.is_empty() {
                    return Err(SocketParseError::MissingHost(address.to_owned()));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|source| SocketParseError::InvalidPort {
                        input: address.to_owned(),
                        source,
                    })?;
                Ok(Self::tcp(host, port))
            }
        }
    }

    /// Returns the transport family of this endpoint.
    #[must_use]
    pub const fn transport(&self) -> TransportKind {
        match self {
            Self::Unix { .. } => TransportKind::Unix,
            Self::Tcp { .. } => TransportKind::Tcp,
        }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host)
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                let path = url.path();
                if path.is_empty() {
                    return Err(SocketParseError::MissingUnixPath(input.to_owned()));
                }
                Ok(Self::unix(path))
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .map(strip_brackets)
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// TCP port was not a valid 16-bit number.
    #[error("invalid TCP port in '{input}': {source}")]
    InvalidPort {
        input: String,
        #[source]
        source: ParseIntError,
    },
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
