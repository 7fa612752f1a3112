//! Socket transport for daemon connections.
//!
//! Dials either transport and wraps the result in a uniform [`Stream`] so the
//! framing and reader logic stay transport agnostic.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

#[cfg(unix)]
use socket2::{Domain, SockAddr, Socket, Type};

use clamd_config::{SocketEndpoint, Timeouts};

use crate::error::ClamdError;

/// A connected stream socket of either family.
#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Duplicates the socket handle so a reader thread can own its half.
    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    fn apply_timeouts(&self, timeouts: &Timeouts) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => {
                stream.set_read_timeout(timeouts.read)?;
                stream.set_write_timeout(timeouts.write)
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                stream.set_read_timeout(timeouts.read)?;
                stream.set_write_timeout(timeouts.write)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Dials `endpoint`, honouring any configured deadlines.
pub(crate) fn connect(endpoint: &SocketEndpoint, timeouts: &Timeouts) -> Result<Stream, ClamdError> {
    let stream = dial(endpoint, timeouts.connect)
        .map_err(|source| ClamdError::connect(endpoint.to_string(), source))?;
    stream
        .apply_timeouts(timeouts)
        .map_err(|source| ClamdError::connect(endpoint.to_string(), source))?;
    Ok(stream)
}

fn dial(endpoint: &SocketEndpoint, deadline: Option<Duration>) -> io::Result<Stream> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(host, *port)?;
            let stream = match deadline {
                Some(limit) => TcpStream::connect_timeout(&address, limit)?,
                None => TcpStream::connect(address)?,
            };
            Ok(Stream::Tcp(stream))
        }
        SocketEndpoint::Unix { path } => {
            #[cfg(unix)]
            {
                connect_unix(path.as_str(), deadline)
            }

            #[cfg(not(unix))]
            {
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("platform does not support Unix sockets: {path}"),
                ))
            }
        }
    }
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}

#[cfg(unix)]
fn connect_unix(path: &str, deadline: Option<Duration>) -> io::Result<Stream> {
    let Some(limit) = deadline else {
        return UnixStream::connect(path).map(Stream::Unix);
    };
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, limit)?;
    Ok(Stream::Unix(UnixStream::from(OwnedFd::from(socket))))
}
