//! The daemon's command vocabulary.
//!
//! Every operation opens a fresh [`Connection`], issues one request, and hands
//! the reply back. Replies that callers consume as raw lines are returned as a
//! [`Reply`]; the connection behind it is released on a background thread once
//! the reader has drained the socket.

use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use camino::Utf8PathBuf;
use clamd_config::{Config, SocketEndpoint, SocketParseError, Timeouts, TransportKind};
use tracing::{debug, warn};

use crate::connection::{Completion, Connection, ReplyLines};
use crate::error::ClamdError;
use crate::protocol::{CHUNK_SIZE, Command};
use crate::stats::Stats;

/// Tracing target for command-level events.
const CLIENT_TARGET: &str = "clamd_client::client";

/// Handle for issuing commands to one daemon endpoint.
///
/// The client holds no socket; each call dials its own connection.
#[derive(Debug, Clone)]
pub struct ClamdClient {
    endpoint: SocketEndpoint,
    timeouts: Timeouts,
}

impl ClamdClient {
    /// Creates a client for `endpoint` with no deadlines.
    #[must_use]
    pub const fn new(endpoint: SocketEndpoint) -> Self {
        Self {
            endpoint,
            timeouts: Timeouts::none(),
        }
    }

    /// Creates a client from a bare address and transport selector.
    pub fn from_address(address: &str, kind: TransportKind) -> Result<Self, SocketParseError> {
        SocketEndpoint::from_address(address, kind).map(Self::new)
    }

    /// Creates a client from shared configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.daemon_socket().clone(),
            timeouts: config.timeouts(),
        }
    }

    /// Replaces the socket deadlines.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Endpoint the client dials.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Opens a connection to the configured endpoint.
    pub fn connect(&self) -> Result<Connection, ClamdError> {
        Connection::connect(&self.endpoint, &self.timeouts)
    }

    /// Sends `command` on a fresh connection and returns the raw reply.
    pub fn command(&self, command: &Command) -> Result<Reply, ClamdError> {
        let mut connection = self.connect()?;
        connection.send_command(command)?;
        let (lines, completion) = connection.read_response()?;
        Reply::release_after_drain(connection, lines, completion)
    }

    /// Checks that the daemon answers `PONG`.
    pub fn ping(&self) -> Result<(), ClamdError> {
        let lines = self.command(&Command::Ping)?.collect_lines()?;
        expect_single_token(&Command::Ping, "PONG", lines)
    }

    /// Program and database version lines.
    pub fn version(&self) -> Result<Reply, ClamdError> {
        self.command(&Command::Version)
    }

    /// Scan queue and memory statistics.
    pub fn stats(&self) -> Result<Stats, ClamdError> {
        let mut reply = self.command(&Command::Stats)?;
        let stats = Stats::from_lines(reply.by_ref());
        reply.wait()?;
        Ok(stats)
    }

    /// Asks the daemon to reload its signature databases.
    pub fn reload(&self) -> Result<(), ClamdError> {
        let lines = self.command(&Command::Reload)?.collect_lines()?;
        expect_single_token(&Command::Reload, "RELOADING", lines)
    }

    /// Asks the daemon to exit. The reply, if any, is not inspected.
    pub fn shutdown(&self) -> Result<(), ClamdError> {
        let reply = self.command(&Command::Shutdown)?;
        debug!(target: CLIENT_TARGET, endpoint = %self.endpoint, "shutdown requested");
        drop(reply);
        Ok(())
    }

    /// Scans a file or directory with archive support.
    pub fn scan_file(&self, path: impl Into<Utf8PathBuf>) -> Result<Reply, ClamdError> {
        self.command(&Command::Scan(path.into()))
    }

    /// Scans with archive and special file support disabled.
    pub fn raw_scan_file(&self, path: impl Into<Utf8PathBuf>) -> Result<Reply, ClamdError> {
        self.command(&Command::RawScan(path.into()))
    }

    /// Scans using the daemon's thread pool.
    pub fn multi_scan_file(&self, path: impl Into<Utf8PathBuf>) -> Result<Reply, ClamdError> {
        self.command(&Command::MultiScan(path.into()))
    }

    /// Scans without stopping at the first detection.
    pub fn cont_scan_file(&self, path: impl Into<Utf8PathBuf>) -> Result<Reply, ClamdError> {
        self.command(&Command::ContScan(path.into()))
    }

    /// Scans and reports every matching signature.
    pub fn all_match_scan_file(&self, path: impl Into<Utf8PathBuf>) -> Result<Reply, ClamdError> {
        self.command(&Command::AllMatchScan(path.into()))
    }

    /// Uploads `source` with `INSTREAM` and returns the scan reply.
    ///
    /// The source is forwarded in chunks of at most [`CHUNK_SIZE`] bytes. A
    /// zero-length read ends the upload, and so does a failing read: the
    /// terminator is what tells the daemon the stream is over. A write failure
    /// aborts without a terminator and the connection is discarded.
    pub fn scan_stream<R: Read>(&self, mut source: R) -> Result<Reply, ClamdError> {
        let mut connection = self.connect()?;
        connection.send_command(&Command::InStream)?;

        let mut buffer = [0_u8; CHUNK_SIZE];
        let mut chunks = 0_usize;
        let mut bytes = 0_usize;
        loop {
            let filled = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(filled) => filled,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    warn!(
                        target: CLIENT_TARGET,
                        error = %error,
                        bytes,
                        "upload source failed; terminating stream"
                    );
                    break;
                }
            };
            let Some(chunk) = buffer.get(..filled) else {
                break;
            };
            connection.send_chunk(chunk)?;
            chunks += 1;
            bytes += filled;
        }
        connection.send_eof()?;
        debug!(
            target: CLIENT_TARGET,
            endpoint = %self.endpoint,
            chunks,
            bytes,
            "stream upload complete"
        );

        let (lines, completion) = connection.read_response()?;
        Reply::release_after_drain(connection, lines, completion)
    }
}

fn expect_single_token(
    command: &Command,
    token: &str,
    lines: Vec<String>,
) -> Result<(), ClamdError> {
    match lines.as_slice() {
        [only] if only == token => Ok(()),
        _ => Err(ClamdError::InvalidResponse {
            command: command.keyword(),
            response: lines.join("\n"),
        }),
    }
}

/// Raw reply to a command.
///
/// Iterating yields the daemon's lines in order, each at most once. The
/// connection is released in the background after the reader finishes;
/// [`Reply::wait`] joins that release and reports any read failure.
#[derive(Debug)]
pub struct Reply {
    lines: ReplyLines,
    completion: Completion,
    release: JoinHandle<Result<(), ClamdError>>,
}

impl Reply {
    fn release_after_drain(
        connection: Connection,
        lines: ReplyLines,
        completion: Completion,
    ) -> Result<Self, ClamdError> {
        let release = thread::Builder::new()
            .name(String::from("clamd-release"))
            .spawn(move || connection.close())
            .map_err(ClamdError::read)?;
        Ok(Self {
            lines,
            completion,
            release,
        })
    }

    /// Signal raised once the daemon has stopped sending.
    #[must_use]
    pub const fn completion(&self) -> &Completion {
        &self.completion
    }

    /// Discards unread lines and waits for the connection to be released.
    pub fn wait(mut self) -> Result<(), ClamdError> {
        self.lines.by_ref().for_each(drop);
        self.release
            .join()
            .map_err(|_| ClamdError::ReaderPanicked)?
    }

    /// Collects the remaining lines, then waits for release.
    pub fn collect_lines(mut self) -> Result<Vec<String>, ClamdError> {
        let lines: Vec<String> = self.lines.by_ref().collect();
        self.wait()?;
        Ok(lines)
    }
}

impl Iterator for Reply {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}
