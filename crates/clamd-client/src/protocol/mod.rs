//! Wire vocabulary and framing for the clamd control protocol.
//!
//! Commands are sent in newline-terminated mode: a single `n` byte selects the
//! reply style, followed by the command text and `\n`. `INSTREAM` uploads follow
//! the command frame with length-prefixed chunks and a zero-length terminator.

use std::fmt;

use camino::Utf8PathBuf;

use crate::error::ClamdError;

/// Prefix byte selecting newline-terminated replies.
pub const REPLY_MODE_NEWLINE: u8 = b'n';

/// Maximum number of bytes forwarded per `INSTREAM` chunk.
pub const CHUNK_SIZE: usize = 1024;

/// Zero-length chunk frame that ends an `INSTREAM` upload.
pub const STREAM_TERMINATOR: [u8; 4] = [0, 0, 0, 0];

/// The EICAR anti-malware test signature.
///
/// Every compliant scanner reports this payload as a detection, which makes it
/// suitable for end-to-end self tests of a scanning pipeline.
pub const EICAR: &[u8] = br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Commands understood by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe, answered with `PONG`.
    Ping,
    /// Program and signature database versions.
    Version,
    /// Scan queue and memory statistics.
    Stats,
    /// Reload the signature databases.
    Reload,
    /// Stop the daemon.
    Shutdown,
    /// Scan a file or directory with archive support.
    Scan(Utf8PathBuf),
    /// Scan with archive and special file support disabled.
    RawScan(Utf8PathBuf),
    /// Scan using multiple daemon threads.
    MultiScan(Utf8PathBuf),
    /// Scan without stopping at the first detection.
    ContScan(Utf8PathBuf),
    /// Scan reporting every matching signature.
    AllMatchScan(Utf8PathBuf),
    /// Scan a chunked byte stream sent on the same socket.
    InStream,
}

impl Command {
    /// Protocol keyword for the command.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Version => "VERSION",
            Self::Stats => "STATS",
            Self::Reload => "RELOAD",
            Self::Shutdown => "SHUTDOWN",
            Self::Scan(_) => "SCAN",
            Self::RawScan(_) => "RAWSCAN",
            Self::MultiScan(_) => "MULTISCAN",
            Self::ContScan(_) => "CONTSCAN",
            Self::AllMatchScan(_) => "ALLMATCHSCAN",
            Self::InStream => "INSTREAM",
        }
    }

    /// Target path for the path-scanning commands.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Scan(path)
            | Self::RawScan(path)
            | Self::MultiScan(path)
            | Self::ContScan(path)
            | Self::AllMatchScan(path) => Some(path),
            Self::Ping
            | Self::Version
            | Self::Stats
            | Self::Reload
            | Self::Shutdown
            | Self::InStream => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Some(path) => write!(formatter, "{} {path}", self.keyword()),
            None => formatter.write_str(self.keyword()),
        }
    }
}

/// Encodes a command frame: mode byte, command text, newline.
#[must_use]
pub fn encode_command(command: &Command) -> Vec<u8> {
    let text = command.to_string();
    let mut frame = Vec::with_capacity(text.len() + 2);
    frame.push(REPLY_MODE_NEWLINE);
    frame.extend_from_slice(text.as_bytes());
    frame.push(b'\n');
    frame
}

/// Encodes one `INSTREAM` data chunk: a big-endian `u32` length and the payload.
///
/// Empty chunks are rejected because the zero-length frame is reserved for
/// [`STREAM_TERMINATOR`].
pub fn encode_chunk(data: &[u8]) -> Result<Vec<u8>, ClamdError> {
    if data.is_empty() {
        return Err(ClamdError::EmptyChunk);
    }
    let len = u32::try_from(data.len())
        .map_err(|_| ClamdError::ChunkTooLarge { len: data.len() })?;
    let mut frame = Vec::with_capacity(data.len() + STREAM_TERMINATOR.len());
    frame.extend_from_slice(&length_prefix(len));
    frame.extend_from_slice(data);
    Ok(frame)
}

#[expect(
    clippy::big_endian_bytes,
    reason = "the chunk length prefix is defined in network byte order"
)]
const fn length_prefix(len: u32) -> [u8; 4] {
    len.to_be_bytes()
}

/// Strips the trailing whitespace and line terminator from a reply line.
#[must_use]
pub fn trim_reply_line(line: &str) -> &str {
    line.trim_end_matches([' ', '\t', '\r', '\n'])
}
