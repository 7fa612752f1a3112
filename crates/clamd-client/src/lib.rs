//! Client for the clamd scanning daemon's control protocol.
//!
//! The daemon speaks a line-oriented protocol over a Unix domain socket or a
//! TCP socket. Each command uses its own connection: the client writes a
//! newline-mode command frame (or, for `INSTREAM`, a command frame followed by
//! length-prefixed chunks and a zero-length terminator) and then drains the
//! daemon's reply lines until the daemon closes the socket.
//!
//! # Architecture
//!
//! [`Connection`] owns the socket. It frames requests and starts a background
//! reader that publishes trimmed reply lines onto a FIFO channel and raises a
//! [`Completion`] when the daemon stops sending. The socket is released only
//! after that reader has been joined.
//!
//! [`ClamdClient`] maps the command vocabulary onto one-shot connections,
//! decoding `PING`, `RELOAD`, and `STATS` replies and passing scan replies
//! through as a [`Reply`].
//!
//! # Example
//!
//! ```rust,no_run
//! use clamd_client::{ClamdClient, EICAR};
//! use clamd_config::TransportKind;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClamdClient::from_address("/var/run/clamav/clamd.ctl", TransportKind::Unix)?;
//! client.ping()?;
//! for line in client.scan_stream(EICAR)? {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod stats;
pub mod telemetry;
mod transport;


pub use self::client::{ClamdClient, Reply};
pub use self::connection::{Completion, Connection, ReplyLines};
pub use self::error::ClamdError;
pub use self::protocol::{CHUNK_SIZE, Command, EICAR, STREAM_TERMINATOR};
pub use self::stats::Stats;
