//! One-shot daemon connections.
//!
//! A [`Connection`] frames requests onto a single socket and drains the reply
//! on a background reader thread. The reader publishes trimmed lines in arrival
//! order onto a FIFO channel exposed as [`ReplyLines`], and raises a
//! [`Completion`] once the daemon has closed its side or a read has failed.
//!
//! The socket is only released by [`Connection::close`], which joins the
//! reader before dropping the stream. Release is therefore gated on the drain
//! having finished, not on the connection value going out of scope.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clamd_config::{SocketEndpoint, Timeouts, TransportKind};
use tracing::{debug, trace, warn};

use crate::error::ClamdError;
use crate::protocol::{self, Command, STREAM_TERMINATOR};
use crate::transport::{self, Stream};

/// Tracing target for connection-level events.
const CONNECTION_TARGET: &str = "clamd_client::connection";

/// A live socket to the daemon, used for exactly one command.
#[derive(Debug)]
pub struct Connection {
    stream: Stream,
    endpoint: String,
    reader: Option<JoinHandle<Result<usize, ClamdError>>>,
}

impl Connection {
    /// Dials a bare address using the requested transport.
    ///
    /// A TCP address that is not `host:port` fails here as a connect error,
    /// like any other transport-level dial failure.
    pub fn open(address: &str, kind: TransportKind) -> Result<Self, ClamdError> {
        let endpoint = SocketEndpoint::from_address(address, kind).map_err(|error| {
            ClamdError::connect(address, io::Error::new(io::ErrorKind::InvalidInput, error))
        })?;
        Self::connect(&endpoint, &Timeouts::none())
    }

    /// Dials a typed endpoint, applying the given deadlines.
    pub fn connect(endpoint: &SocketEndpoint, timeouts: &Timeouts) -> Result<Self, ClamdError> {
        let stream = transport::connect(endpoint, timeouts)?;
        debug!(
            target: CONNECTION_TARGET,
            endpoint = %endpoint,
            "connected to daemon"
        );
        Ok(Self {
            stream,
            endpoint: endpoint.to_string(),
            reader: None,
        })
    }

    /// Display form of the dialled endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Writes a newline-mode command frame in a single write.
    pub fn send_command(&mut self, command: &Command) -> Result<(), ClamdError> {
        self.ensure_idle()?;
        debug!(
            target: CONNECTION_TARGET,
            endpoint = %self.endpoint,
            command = command.keyword(),
            "sending command"
        );
        self.write_frame(&protocol::encode_command(command))
    }

    /// Writes one length-prefixed `INSTREAM` chunk.
    ///
    /// `data` must be non-empty; use [`Connection::send_eof`] to end the stream.
    pub fn send_chunk(&mut self, data: &[u8]) -> Result<(), ClamdError> {
        self.ensure_idle()?;
        let frame = protocol::encode_chunk(data)?;
        self.write_frame(&frame)
    }

    /// Writes the zero-length terminator that ends an `INSTREAM` upload.
    pub fn send_eof(&mut self) -> Result<(), ClamdError> {
        self.ensure_idle()?;
        self.write_frame(&STREAM_TERMINATOR)
    }

    /// Starts the background reader and returns the reply sequence with its
    /// completion signal.
    ///
    /// Only one reader may run per connection; a second call fails with
    /// [`ClamdError::ReaderAlreadyStarted`].
    pub fn read_response(&mut self) -> Result<(ReplyLines, Completion), ClamdError> {
        self.ensure_idle()?;
        let read_half = self.stream.try_clone().map_err(ClamdError::read)?;
        let (sender, receiver) = mpsc::channel();
        let completion = Completion::new();
        let signal = completion.clone();
        let endpoint = self.endpoint.clone();

        let handle = thread::Builder::new()
            .name(String::from("clamd-reply-reader"))
            .spawn(move || {
                let _raise = RaiseOnDrop(signal);
                drain_replies(read_half, sender, &endpoint)
            })
            .map_err(ClamdError::read)?;

        self.reader = Some(handle);
        Ok((ReplyLines { receiver }, completion))
    }

    /// Releases the socket once the reply has been drained.
    ///
    /// Blocks until the reader has observed EOF or a read failure, then drops
    /// the stream. Returns the reader's failure, if any. A connection with no
    /// reader is released immediately.
    pub fn close(self) -> Result<(), ClamdError> {
        let Self {
            stream,
            endpoint,
            reader,
        } = self;
        let outcome = match reader {
            Some(handle) => match handle.join() {
                Ok(result) => result.map(|lines| {
                    trace!(target: CONNECTION_TARGET, endpoint = %endpoint, lines, "reply drained");
                }),
                Err(_) => Err(ClamdError::ReaderPanicked),
            },
            None => Ok(()),
        };
        drop(stream);
        debug!(target: CONNECTION_TARGET, endpoint = %endpoint, "connection released");
        outcome
    }

    const fn ensure_idle(&self) -> Result<(), ClamdError> {
        if self.reader.is_some() {
            return Err(ClamdError::ReaderAlreadyStarted);
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ClamdError> {
        self.stream.write_all(frame).map_err(ClamdError::write)?;
        self.stream.flush().map_err(ClamdError::write)
    }
}

/// Reads lines until EOF or error, publishing each one in arrival order.
///
/// If the consumer drops its end early the loop keeps reading, discarding
/// lines, so completion still means the daemon has finished writing.
fn drain_replies(
    stream: Stream,
    sender: Sender<String>,
    endpoint: &str,
) -> Result<usize, ClamdError> {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    let mut published = 0_usize;
    let mut consumer_attached = true;

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => {
                debug!(
                    target: CONNECTION_TARGET,
                    endpoint,
                    published,
                    "daemon closed reply stream"
                );
                return Ok(published);
            }
            Ok(_) => {
                if !consumer_attached {
                    continue;
                }
                let text = String::from_utf8_lossy(&buffer);
                let line = protocol::trim_reply_line(&text).to_owned();
                if sender.send(line).is_ok() {
                    published += 1;
                } else {
                    trace!(target: CONNECTION_TARGET, endpoint, "reply consumer detached");
                    consumer_attached = false;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                warn!(
                    target: CONNECTION_TARGET,
                    endpoint,
                    published,
                    error = %error,
                    "reply stream failed"
                );
                return Err(ClamdError::read(error));
            }
        }
    }
}

/// The ordered, single-pass sequence of reply lines.
///
/// Iteration blocks until the next line arrives and ends once the reader has
/// stopped. A final line the daemon leaves without a newline is still
/// published when the socket closes, rather than discarded.
#[derive(Debug)]
pub struct ReplyLines {
    receiver: Receiver<String>,
}

impl Iterator for ReplyLines {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

/// Signal raised once the reply reader has permanently stopped.
#[derive(Debug, Clone)]
pub struct Completion {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Completion {
    fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    fn raise(&self) {
        let (lock, cvar) = &*self.inner;
        let mut complete = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *complete = true;
        cvar.notify_all();
    }

    /// Returns true once the reader has stopped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the reader has stopped.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut complete = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*complete {
            complete = cvar.wait(complete).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks for at most `limit`; returns whether the reader has stopped.
    ///
    /// A limit too large to express as a deadline waits without bound.
    #[must_use]
    pub fn wait_timeout(&self, limit: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(limit) else {
            self.wait();
            return true;
        };
        let (lock, cvar) = &*self.inner;
        let mut complete = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*complete {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            complete = cvar
                .wait_timeout(complete, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Raises the completion signal when the reader thread unwinds or returns.
struct RaiseOnDrop(Completion);

impl Drop for RaiseOnDrop {
    fn drop(&mut self) {
        self.0.raise();
    }
}
