//! Fake clamd used by unit and behavioural tests.
//!
//! The daemon accepts a single connection, decodes the command frame (and the
//! chunked body for `INSTREAM`), records what it saw, and answers with lines
//! produced by its [`DaemonScript`].

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::os::unix::net::UnixListener;

use anyhow::{Context, Result, anyhow, bail};
use clamd_config::SocketEndpoint;
use tempfile::TempDir;

const ACCEPT_DEADLINE: Duration = Duration::from_secs(5);

/// Detection line emitted for uploads carrying the EICAR signature.
pub(crate) const EICAR_DETECTION: &str = "stream: Eicar-Test-Signature FOUND";

type Responder = Box<dyn FnOnce(&ReceivedRequest) -> Vec<String> + Send>;

/// What the fake daemon decoded from the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReceivedRequest {
    /// Every byte the client wrote before the daemon replied.
    pub raw: Vec<u8>,
    /// Command text without the mode byte or newline.
    pub command: String,
    /// Lengths of the `INSTREAM` chunks in arrival order.
    pub chunk_lengths: Vec<u32>,
    /// Reassembled `INSTREAM` payload.
    pub body: Vec<u8>,
    /// Whether the zero-length terminator arrived.
    pub terminated: bool,
}

/// Scripted daemon behaviour for one connection.
pub(crate) struct DaemonScript {
    responder: Responder,
    line_delay: Duration,
    stall_before_close: Duration,
    hang_up: bool,
}

impl DaemonScript {
    /// Replies with fixed lines regardless of the request.
    pub(crate) fn reply<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        Self::respond_with(move |_| lines)
    }

    /// Computes the reply from the decoded request.
    pub(crate) fn respond_with(
        responder: impl FnOnce(&ReceivedRequest) -> Vec<String> + Send + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            line_delay: Duration::ZERO,
            stall_before_close: Duration::ZERO,
            hang_up: false,
        }
    }

    /// Answers `INSTREAM` uploads the way clamd reports the EICAR signature.
    pub(crate) fn detect_eicar() -> Self {
        Self::respond_with(|request| {
            let marker: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";
            let found = request
                .body
                .windows(marker.len())
                .any(|window| window == marker);
            if found {
                vec![String::from(EICAR_DETECTION)]
            } else {
                vec![String::from("stream: OK")]
            }
        })
    }

    /// Accepts the connection and closes it without reading or replying.
    pub(crate) fn hang_up() -> Self {
        Self {
            hang_up: true,
            ..Self::reply(Vec::<String>::new())
        }
    }

    /// Sleeps before each reply line.
    pub(crate) fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    /// Keeps the socket open without writing after the reply.
    pub(crate) fn with_stall(mut self, stall: Duration) -> Self {
        self.stall_before_close = stall;
        self
    }
}

/// A daemon stub serving one connection on a background thread.
pub(crate) struct FakeDaemon {
    endpoint: SocketEndpoint,
    request: Arc<Mutex<Option<ReceivedRequest>>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
    _socket_dir: Option<TempDir>,
}

impl FakeDaemon {
    /// Spawns the daemon on an ephemeral TCP port.
    pub(crate) fn spawn_tcp(script: DaemonScript) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let port = listener.local_addr().context("local addr")?.port();
        let request = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&request);
        let handle = thread::spawn(move || {
            let Some(stream) = accept_with_deadline(|| listener.accept().map(|(s, _)| s))? else {
                return Ok(());
            };
            stream.set_nonblocking(false).context("blocking stream")?;
            serve(stream, script, &recorded)
        });
        Ok(Self {
            endpoint: SocketEndpoint::tcp("127.0.0.1", port),
            request,
            handle: Some(handle),
            _socket_dir: None,
        })
    }

    /// Spawns the daemon on a Unix socket inside a fresh temporary directory.
    #[cfg(unix)]
    pub(crate) fn spawn_unix(script: DaemonScript) -> Result<Self> {
        let dir = tempfile::tempdir().context("socket directory")?;
        let path = dir.path().join("clamd.sock");
        let listener = UnixListener::bind(&path).context("bind unix fake daemon")?;
        listener
            .set_nonblocking(true)
            .context("fake daemon nonblocking")?;
        let path = path
            .to_str()
            .context("socket path is not UTF-8")?
            .to_owned();
        let request = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&request);
        let handle = thread::spawn(move || {
            let Some(stream) = accept_with_deadline(|| listener.accept().map(|(s, _)| s))? else {
                return Ok(());
            };
            stream.set_nonblocking(false).context("blocking stream")?;
            serve(stream, script, &recorded)
        });
        Ok(Self {
            endpoint: SocketEndpoint::unix(path),
            request,
            handle: Some(handle),
            _socket_dir: Some(dir),
        })
    }

    /// Endpoint clients should dial.
    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Waits for the daemon thread and returns the request it decoded.
    pub(crate) fn finish(&mut self) -> Result<Option<ReceivedRequest>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("fake daemon thread panicked"))?
                .context("fake daemon failed")?;
        }
        let guard = self
            .request
            .lock()
            .map_err(|error| anyhow!("lock recorded request: {error}"))?;
        Ok(guard.clone())
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            drop(handle.join());
        }
    }
}

fn accept_with_deadline<S>(mut accept: impl FnMut() -> io::Result<S>) -> Result<Option<S>> {
    let deadline = Instant::now() + ACCEPT_DEADLINE;
    loop {
        match accept() {
            Ok(stream) => return Ok(Some(stream)),
            Err(ref error)
                if error.kind() == io::ErrorKind::WouldBlock && Instant::now() < deadline =>
            {
                thread::sleep(Duration::from_millis(5));
            }
            // Nobody connected; exit cleanly so tests whose client fails early
            // do not hang on drop.
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(error) => return Err(error).context("accept connection"),
        }
    }
}

fn serve<S: Read + Write>(
    stream: S,
    script: DaemonScript,
    recorded: &Mutex<Option<ReceivedRequest>>,
) -> Result<()> {
    if script.hang_up {
        drop(stream);
        return Ok(());
    }

    let mut reader = BufReader::new(stream);
    let request = read_request(&mut reader)?;
    *recorded
        .lock()
        .map_err(|error| anyhow!("lock recorded request: {error}"))? = Some(request.clone());

    let lines = (script.responder)(&request);
    let stream = reader.get_mut();
    for line in lines {
        if !script.line_delay.is_zero() {
            thread::sleep(script.line_delay);
        }
        stream.write_all(line.as_bytes()).context("write reply line")?;
        stream.write_all(b"\n").context("write line terminator")?;
        stream.flush().context("flush reply line")?;
    }
    if !script.stall_before_close.is_zero() {
        thread::sleep(script.stall_before_close);
    }
    Ok(())
}

fn read_request<R: BufRead>(reader: &mut R) -> Result<ReceivedRequest> {
    let mut request = ReceivedRequest::default();
    let mut frame = Vec::new();
    reader
        .read_until(b'\n', &mut frame)
        .context("read command frame")?;
    request.raw.extend_from_slice(&frame);

    let Some((&mode, rest)) = frame.split_first() else {
        bail!("client closed before sending a command");
    };
    if mode != b'n' {
        bail!("unexpected reply mode byte {mode:#04x}");
    }
    let text = rest.strip_suffix(b"\n").unwrap_or(rest);
    request.command = String::from_utf8(text.to_vec()).context("command is not UTF-8")?;

    if request.command == "INSTREAM" {
        read_chunks(reader, &mut request)?;
    }
    Ok(request)
}

fn read_chunks<R: Read>(reader: &mut R, request: &mut ReceivedRequest) -> Result<()> {
    loop {
        let mut prefix = [0_u8; 4];
        reader.read_exact(&mut prefix).context("read chunk length")?;
        request.raw.extend_from_slice(&prefix);
        let len = u32::from_be_bytes(prefix);
        if len == 0 {
            request.terminated = true;
            return Ok(());
        }
        let mut chunk = vec![0_u8; usize::try_from(len).context("chunk length")?];
        reader.read_exact(&mut chunk).context("read chunk payload")?;
        request.raw.extend_from_slice(&chunk);
        request.body.extend_from_slice(&chunk);
        request.chunk_lengths.push(len);
    }
}
