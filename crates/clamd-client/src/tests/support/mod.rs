//! Test support utilities for clamd client behavioural coverage.
//!
//! Supplies a scripted fake daemon and the world shared by step definitions,
//! so scenarios stay focused on the exchange they describe.

pub(crate) mod fake_daemon;

use std::cell::RefCell;

use anyhow::{Context, Result, bail};
use clamd_config::SocketEndpoint;
use rstest::fixture;

use crate::client::ClamdClient;
use crate::error::ClamdError;
use crate::stats::Stats;

use self::fake_daemon::{DaemonScript, FakeDaemon, ReceivedRequest};

/// Outcome of the last command a scenario issued.
#[derive(Debug)]
pub(crate) enum Outcome {
    Lines(Vec<String>),
    Stats(Stats),
    Failed(ClamdError),
}

/// State shared across BDD steps.
#[derive(Default)]
pub(crate) struct TestWorld {
    daemon: Option<FakeDaemon>,
    endpoint: Option<SocketEndpoint>,
    outcome: Option<Outcome>,
}

impl TestWorld {
    /// Starts a fake daemon following `script`.
    pub(crate) fn start_daemon(&mut self, script: DaemonScript) -> Result<()> {
        let daemon = FakeDaemon::spawn_tcp(script)?;
        self.endpoint = Some(daemon.endpoint().clone());
        self.daemon = Some(daemon);
        Ok(())
    }

    /// Points the client at an endpoint where nothing listens.
    pub(crate) fn target_unreachable(&mut self) {
        self.daemon = None;
        self.endpoint = Some(SocketEndpoint::tcp("127.0.0.1", 1));
    }

    /// Client for the configured endpoint.
    pub(crate) fn client(&self) -> Result<ClamdClient> {
        let endpoint = self.endpoint.clone().context("no daemon configured")?;
        Ok(ClamdClient::new(endpoint))
    }

    /// Records a command outcome that yields raw lines.
    pub(crate) fn record_lines(&mut self, result: Result<Vec<String>, ClamdError>) {
        self.outcome = Some(match result {
            Ok(lines) => Outcome::Lines(lines),
            Err(error) => Outcome::Failed(error),
        });
    }

    /// Records a `STATS` outcome.
    pub(crate) fn record_stats(&mut self, result: Result<Stats, ClamdError>) {
        self.outcome = Some(match result {
            Ok(stats) => Outcome::Stats(stats),
            Err(error) => Outcome::Failed(error),
        });
    }

    /// The last outcome, failing when no command has run.
    pub(crate) fn outcome(&self) -> Result<&Outcome> {
        self.outcome.as_ref().context("no command has been issued")
    }

    /// Lines returned by the last successful command.
    pub(crate) fn lines(&self) -> Result<&[String]> {
        match self.outcome()? {
            Outcome::Lines(lines) => Ok(lines.as_slice()),
            other => bail!("expected reply lines, got {other:?}"),
        }
    }

    /// Statistics returned by the last `STATS` command.
    pub(crate) fn stats(&self) -> Result<&Stats> {
        match self.outcome()? {
            Outcome::Stats(stats) => Ok(stats),
            other => bail!("expected statistics, got {other:?}"),
        }
    }

    /// Waits for the daemon and returns the request it decoded.
    pub(crate) fn received_request(&mut self) -> Result<ReceivedRequest> {
        self.daemon
            .as_mut()
            .context("no daemon running")?
            .finish()?
            .context("daemon recorded no request")
    }
}

#[fixture]
pub(crate) fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}
