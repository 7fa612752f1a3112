//! Decoding of the `STATS` reply.
//!
//! clamd documents the statistics format as subject to change, so the decoder
//! only buckets lines by their leading keyword and keeps the text as sent.
//! Lines it does not recognise are dropped rather than treated as errors.

/// Statistics reported by the daemon.
///
/// `pools` holds only the value after the keyword; the other fields keep the
/// whole line, keyword included, exactly as the daemon wrote it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of thread pools.
    pub pools: String,
    /// Daemon state line.
    pub state: String,
    /// Thread usage line.
    pub threads: String,
    /// Scan queue line.
    pub queue: String,
    /// Memory statistics line.
    pub memstats: String,
}

/// Keyword that starts a statistics line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatsKey {
    Pools,
    State,
    Threads,
    Queue,
    Memstats,
    End,
}

impl StatsKey {
    /// Prefixes in match priority order.
    const PREFIXES: [(&'static str, Self); 6] = [
        ("POOLS", Self::Pools),
        ("STATE", Self::State),
        ("THREADS", Self::Threads),
        ("QUEUE", Self::Queue),
        ("MEMSTATS", Self::Memstats),
        ("END", Self::End),
    ];

    pub(crate) fn classify(line: &str) -> Option<Self> {
        Self::PREFIXES
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|&(_, key)| key)
    }
}

impl Stats {
    /// Builds a record from reply lines, consuming the whole sequence.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stats = Self::default();
        for line in lines {
            stats.absorb(line.as_ref());
        }
        stats
    }

    fn absorb(&mut self, line: &str) {
        let Some(key) = StatsKey::classify(line) else {
            return;
        };
        let slot = match key {
            StatsKey::Pools => {
                self.pools = pools_value(line).to_owned();
                return;
            }
            StatsKey::State => &mut self.state,
            StatsKey::Threads => &mut self.threads,
            StatsKey::Queue => &mut self.queue,
            StatsKey::Memstats => &mut self.memstats,
            // The sentinel ends the block but the socket is still drained.
            StatsKey::End => return,
        };
        line.clone_into(slot);
    }
}

/// Skips the keyword and its separator (`POOLS:` or `POOLS `).
fn pools_value(line: &str) -> &str {
    line.get(6..).unwrap_or_default().trim_matches(' ')
}
