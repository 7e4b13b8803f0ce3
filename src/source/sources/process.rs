use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Instant;

use tracing::{debug, warn};

use crate::constants::protocol::{
    CMD_ADVANCE, CMD_AT_END, CMD_JUMP, REPLY_OK, SHUTDOWN_GRACE, SHUTDOWN_POLL,
};
use crate::errors::SyncError;
use crate::permalink::extract_batch;
use crate::source::PaginationSource;
use crate::types::{Identifier, SourceId};

/// Launch settings for an external scraper process.
#[derive(Clone, Debug)]
pub struct ProcessPagerConfig {
    /// Program to spawn.
    pub program: OsString,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl ProcessPagerConfig {
    /// Spawn `program` with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Drives a long-running scraper (browser automation, API poller) over a
/// line protocol on its stdin/stdout.
///
/// | request   | reply                                         |
/// |-----------|-----------------------------------------------|
/// | `advance` | one line of whitespace-separated ids/permalinks |
/// | `jump`    | `ok`                                          |
/// | `end?`    | `true` or `false`                             |
///
/// The scraper's stderr is inherited so its own diagnostics stay visible.
pub struct ProcessPager {
    source_id: SourceId,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ProcessPager {
    /// Spawn the scraper described by `config`.
    pub fn spawn(config: &ProcessPagerConfig) -> Result<Self, SyncError> {
        let source_id = format!("process:{}", config.program.to_string_lossy());
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| SyncError::SourceUnavailable {
                source_id: source_id.clone(),
                reason: format!("failed spawning scraper: {err}"),
            })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| SyncError::Protocol {
            source_id: source_id.clone(),
            details: "scraper stdout was not captured".into(),
        })?;
        debug!(source = %source_id, pid = child.id(), "spawned scraper");
        Ok(Self {
            source_id,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn request(&mut self, command: &str) -> Result<String, SyncError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| SyncError::Protocol {
            source_id: self.source_id.clone(),
            details: "scraper stdin already closed".into(),
        })?;
        writeln!(stdin, "{command}")
            .and_then(|_| stdin.flush())
            .map_err(|err| SyncError::SourceUnavailable {
                source_id: self.source_id.clone(),
                reason: format!("failed sending '{command}': {err}"),
            })?;
        let mut reply = String::new();
        let read = self
            .stdout
            .read_line(&mut reply)
            .map_err(|err| SyncError::SourceUnavailable {
                source_id: self.source_id.clone(),
                reason: format!("failed reading reply to '{command}': {err}"),
            })?;
        if read == 0 {
            return Err(SyncError::SourceUnavailable {
                source_id: self.source_id.clone(),
                reason: format!("scraper exited before answering '{command}'"),
            });
        }
        Ok(reply.trim().to_string())
    }
}

impl PaginationSource for ProcessPager {
    fn id(&self) -> &str {
        &self.source_id
    }

    fn advance(&mut self) -> Result<Vec<Identifier>, SyncError> {
        let reply = self.request(CMD_ADVANCE)?;
        Ok(extract_batch(&reply))
    }

    fn at_end(&mut self) -> bool {
        match self.request(CMD_AT_END) {
            Ok(reply) => reply.eq_ignore_ascii_case("true"),
            Err(err) => {
                warn!(source = %self.source_id, error = %err, "end probe failed; assuming more content");
                false
            }
        }
    }

    fn escalate(&mut self) -> Result<(), SyncError> {
        let reply = self.request(CMD_JUMP)?;
        if reply != REPLY_OK {
            return Err(SyncError::Protocol {
                source_id: self.source_id.clone(),
                details: format!("expected '{REPLY_OK}' after '{CMD_JUMP}', got '{reply}'"),
            });
        }
        Ok(())
    }
}

impl Drop for ProcessPager {
    fn drop(&mut self) {
        // Closing stdin is the scraper's cue to shut down.
        drop(self.stdin.take());
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(source = %self.source_id, %status, "scraper exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(SHUTDOWN_POLL),
                Ok(None) => {
                    warn!(source = %self.source_id, "scraper ignored shutdown; killing it");
                    break;
                }
                Err(err) => {
                    warn!(source = %self.source_id, error = %err, "failed polling scraper; killing it");
                    break;
                }
            }
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
