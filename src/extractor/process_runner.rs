use crate::error::{Result, TagCsvError};
use crate::extractor::cancel::CancellationToken;
use crate::extractor::command::ExtractorCommand;
use crate::extractor::process_tree::{ProcessTreeKiller, SystemTreeKiller};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(i32),
    /// Ended without an exit code (killed by a signal).
    Terminated,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: RunStatus,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct ActivityGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ActivityGauge {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawns one extractor process at a time per call and waits for it while
/// polling a cancellation token.
pub struct ProcessRunner {
    poll_interval: Duration,
    killer: Arc<dyn ProcessTreeKiller>,
    gauge: ActivityGauge,
}

impl ProcessRunner {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            killer: Arc::new(SystemTreeKiller),
            gauge: ActivityGauge::default(),
        }
    }

    pub fn with_killer(mut self, killer: Arc<dyn ProcessTreeKiller>) -> Self {
        self.killer = killer;
        self
    }

    /// Processes currently alive under this runner.
    pub fn active_processes(&self) -> usize {
        self.gauge.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive processes seen so far.
    pub fn peak_processes(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    /// Run `command` with stdout redirected to `output_file`. A non-zero
    /// exit is reported through `RunStatus`, not as an error.
    pub fn run(
        &self,
        command: &ExtractorCommand,
        output_file: &Path,
        token: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let start = Instant::now();

        if token.is_cancelled() {
            return Ok(ProcessOutput {
                status: RunStatus::Cancelled,
                stderr: String::new(),
                elapsed: start.elapsed(),
            });
        }

        let stdout = File::create(output_file)
            .map_err(|e| TagCsvError::file_access(output_file, e))?;
        let mut stderr_file = tempfile::tempfile()?;
        let stderr = stderr_file.try_clone()?;

        let mut child = command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| TagCsvError::ExternalTool {
                tool: command.tool_name(),
                message: format!("failed to start: {}", e),
                stderr: String::new(),
            })?;

        self.gauge.enter();
        tracing::debug!("Spawned PID {}: {}", child.id(), command);

        let waited = self.wait(&mut child, token);
        self.gauge.leave();

        let status = match waited {
            Ok(Some(exit)) => exit_to_status(exit),
            Ok(None) => RunStatus::Cancelled,
            Err(e) => return Err(e),
        };

        let stderr = read_captured(&mut stderr_file);
        Ok(ProcessOutput {
            status,
            stderr,
            elapsed: start.elapsed(),
        })
    }

    /// `Ok(None)` means the process was killed after cancellation.
    fn wait(&self, child: &mut Child, token: &CancellationToken) -> Result<Option<ExitStatus>> {
        loop {
            if token.is_cancelled() {
                self.terminate(child);
                return Ok(None);
            }

            match child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => std::thread::sleep(self.poll_interval),
                Err(e) => {
                    self.terminate(child);
                    return Err(TagCsvError::Io(e));
                }
            }
        }
    }

    /// Kill the whole tree, then reap the direct child.
    fn terminate(&self, child: &mut Child) {
        let pid = child.id();
        if let Err(e) = self.killer.kill_process_tree(pid) {
            tracing::error!("Error killing process tree {}: {}", pid, e);
        }
        let _ = child.kill();
        if let Err(e) = child.wait() {
            tracing::warn!("Could not reap PID {}: {}", pid, e);
        }
    }
}

fn exit_to_status(status: ExitStatus) -> RunStatus {
    match status.code() {
        Some(code) => RunStatus::Exited(code),
        None => RunStatus::Terminated,
    }
}

fn read_captured(file: &mut File) -> String {
    let mut buffer = Vec::new();
    if let Err(e) = file
        .seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut buffer))
    {
        tracing::warn!("Could not read captured stderr: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
