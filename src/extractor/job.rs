use crate::error::{ErrorKind, Result, TagCsvError};
use crate::extractor::cancel::CancellationToken;
use crate::extractor::command::ExtractorCommand;
use crate::extractor::process_runner::{ProcessRunner, RunStatus};
use crate::request::{check_readable, check_writable_dir, TimeWindow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: usize,
    pub source: PathBuf,
    pub state: JobState,
    pub output: Option<PathBuf>,
    pub stderr: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub elapsed: Duration,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// One source file, one command line, one intended output file.
#[derive(Debug)]
pub struct ExtractionJob {
    id: usize,
    source: PathBuf,
    output: PathBuf,
    command: ExtractorCommand,
    window: TimeWindow,
    state: JobState,
}

impl ExtractionJob {
    pub fn new(
        id: usize,
        source: PathBuf,
        output: PathBuf,
        command: ExtractorCommand,
        window: TimeWindow,
    ) -> Self {
        Self {
            id,
            source,
            output,
            command,
            window,
            state: JobState::Pending,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn command(&self) -> &ExtractorCommand {
        &self.command
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        check_readable(&self.source)?;
        let output_dir = self
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        check_writable_dir(output_dir)
    }

    /// Drive the job to a terminal state. The process, if any, is reaped
    /// before this returns.
    pub fn run(mut self, runner: &ProcessRunner, token: &CancellationToken) -> JobOutcome {
        let start = Instant::now();

        if token.is_cancelled() {
            return self.into_cancelled();
        }

        if let Err(e) = self.validate() {
            tracing::warn!("Job {} rejected: {}", self.source.display(), e);
            return self.finish_err(e, None, start);
        }

        self.state = JobState::Running;
        tracing::info!("Extracting {}", self.source.display());

        let output = match runner.run(&self.command, &self.output, token) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Error processing file {}: {}", self.source.display(), e);
                return self.finish_err(e, None, start);
            }
        };

        let stderr = Some(output.stderr.clone()).filter(|s| !s.trim().is_empty());

        match output.status {
            RunStatus::Cancelled => {
                tracing::info!("Cancelled extraction of {}", self.source.display());
                remove_quietly(&self.output);
                self.state = JobState::Cancelled;
                self.outcome(None, stderr, None, start)
            }
            RunStatus::Exited(0) => {
                if has_content(&self.output) {
                    if let Some(ref warnings) = stderr {
                        tracing::warn!(
                            "{} warnings for {}: {}",
                            self.command.tool_name(),
                            self.source.display(),
                            warnings.trim()
                        );
                    }
                    tracing::info!("Successfully processed {}", self.source.display());
                    self.state = JobState::Succeeded;
                    let produced = Some(self.output.clone());
                    self.outcome(produced, stderr, None, start)
                } else {
                    let error = TagCsvError::ExternalTool {
                        tool: self.command.tool_name(),
                        message: "no output produced".to_string(),
                        stderr: output.stderr,
                    };
                    self.finish_err(error, stderr, start)
                }
            }
            RunStatus::Exited(code) => {
                let error = TagCsvError::ExternalTool {
                    tool: self.command.tool_name(),
                    message: format!("exited with code {} for {}", code, self.source.display()),
                    stderr: output.stderr,
                };
                self.finish_err(error, stderr, start)
            }
            RunStatus::Terminated => {
                let error = TagCsvError::ExternalTool {
                    tool: self.command.tool_name(),
                    message: format!("terminated by signal for {}", self.source.display()),
                    stderr: output.stderr,
                };
                self.finish_err(error, stderr, start)
            }
        }
    }

    /// Terminal outcome for a job that never got to run.
    pub fn into_cancelled(mut self) -> JobOutcome {
        self.state = JobState::Cancelled;
        self.outcome(None, None, None, Instant::now())
    }

    fn finish_err(mut self, error: TagCsvError, stderr: Option<String>, start: Instant) -> JobOutcome {
        if !matches!(error, TagCsvError::InputValidation { .. }) {
            tracing::error!("{}", error);
        }
        remove_quietly(&self.output);
        self.state = JobState::Failed;
        self.outcome(None, stderr, Some(error), start)
    }

    fn outcome(
        self,
        output: Option<PathBuf>,
        stderr: Option<String>,
        error: Option<TagCsvError>,
        start: Instant,
    ) -> JobOutcome {
        JobOutcome {
            job_id: self.id,
            source: self.source,
            state: self.state,
            output,
            stderr,
            error_kind: error.as_ref().map(TagCsvError::kind),
            error: error.map(|e| e.to_string()),
            elapsed: start.elapsed(),
        }
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

pub(crate) fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
    }
}
