use crate::config::Config;
use crate::error::{ErrorKind, Result, TagCsvError};
use crate::extractor::job::remove_quietly;
use crate::extractor::{
    CancellationToken, ExtractionJob, JobOutcome, JobState, ProcessRunner, WorkerPool,
};
use crate::merge::MergeSummary;
use crate::request::ConversionRequest;
use crate::scanner::SourceScanner;
use crate::strategy::ConversionStrategy;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionResult {
    pub success: bool,
    pub cancelled: bool,
    pub outcomes: Vec<JobOutcome>,
    pub merged_path: Option<PathBuf>,
    pub processed_count: usize,
    pub failed_count: usize,
    pub failure: Option<ErrorKind>,
    pub error_summary: Option<String>,
    pub merge: Option<MergeSummary>,
}

impl ConversionResult {
    fn failed(error: &TagCsvError, outcomes: Vec<JobOutcome>) -> Self {
        let mut result = Self::from_outcomes(outcomes);
        result.failure = Some(error.kind());
        result.error_summary = Some(error.to_string());
        result
    }

    pub(crate) fn cancelled(outcomes: Vec<JobOutcome>) -> Self {
        let mut result = Self::from_outcomes(outcomes);
        result.cancelled = true;
        result.failure = Some(ErrorKind::Cancelled);
        result.error_summary = Some(TagCsvError::Cancelled.to_string());
        result
    }

    fn from_outcomes(outcomes: Vec<JobOutcome>) -> Self {
        let processed_count = outcomes.iter().filter(|o| o.is_success()).count();
        let failed_count = outcomes
            .iter()
            .filter(|o| o.state == JobState::Failed)
            .count();
        Self {
            outcomes,
            processed_count,
            failed_count,
            ..Self::default()
        }
    }

    pub fn is_partial(&self) -> bool {
        self.success && self.failed_count > 0
    }
}

/// Runs one conversion request end to end: validate, extract in parallel,
/// merge, clean up.
pub struct ConversionService<S: ConversionStrategy> {
    strategy: S,
    max_workers: usize,
    poll_interval: Duration,
}

impl<S: ConversionStrategy> ConversionService<S> {
    pub fn new(strategy: S, config: &Config) -> Self {
        Self {
            strategy,
            max_workers: config.effective_workers(),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Fill in the file list from the source directory when it is empty.
    pub fn resolve_files(&self, request: &ConversionRequest) -> Result<ConversionRequest> {
        if !request.files.is_empty() {
            return Ok(request.clone());
        }

        if !request.source_dir.is_dir() {
            return Err(TagCsvError::validation(format!(
                "source directory does not exist: {}",
                request.source_dir.display()
            )));
        }

        let scanner = SourceScanner::new(self.strategy.source_extension());
        let sources = scanner.scan_directory(&request.source_dir)?;
        tracing::info!(
            "Found {} .{} files in {}",
            sources.len(),
            scanner.extension(),
            request.source_dir.display()
        );
        tracing::info!("{}", scanner.get_statistics(&sources).display_summary().trim_end());

        Ok(request
            .clone()
            .with_files(sources.into_iter().map(|s| s.filename)))
    }

    /// Validate and build one job per source file without running anything.
    pub fn plan(&self, request: &ConversionRequest) -> Result<Vec<ExtractionJob>> {
        request.validate()?;

        let merged_path = request.output_dir.join(self.strategy.merged_file_name());
        let mut outputs = HashSet::new();
        let mut jobs = Vec::with_capacity(request.files.len());

        for (id, source) in request.source_paths().into_iter().enumerate() {
            let output = self.strategy.intermediate_path(&request.output_dir, &source);
            if output == merged_path || output == source || !outputs.insert(output.clone()) {
                return Err(TagCsvError::validation(format!(
                    "{} would write to an output path already in use: {}",
                    source.display(),
                    output.display()
                )));
            }
            if output.exists() {
                return Err(TagCsvError::validation(format!(
                    "{} would overwrite an existing file: {}",
                    source.display(),
                    output.display()
                )));
            }
            let command = self.strategy.build_command(request, &source);
            jobs.push(ExtractionJob::new(id, source, output, command, request.window));
        }

        tracing::debug!(
            "Planned {} jobs for {}",
            jobs.len(),
            self.strategy.tool().display()
        );
        Ok(jobs)
    }

    /// Run the request to completion. Never returns an error: failures and
    /// cancellation are reported in the result.
    pub fn run(
        &self,
        request: &ConversionRequest,
        token: &CancellationToken,
        progress: &dyn Fn(&str),
    ) -> ConversionResult {
        progress("Validating request");
        let jobs = match self.resolve_files(request).and_then(|r| self.plan(&r)) {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("Conversion rejected: {}", e);
                return ConversionResult::failed(&e, Vec::new());
            }
        };

        let intermediates: Vec<PathBuf> = jobs.iter().map(|j| j.output().to_path_buf()).collect();
        let result = self.execute(jobs, &request.output_dir, token, progress);

        for path in &intermediates {
            remove_quietly(path);
        }

        result
    }

    fn execute(
        &self,
        jobs: Vec<ExtractionJob>,
        output_dir: &std::path::Path,
        token: &CancellationToken,
        progress: &dyn Fn(&str),
    ) -> ConversionResult {
        let total = jobs.len();
        progress(&format!("Running {} extraction jobs", total));

        let runner = ProcessRunner::new(self.poll_interval);
        let pool = WorkerPool::new(runner, self.max_workers).with_token(token.child_token());
        let outcomes = pool.run_all_with_progress(jobs, |_, status| {
            let mut message = format!("{}/{} files extracted", status.jobs_finished, total);
            if status.jobs_finished < total {
                message.push_str(&format!(
                    " ({:.0}%, ~{}s left)",
                    status.percentage(),
                    status.estimated_remaining().as_secs()
                ));
            }
            tracing::debug!(
                "{} succeeded after {:.1}s; {}",
                status.jobs_succeeded,
                status.elapsed().as_secs_f64(),
                message
            );
            progress(&message);
        });

        if token.is_cancelled() {
            tracing::info!("Conversion cancelled after {} jobs", outcomes.len());
            return ConversionResult::cancelled(outcomes);
        }

        // Outcomes arrive in completion order; merge in submission order.
        let mut produced: Vec<(usize, PathBuf)> = outcomes
            .iter()
            .filter_map(|o| o.output.clone().map(|p| (o.job_id, p)))
            .collect();
        produced.sort_by_key(|(id, _)| *id);
        let inputs: Vec<PathBuf> = produced.into_iter().map(|(_, p)| p).collect();

        if inputs.is_empty() {
            let error = TagCsvError::merge(format!("all {} extraction jobs failed", total));
            tracing::error!("{}", error);
            return ConversionResult::failed(&error, outcomes);
        }

        progress("Merging output");
        let merged = self.strategy.merge(&inputs, output_dir);

        if token.is_cancelled() {
            if let Ok(ref summary) = merged {
                remove_quietly(&summary.merged_path);
            }
            return ConversionResult::cancelled(outcomes);
        }

        match merged {
            Ok(summary) => {
                let mut result = ConversionResult::from_outcomes(outcomes);
                result.success = true;
                result.merged_path = Some(summary.merged_path.clone());
                if result.failed_count > 0 {
                    result.error_summary = Some(format!(
                        "{} of {} files failed to extract",
                        result.failed_count, total
                    ));
                }
                result.merge = Some(summary);
                result
            }
            Err(e) => {
                tracing::error!("{}", e);
                ConversionResult::failed(&e, outcomes)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{ArchiveConfig, CaptureConfig};
    use crate::strategy::{ArchiveStrategy, CaptureStrategy};
    use crate::test_support::{window, write_script};
    use std::path::Path;
    use std::time::Instant;
    use tempfile::TempDir;

    const CAPTURE_TOOL: &str = r#"case "$(basename "$1")" in
  *bad*) echo "cannot open $1" >&2; exit 1 ;;
esac
echo "ID DATE TIME TAG VALUE QUALITY"
echo "1 24/03/01 10:00:00 FLOW 1.5 GOOD"
echo "1 24/03/01 10:01:00 FLOW 1.7 GOOD"
"#;

    fn config() -> Config {
        let mut config = Config::default();
        config.pool.poll_interval_ms = 10;
        config
    }

    fn capture_service(dir: &Path, body: &str) -> ConversionService<CaptureStrategy> {
        let tool = write_script(dir, "drtu.sh", body);
        let strategy = CaptureStrategy::new(CaptureConfig {
            tool,
            ..CaptureConfig::default()
        });
        ConversionService::new(strategy, &config())
    }

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"raw").unwrap();
        }
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_partial_failure_still_merges_survivors() {
        let source = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        touch(source.path(), &["bad1.dt", "bad2.dt", "good.dt"]);
        let service = capture_service(tools.path(), CAPTURE_TOOL);

        let request = ConversionRequest::new(source.path(), window(9, 11));
        let result = service.run(&request, &CancellationToken::new(), &|_| {});

        assert!(result.success, "{:?}", result.error_summary);
        assert!(result.is_partial());
        assert_eq!(result.failed_count, 2);
        assert_eq!(result.processed_count, 1);

        let merged = std::fs::read_to_string(result.merged_path.unwrap()).unwrap();
        assert_eq!(
            merged,
            "timestamp,FLOW\n2024/03/01 10:00:00,1.5\n2024/03/01 10:01:00,1.7\n"
        );
        assert_eq!(
            names_in(source.path()),
            vec!["MergedDataFrame.csv", "bad1.dt", "bad2.dt", "good.dt"]
        );
    }

    #[test]
    fn test_all_jobs_failing_is_merge_failure_without_leftovers() {
        let source = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        touch(source.path(), &["bad1.dt", "bad2.dt"]);
        let service = capture_service(tools.path(), CAPTURE_TOOL);

        let request = ConversionRequest::new(source.path(), window(9, 11));
        let result = service.run(&request, &CancellationToken::new(), &|_| {});

        assert!(!result.success);
        assert_eq!(result.failure, Some(ErrorKind::Merge));
        assert!(result.merged_path.is_none());
        assert_eq!(names_in(source.path()), vec!["bad1.dt", "bad2.dt"]);
    }

    #[test]
    fn test_invalid_window_spawns_nothing() {
        let source = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        touch(source.path(), &["good.dt"]);
        let marker = tools.path().join("spawned");
        let body = format!("touch '{}'\n{}", marker.display(), CAPTURE_TOOL);
        let service = capture_service(tools.path(), &body);

        let request = ConversionRequest::new(source.path(), window(11, 9));
        let result = service.run(&request, &CancellationToken::new(), &|_| {});

        assert_eq!(result.failure, Some(ErrorKind::InputValidation));
        assert!(result.outcomes.is_empty());
        assert!(!marker.exists());
    }

    #[test]
    fn test_existing_intermediate_is_left_untouched() {
        let source = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        touch(source.path(), &["unit.review"]);
        std::fs::write(source.path().join("unit.csv"), "keep me").unwrap();
        let marker = tools.path().join("spawned");
        let tool = write_script(
            tools.path(),
            "dreview.sh",
            &format!("touch '{}'\necho 'Time,Flow'\n", marker.display()),
        );
        let strategy = ArchiveStrategy::new(ArchiveConfig {
            tool,
            ..ArchiveConfig::default()
        });
        let service = ConversionService::new(strategy, &config());

        let request = ConversionRequest::new(source.path(), window(9, 11));
        let result = service.run(&request, &CancellationToken::new(), &|_| {});

        assert_eq!(result.failure, Some(ErrorKind::InputValidation));
        assert!(!marker.exists());
        assert_eq!(
            std::fs::read_to_string(source.path().join("unit.csv")).unwrap(),
            "keep me"
        );
    }

    #[test]
    fn test_archive_end_to_end() {
        let source = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        touch(source.path(), &["a.review", "b.review", "notes.txt"]);
        let tool = write_script(
            tools.path(),
            "dreview.sh",
            "echo 'Time,Flow'\necho 's,m3/h'\necho '1,10'\necho \"2,$(basename \"$1\")\"\n",
        );
        let strategy = ArchiveStrategy::new(ArchiveConfig {
            tool,
            ..ArchiveConfig::default()
        });
        let service = ConversionService::new(strategy, &config());

        let request = ConversionRequest::new(source.path(), window(9, 11));
        let result = service.run(&request, &CancellationToken::new(), &|_| {});

        assert!(result.success, "{:?}", result.error_summary);
        let merge = result.merge.unwrap();
        assert_eq!(merge.rows, 3);
        assert_eq!(merge.duplicates_removed, 1);
        assert_eq!(
            names_in(source.path()),
            vec!["a.review", "b.review", "merged.csv", "notes.txt"]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cancellation_kills_trees_and_leaves_no_files() {
        use crate::test_support::wait_for_exit;

        let source = TempDir::new().unwrap();
        let tools = TempDir::new().unwrap();
        let names: Vec<String> = (0..10).map(|i| format!("line{}.dt", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        touch(source.path(), &refs);

        let pids = tools.path().join("pids");
        std::fs::create_dir(&pids).unwrap();
        let body = format!(
            "echo partial\nsleep 30 &\necho $! > '{}/'$$\nwait\n",
            pids.display()
        );
        let mut config = config();
        config.pool.max_workers = 4;
        let tool = write_script(tools.path(), "drtu.sh", &body);
        let strategy = CaptureStrategy::new(CaptureConfig {
            tool,
            ..CaptureConfig::default()
        });
        let service = ConversionService::new(strategy, &config);

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(300));
                token.cancel();
            })
        };

        let start = Instant::now();
        let request = ConversionRequest::new(source.path(), window(9, 11));
        let result = service.run(&request, &token, &|_| {});
        canceller.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.outcomes.len(), 10);
        assert!(result.outcomes.iter().all(|o| o.state == JobState::Cancelled));

        let mut expected = names.clone();
        expected.sort();
        assert_eq!(names_in(source.path()), expected);

        for entry in std::fs::read_dir(&pids).unwrap() {
            let content = std::fs::read_to_string(entry.unwrap().path()).unwrap();
            let grandchild: u32 = content.trim().parse().unwrap();
            assert!(
                wait_for_exit(grandchild, Duration::from_secs(2)),
                "grandchild {} survived cancellation",
                grandchild
            );
        }
    }
}
