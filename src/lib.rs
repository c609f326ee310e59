pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod merge;
pub mod report;
pub mod request;
pub mod scanner;
pub mod service;
pub mod strategy;
pub mod tasks;
pub mod ui;

#[cfg(test)]
mod test_support;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{ArchiveConfig, CaptureConfig, CliOverrides, Config, OutputConfig, PoolConfig};
pub use error::{ErrorKind, Result, TagCsvError, UserFriendlyError};

// Core functionality re-exports
pub use extractor::{CancellationToken, ExtractionJob, ExtractorCommand, JobOutcome, JobState};
pub use merge::MergeSummary;
pub use report::ConversionReport;
pub use request::{ConversionRequest, FormatOptions, TimeWindow};
pub use scanner::{SourceFile, SourceScanner};
pub use service::{ConversionResult, ConversionService};
pub use strategy::{ArchiveStrategy, CaptureStrategy, ConversionStrategy, SourceFormat};
pub use tasks::{TaskManager, TaskSnapshot, TaskStatus};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Main library interface for TagCsv functionality
pub struct TagCsv {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
    report_path: Option<PathBuf>,
}

impl TagCsv {
    /// Create a new TagCsv instance with the provided configuration
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager =
            ProgressManager::new(!quiet && output_formatter.mode() == OutputMode::Human);
        let shutdown = GracefulShutdown::new()?;

        Ok(Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
            report_path: None,
        })
    }

    /// Create a new TagCsv instance for testing (no signal handler conflicts)
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            progress_manager: ProgressManager::new(false),
            shutdown: GracefulShutdown::new_for_test(),
            report_path: None,
        }
    }

    /// Create TagCsv instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        };

        Ok(Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)?
            .with_report_path(cli_args.report.clone()))
    }

    pub fn with_report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    /// Run one conversion to completion. Extraction failures and
    /// cancellation are reported in the result, not as errors.
    pub async fn convert(
        &self,
        format: SourceFormat,
        request: ConversionRequest,
    ) -> Result<ConversionResult> {
        self.shutdown.check_shutdown()?;

        match format {
            SourceFormat::Capture => {
                let strategy = CaptureStrategy::from_config(&self.config);
                self.run_task(strategy, request).await
            }
            SourceFormat::Archive => {
                let strategy = ArchiveStrategy::from_config(&self.config);
                self.run_task(strategy, request).await
            }
        }
    }

    async fn run_task<S: ConversionStrategy>(
        &self,
        strategy: S,
        request: ConversionRequest,
    ) -> Result<ConversionResult> {
        let start_time = Instant::now();
        let format_name = strategy.name();
        self.output_formatter
            .start_operation(&format!("Converting {} files", format_name));

        let manager = TaskManager::new(ConversionService::new(strategy, &self.config));
        let task_id = manager.start_conversion(request.clone())?;

        let spinner = self.progress_manager.create_spinner("Starting...");
        let mut cancel_sent = false;

        while manager.is_busy() {
            if !cancel_sent && !self.shutdown.is_running() {
                manager.cancel(&task_id);
                cancel_sent = true;
            }
            ui::progress::update_task_spinner(&spinner, &manager.get_status(&task_id));
            tokio::time::sleep(self.config.poll_interval()).await;
        }
        manager.wait(Duration::from_secs(5));

        let elapsed = start_time.elapsed();
        let snapshot = manager.get_status(&task_id);
        let result = snapshot.result.unwrap_or_else(|| ConversionResult {
            cancelled: snapshot.status == TaskStatus::Cancelled,
            failure: Some(ErrorKind::Other),
            error_summary: Some("Conversion ended without a result".to_string()),
            ..ConversionResult::default()
        });

        let headline = if result.success {
            format!("{} extracted", result.processed_count)
        } else if result.cancelled {
            "Cancelled".to_string()
        } else {
            "Failed".to_string()
        };
        ui::progress::finish_progress_with_summary(&spinner, &headline, elapsed);
        self.progress_manager.clear();

        if let Some(path) = self.report_target(&request) {
            let report = ConversionReport::new(format_name, &request, &result, elapsed);
            if let Err(e) = report.save_json(&path) {
                self.output_formatter
                    .warning(&format!("Could not write report: {}", e.user_message()));
            }
        }

        self.output_formatter.print_conversion_result(&result, elapsed);
        Ok(result)
    }

    fn report_target(&self, request: &ConversionRequest) -> Option<PathBuf> {
        match self.report_path {
            Some(ref path) => Some(path.clone()),
            None if self.config.output.generate_report => {
                Some(ConversionReport::default_path(&request.output_dir))
            }
            None => None,
        }
    }

    /// Resolve the file list and build every job without spawning anything.
    pub fn plan(&self, format: SourceFormat, request: &ConversionRequest) -> Result<Vec<ExtractionJob>> {
        match format {
            SourceFormat::Capture => {
                let service =
                    ConversionService::new(CaptureStrategy::from_config(&self.config), &self.config);
                service.plan(&service.resolve_files(request)?)
            }
            SourceFormat::Archive => {
                let service =
                    ConversionService::new(ArchiveStrategy::from_config(&self.config), &self.config);
                service.plan(&service.resolve_files(request)?)
            }
        }
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let path = output_path.as_ref();
        std::fs::write(path, Config::create_sample_config())
            .map_err(|e| TagCsvError::file_access(path, e))
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Check if shutdown has been requested
    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    /// Request graceful shutdown
    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &TagCsvError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TagCsv {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}
