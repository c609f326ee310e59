use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::request::{parse_timestamp, ConversionRequest, FormatOptions, TimeWindow};
use crate::scanner::{read_tag_list, split_tags};
use crate::strategy::SourceFormat;
use chrono::NaiveDateTime;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tagcsv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert capture and archive time-series files into one merged CSV")]
#[command(
    long_about = "TagCsv runs the external extractor tool once per source file, in parallel, \
                  and merges the per-file output into a single time-aligned CSV table."
)]
#[command(before_help = "📈 TagCsv - Time-Series Conversion Tool")]
#[command(after_help = "EXAMPLES:\n  \
    tagcsv ./data --start '2024-03-01 00:00:00' --end '2024-03-02 00:00:00'\n  \
    tagcsv ./data --source-format archive --start '24/03/01 00:00:00' --end '24/03/01 06:00:00' --frequency 5\n  \
    tagcsv ./data --start 2024-03-01T00:00:00 --end 2024-03-01T12:00:00 --peek-file tags.txt --workers 8\n  \
    tagcsv --generate-config --config tagcsv.toml")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Directory holding the source files
    #[arg(required_unless_present = "generate_config")]
    pub directory: Option<PathBuf>,

    /// Source file format
    #[arg(long, value_enum, default_value_t = SourceFormat::Capture)]
    pub source_format: SourceFormat,

    /// Start of the time window
    #[arg(long, value_parser = parse_timestamp, required_unless_present = "generate_config")]
    pub start: Option<NaiveDateTime>,

    /// End of the time window
    #[arg(long, value_parser = parse_timestamp, required_unless_present = "generate_config")]
    pub end: Option<NaiveDateTime>,

    /// Source files to convert (comma-separated, default: every matching file)
    #[arg(long, value_delimiter = ',')]
    pub files: Option<Vec<String>>,

    /// Tags to extract (comma-separated, default: all)
    #[arg(short, long, conflicts_with = "peek_file")]
    pub tags: Option<String>,

    /// File listing one tag per line
    #[arg(long)]
    pub peek_file: Option<PathBuf>,

    /// Sampling interval in minutes
    #[arg(long)]
    pub frequency: Option<f64>,

    /// Emit every recorded sample instead of resampling
    #[arg(long)]
    pub dump_all: bool,

    /// Sampling-ID width for capture files
    #[arg(long)]
    pub id_width: Option<u32>,

    /// Path to the extractor tool for the selected format
    #[arg(long, env = "TAGCSV_TOOL")]
    pub tool: Option<PathBuf>,

    /// Output directory (defaults to the source directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum concurrent extractor processes (0 = one per CPU)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Cancellation poll interval in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write a JSON conversion report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Show the extractor commands without running them
    #[arg(long)]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        let (capture_tool, archive_tool) = match self.source_format {
            SourceFormat::Capture => (self.tool.clone(), None),
            SourceFormat::Archive => (None, self.tool.clone()),
        };

        CliOverrides::new()
            .with_max_workers(self.workers)
            .with_poll_interval(self.poll_interval)
            .with_id_width(self.id_width)
            .with_capture_tool(capture_tool)
            .with_archive_tool(archive_tool)
            .with_output_dir(self.output.clone())
            .with_generate_report(self.report.as_ref().map(|_| true))
    }

    /// Tag filter from `--tags` or `--peek-file`; empty means every tag.
    pub fn tag_filter(&self) -> Result<Vec<String>> {
        if let Some(ref path) = self.peek_file {
            return read_tag_list(path);
        }
        Ok(self.tags.as_deref().map(split_tags).unwrap_or_default())
    }

    /// Assemble the conversion request. Window ordering and file checks are
    /// left to the service so they surface as validation failures there.
    pub fn build_request(&self, config: &Config) -> Result<ConversionRequest> {
        let directory = self.directory.clone().unwrap_or_else(|| PathBuf::from("."));
        let window = match (self.start, self.end) {
            (Some(start), Some(end)) => TimeWindow { start, end },
            _ => {
                return Err(crate::error::TagCsvError::validation(
                    "both --start and --end are required",
                ))
            }
        };

        let output_dir = self
            .output
            .clone()
            .or_else(|| config.output.directory.clone())
            .unwrap_or_else(|| directory.clone());

        Ok(ConversionRequest::new(directory, window)
            .with_files(self.files.clone().unwrap_or_default())
            .with_tags(self.tag_filter()?)
            .with_options(FormatOptions {
                id_width: self.id_width,
                frequency_minutes: self.frequency,
                dump_all: self.dump_all,
            })
            .with_output_dir(output_dir))
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["tagcsv"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = parse(&[
            "/data",
            "--source-format",
            "archive",
            "--start",
            "2024-03-01 00:00:00",
            "--end",
            "24/03/01 06:00:00",
            "--files",
            "a.review,b.review",
            "--tags",
            "FLOW, PRESS",
            "--frequency",
            "5",
            "-w",
            "8",
        ]);

        assert_eq!(cli.source_format, SourceFormat::Archive);
        assert_eq!(cli.workers, Some(8));

        let request = cli.build_request(&Config::default()).unwrap();
        assert_eq!(request.files, vec!["a.review", "b.review"]);
        assert_eq!(request.tags, vec!["FLOW", "PRESS"]);
        assert_eq!(request.output_dir, PathBuf::from("/data"));
        assert!(request.window.validate().is_ok());
    }

    #[test]
    fn test_window_is_required_unless_generating_config() {
        let missing = Cli::try_parse_from(["tagcsv", "/data", "--start", "2024-03-01 00:00:00"]);
        assert!(missing.is_err());

        let generate = Cli::try_parse_from(["tagcsv", "--generate-config"]);
        assert!(generate.is_ok());
    }

    #[test]
    fn test_tags_and_peek_file_conflict() {
        let result = Cli::try_parse_from([
            "tagcsv",
            "/data",
            "--start",
            "2024-03-01 00:00:00",
            "--end",
            "2024-03-01 01:00:00",
            "--tags",
            "A",
            "--peek-file",
            "tags.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_peek_file_feeds_tag_filter() {
        let temp_dir = TempDir::new().unwrap();
        let peek = temp_dir.path().join("tags.txt");
        std::fs::write(&peek, "# flows\nFLOW.A\n\n  FLOW.B  \n").unwrap();

        let cli = parse(&[
            "/data",
            "--start",
            "2024-03-01 00:00:00",
            "--end",
            "2024-03-01 01:00:00",
            "--peek-file",
            peek.to_str().unwrap(),
        ]);
        assert_eq!(cli.tag_filter().unwrap(), vec!["FLOW.A", "FLOW.B"]);
    }

    #[test]
    fn test_tool_override_targets_selected_format() {
        let cli = parse(&[
            "/data",
            "--source-format",
            "archive",
            "--start",
            "2024-03-01 00:00:00",
            "--end",
            "2024-03-01 01:00:00",
            "--tool",
            "/opt/dreview",
            "--poll-interval",
            "50",
        ]);

        let config = cli.load_config().unwrap();
        assert_eq!(config.archive.tool, PathBuf::from("/opt/dreview"));
        assert_eq!(config.capture.tool, PathBuf::from("drtu"));
        assert_eq!(config.pool.poll_interval_ms, 50);
    }

    #[test]
    fn test_output_override_wins_over_source_dir() {
        let cli = parse(&[
            "/data",
            "--start",
            "2024-03-01 00:00:00",
            "--end",
            "2024-03-01 01:00:00",
            "-o",
            "/out",
        ]);
        let request = cli.build_request(&Config::default()).unwrap();
        assert_eq!(request.output_dir, PathBuf::from("/out"));
        assert_eq!(request.source_dir, PathBuf::from("/data"));
    }
}
