use crate::config::{ArchiveConfig, CaptureConfig, Config};
use crate::error::Result;
use crate::extractor::ExtractorCommand;
use crate::merge::{merge_archive_outputs, merge_capture_outputs, MergeSummary};
use crate::request::ConversionRequest;
use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// `.dt` capture files (drtu)
    Capture,
    /// `.review` archive files (dreview)
    Archive,
}

impl SourceFormat {
    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Capture => "capture",
            SourceFormat::Archive => "archive",
        }
    }
}

/// Everything that differs between source formats: the tool, how it is
/// invoked, where its output lands and how outputs are merged.
pub trait ConversionStrategy: Send + Sync + 'static {
    /// Short name used in task ids and reports.
    fn name(&self) -> &'static str;

    fn tool(&self) -> &Path;

    fn source_extension(&self) -> &str;

    fn merged_file_name(&self) -> &str;

    fn intermediate_path(&self, output_dir: &Path, source: &Path) -> PathBuf;

    fn build_command(&self, request: &ConversionRequest, source: &Path) -> ExtractorCommand;

    /// Merge per-file outputs, given in submission order.
    fn merge(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<MergeSummary>;
}

fn intermediate_for(output_dir: &Path, source: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}.{}", stem, extension))
}

fn match_arg(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        None
    } else {
        Some(format!("-match=({})", tags.join(",")))
    }
}

fn time_args(start: NaiveDateTime, end: NaiveDateTime, format: &str) -> [String; 2] {
    [
        format!("-TBEGIN={}", start.format(format)),
        format!("-TEND={}", end.format(format)),
    ]
}

/// `.dt` capture files through `drtu`.
#[derive(Debug, Clone)]
pub struct CaptureStrategy {
    config: CaptureConfig,
}

impl CaptureStrategy {
    const TIME_FORMAT: &'static str = "%y/%m/%d %H:%M:%S";

    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.capture.clone())
    }
}

impl ConversionStrategy for CaptureStrategy {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn tool(&self) -> &Path {
        &self.config.tool
    }

    fn source_extension(&self) -> &str {
        &self.config.source_extension
    }

    fn merged_file_name(&self) -> &str {
        &self.config.merged_file_name
    }

    fn intermediate_path(&self, output_dir: &Path, source: &Path) -> PathBuf {
        intermediate_for(output_dir, source, &self.config.intermediate_extension)
    }

    fn build_command(&self, request: &ConversionRequest, source: &Path) -> ExtractorCommand {
        let id_width = request.options.id_width.unwrap_or(self.config.id_width);
        let [begin, end] = time_args(request.window.start, request.window.end, Self::TIME_FORMAT);

        let mut command = ExtractorCommand::new(&self.config.tool).path_arg(source);
        if let Some(filter) = match_arg(&request.tags) {
            command = command.arg(filter);
        }
        command = command
            .arg(format!("-IDWIDTH={}", id_width))
            .arg(begin)
            .arg(end);
        if let Some(duration) = request.options.duration_value() {
            command = command.arg(format!("-DT={}", duration));
        }
        command
    }

    fn merge(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<MergeSummary> {
        merge_capture_outputs(inputs, output_dir, &self.config.merged_file_name)
    }
}

/// `.review` archive files through `dreview`.
#[derive(Debug, Clone)]
pub struct ArchiveStrategy {
    config: ArchiveConfig,
}

impl ArchiveStrategy {
    const TIME_FORMAT: &'static str = "%y/%m/%d_%H:%M:%S";

    pub fn new(config: ArchiveConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.archive.clone())
    }
}

impl ConversionStrategy for ArchiveStrategy {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn tool(&self) -> &Path {
        &self.config.tool
    }

    fn source_extension(&self) -> &str {
        &self.config.source_extension
    }

    fn merged_file_name(&self) -> &str {
        &self.config.merged_file_name
    }

    fn intermediate_path(&self, output_dir: &Path, source: &Path) -> PathBuf {
        intermediate_for(output_dir, source, "csv")
    }

    fn build_command(&self, request: &ConversionRequest, source: &Path) -> ExtractorCommand {
        let [begin, end] = time_args(request.window.start, request.window.end, Self::TIME_FORMAT);

        let mut command = ExtractorCommand::new(&self.config.tool).path_arg(source);
        if let Some(filter) = match_arg(&request.tags) {
            command = command.arg(filter);
        }
        command = command.arg(begin).arg(end);
        if let Some(duration) = request.options.duration_value() {
            command = command.arg(format!("-DT={}", duration));
        }
        command
    }

    fn merge(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<MergeSummary> {
        merge_archive_outputs(inputs, output_dir, &self.config.merged_file_name)
    }
}
