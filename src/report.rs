use crate::error::{ErrorKind, Result, TagCsvError};
use crate::extractor::JobOutcome;
use crate::request::ConversionRequest;
use crate::service::ConversionResult;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REPORT_NAME: &str = "tagcsv_report.json";

#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub tool_version: String,
    pub generated_at: DateTime<Utc>,
    pub source_format: String,
    pub request: RequestSnapshot,
    pub summary: ReportSummary,
    pub jobs: Vec<JobOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub files: Vec<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub tags: Vec<String>,
    pub frequency_minutes: Option<f64>,
    pub dump_all: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub success: bool,
    pub cancelled: bool,
    pub files_processed: usize,
    pub files_failed: usize,
    pub merged_path: Option<PathBuf>,
    pub rows_written: Option<usize>,
    pub failure: Option<ErrorKind>,
    pub error_summary: Option<String>,
    pub duration: Duration,
}

impl From<&ConversionRequest> for RequestSnapshot {
    fn from(request: &ConversionRequest) -> Self {
        Self {
            source_dir: request.source_dir.clone(),
            output_dir: request.output_dir.clone(),
            files: request.files.clone(),
            start: request.window.start,
            end: request.window.end,
            tags: request.tags.clone(),
            frequency_minutes: request.options.frequency_minutes,
            dump_all: request.options.dump_all,
        }
    }
}

impl ConversionReport {
    pub fn new(
        source_format: &str,
        request: &ConversionRequest,
        result: &ConversionResult,
        elapsed: Duration,
    ) -> Self {
        let mut jobs = result.outcomes.clone();
        jobs.sort_by_key(|o| o.job_id);

        Self {
            tool_version: crate::version_info().to_string(),
            generated_at: Utc::now(),
            source_format: source_format.to_string(),
            request: RequestSnapshot::from(request),
            summary: ReportSummary {
                success: result.success,
                cancelled: result.cancelled,
                files_processed: result.processed_count,
                files_failed: result.failed_count,
                merged_path: result.merged_path.clone(),
                rows_written: result.merge.as_ref().map(|m| m.rows),
                failure: result.failure,
                error_summary: result.error_summary.clone(),
                duration: elapsed,
            },
            jobs,
        }
    }

    pub fn default_path(output_dir: &Path) -> PathBuf {
        output_dir.join(DEFAULT_REPORT_NAME)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json_content = serde_json::to_string_pretty(self).map_err(|e| TagCsvError::Config {
            message: format!("Failed to serialize report to JSON: {}", e),
        })?;

        fs::write(path, json_content).map_err(|e| TagCsvError::file_access(path, e))?;
        tracing::info!("Wrote conversion report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::window;
    use tempfile::TempDir;

    #[test]
    fn test_report_round_trips_through_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let request = ConversionRequest::new(temp_dir.path(), window(8, 9))
            .with_files(["a.dt", "b.dt"])
            .with_tags(["FLOW"]);
        let result = ConversionResult {
            success: true,
            processed_count: 2,
            merged_path: Some(temp_dir.path().join("MergedDataFrame.csv")),
            ..ConversionResult::default()
        };

        let report = ConversionReport::new("capture", &request, &result, Duration::from_secs(3));
        let path = ConversionReport::default_path(temp_dir.path());
        report.save_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["source_format"], "capture");
        assert_eq!(value["tool_version"], crate::version_info());
        assert_eq!(value["summary"]["files_processed"], 2);
        assert_eq!(value["request"]["files"][1], "b.dt");
        assert_eq!(value["request"]["tags"][0], "FLOW");
        assert!(value["summary"]["failure"].is_null());
    }
}
