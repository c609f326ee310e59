pub mod archive;
pub mod capture;

pub use archive::merge_archive_outputs;
pub use capture::{merge_capture_outputs, parse_capture_line, Reading};

use crate::error::{Result, TagCsvError};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub merged_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// Lines (capture) or files (archive) left out with a warning.
    pub skipped: usize,
    pub duplicates_removed: usize,
}

/// Write a CSV through a temporary file in `output_dir` and move it into
/// place only once complete, so a failed merge leaves no final file.
pub(crate) fn write_csv_atomically<F>(output_dir: &Path, file_name: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut csv::Writer<&mut File>) -> Result<()>,
{
    let target = output_dir.join(file_name);
    let mut staging = tempfile::Builder::new()
        .prefix(".tagcsv-merge")
        .suffix(".csv")
        .tempfile_in(output_dir)
        .map_err(|e| TagCsvError::file_access(output_dir, e))?;

    {
        let mut writer = csv::Writer::from_writer(staging.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(|e| TagCsvError::file_access(&target, e))?;
    }

    staging
        .persist(&target)
        .map_err(|e| TagCsvError::file_access(&target, e.error))?;

    tracing::debug!("Wrote {}", target.display());
    Ok(target)
}
