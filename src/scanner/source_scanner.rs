use crate::error::{Result, TagCsvError};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

impl SourceFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        Self {
            path,
            filename,
            size,
        }
    }
}

/// Finds source files of one format directly inside a directory.
pub struct SourceScanner {
    extension: String,
}

impl SourceScanner {
    pub fn new<S: Into<String>>(extension: S) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_lowercase(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }

    pub fn scan_directory<P: AsRef<Path>>(&self, root: P) -> Result<Vec<SourceFile>> {
        let root_path = root.as_ref();

        if !root_path.is_dir() {
            return Err(TagCsvError::InvalidPath {
                path: format!("{} is not a directory", root_path.display()),
            });
        }

        let mut sources = Vec::new();

        let walker = WalkDir::new(root_path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false);

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.matches(entry.path()) {
                match self.process_file(&entry) {
                    Ok(source) => sources.push(source),
                    Err(err) => {
                        tracing::warn!("Skipping {}: {}", entry.path().display(), err);
                    }
                }
            }
        }

        sources.sort_by(|a, b| a.filename.cmp(&b.filename));

        Ok(sources)
    }

    fn process_file(&self, entry: &DirEntry) -> Result<SourceFile> {
        let metadata = entry.metadata().map_err(|e| TagCsvError::Io(e.into()))?;
        Ok(SourceFile::new(entry.path().to_path_buf(), metadata.len()))
    }

    pub fn get_statistics(&self, sources: &[SourceFile]) -> ScanStatistics {
        let (largest_file_size, largest_file) = sources
            .iter()
            .max_by_key(|s| s.size)
            .map(|s| (s.size, s.filename.clone()))
            .unwrap_or((0, String::new()));

        ScanStatistics {
            total_files: sources.len(),
            total_size: sources.iter().map(|s| s.size).sum(),
            largest_file_size,
            largest_file,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanStatistics {
    pub total_files: usize,
    pub total_size: u64,
    pub largest_file_size: u64,
    pub largest_file: String,
}

impl ScanStatistics {
    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "Scan Results:\n  Source files: {}\n  Total size: {}\n",
            self.total_files,
            format_bytes(self.total_size)
        );

        if self.largest_file_size > 0 {
            summary.push_str(&format!(
                "  Largest file: {} ({})\n",
                self.largest_file,
                format_bytes(self.largest_file_size)
            ));
        }

        summary
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
