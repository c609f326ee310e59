use crate::error::{Result, TagCsvError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%y/%m/%d %H:%M:%S",
];

/// Parse a timezone-naive instant in any of the accepted input forms.
pub fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, String> {
    let s = s.trim();
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| {
            format!(
                "Invalid timestamp '{}'. Expected e.g. 2024-01-31 13:45:00 or 24/01/31 13:45:00",
                s
            )
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(TagCsvError::validation(format!(
                "start time {} must be before end time {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// Sampling-ID width for capture files; falls back to the configured default.
    pub id_width: Option<u32>,
    pub frequency_minutes: Option<f64>,
    pub dump_all: bool,
}

impl FormatOptions {
    /// Duration argument value, or `None` when the tool should get no duration.
    pub fn duration_value(&self) -> Option<String> {
        if self.dump_all {
            return None;
        }
        self.frequency_minutes.map(|f| f.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub source_dir: PathBuf,
    /// File names relative to `source_dir`; empty means "scan the directory".
    pub files: Vec<String>,
    pub window: TimeWindow,
    pub tags: Vec<String>,
    pub options: FormatOptions,
    pub output_dir: PathBuf,
}

impl ConversionRequest {
    pub fn new<P: Into<PathBuf>>(source_dir: P, window: TimeWindow) -> Self {
        let source_dir = source_dir.into();
        Self {
            output_dir: source_dir.clone(),
            source_dir,
            files: Vec::new(),
            window,
            tags: Vec::new(),
            options: FormatOptions::default(),
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: FormatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_output_dir<P: Into<PathBuf>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.source_dir.join(f)).collect()
    }

    /// Shape checks that need no filesystem access.
    pub fn validate_shape(&self) -> Result<()> {
        self.window.validate()?;

        if self.files.is_empty() {
            return Err(TagCsvError::validation("no source files to convert"));
        }

        if !self.options.dump_all {
            if let Some(freq) = self.options.frequency_minutes {
                if !freq.is_finite() || freq <= 0.0 {
                    return Err(TagCsvError::validation(format!(
                        "frequency must be a positive number, got {}",
                        freq
                    )));
                }
            }
        }

        if let Some(width) = self.options.id_width {
            if width == 0 || width > 32 {
                return Err(TagCsvError::validation(format!(
                    "id width must be between 1 and 32, got {}",
                    width
                )));
            }
        }

        if self.tags.iter().any(|t| t.trim().is_empty() || t.contains(',')) {
            return Err(TagCsvError::validation(
                "tag names must be non-empty and must not contain commas",
            ));
        }

        Ok(())
    }

    /// Full validation: shape plus readable sources and a writable output directory.
    pub fn validate(&self) -> Result<()> {
        self.validate_shape()?;

        if !self.source_dir.is_dir() {
            return Err(TagCsvError::validation(format!(
                "source directory does not exist: {}",
                self.source_dir.display()
            )));
        }

        for path in self.source_paths() {
            check_readable(&path)?;
        }

        check_writable_dir(&self.output_dir)
    }
}

pub fn check_readable(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(TagCsvError::validation(format!(
            "source file not found: {}",
            path.display()
        )));
    }
    std::fs::File::open(path).map_err(|e| {
        TagCsvError::validation(format!("source file not readable: {} ({})", path.display(), e))
    })?;
    Ok(())
}

pub fn check_writable_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(TagCsvError::validation(format!(
            "output directory does not exist: {}",
            dir.display()
        )));
    }
    tempfile::Builder::new()
        .prefix(".tagcsv-write-test")
        .tempfile_in(dir)
        .map_err(|e| {
            TagCsvError::validation(format!(
                "output directory is not writable: {} ({})",
                dir.display(),
                e
            ))
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-01-31 13:45:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-31T13:45:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024/01/31 13:45:00").unwrap(), expected);
        assert_eq!(parse_timestamp("24/01/31 13:45:00").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_time_window_ordering() {
        assert!(TimeWindow::new(at(1), at(2)).is_ok());
        assert!(TimeWindow::new(at(2), at(2)).is_err());
        assert!(TimeWindow::new(at(3), at(2)).is_err());
    }

    #[test]
    fn test_duration_value() {
        let mut options = FormatOptions {
            frequency_minutes: Some(5.0),
            ..Default::default()
        };
        assert_eq!(options.duration_value().as_deref(), Some("5"));

        options.frequency_minutes = Some(0.5);
        assert_eq!(options.duration_value().as_deref(), Some("0.5"));

        options.dump_all = true;
        assert_eq!(options.duration_value(), None);
    }

    #[test]
    fn test_shape_validation() {
        let window = TimeWindow::new(at(1), at(2)).unwrap();
        let request = ConversionRequest::new("/tmp", window);
        assert!(request.validate_shape().is_err());

        let request = request.with_files(["a.dt"]);
        assert!(request.validate_shape().is_ok());

        let bad_freq = request.clone().with_options(FormatOptions {
            frequency_minutes: Some(-1.0),
            ..Default::default()
        });
        assert!(bad_freq.validate_shape().is_err());

        let dump_all = request.clone().with_options(FormatOptions {
            frequency_minutes: Some(-1.0),
            dump_all: true,
            ..Default::default()
        });
        assert!(dump_all.validate_shape().is_ok());

        let bad_tag = request.with_tags(["A,B"]);
        assert!(bad_tag.validate_shape().is_err());
    }

    #[test]
    fn test_filesystem_validation() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.dt"), b"data").unwrap();
        let window = TimeWindow::new(at(1), at(2)).unwrap();

        let request = ConversionRequest::new(temp_dir.path(), window).with_files(["a.dt"]);
        assert!(request.validate().is_ok());

        let missing = request.clone().with_files(["missing.dt"]);
        assert!(matches!(
            missing.validate(),
            Err(TagCsvError::InputValidation { .. })
        ));

        let bad_output = request.with_output_dir(temp_dir.path().join("nope"));
        assert!(bad_output.validate().is_err());

        // the write check leaves nothing behind
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
