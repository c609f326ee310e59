use crate::error::{Result, TagCsvError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub capture: CaptureConfig,
    pub archive: ArchiveConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Concurrent extractor processes; 0 means one per CPU.
    pub max_workers: usize,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub tool: PathBuf,
    pub source_extension: String,
    pub intermediate_extension: String,
    pub id_width: u32,
    pub merged_file_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub tool: PathBuf,
    pub source_extension: String,
    pub merged_file_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: Option<PathBuf>,
    pub generate_report: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 100,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("drtu"),
            source_extension: "dt".to_string(),
            intermediate_extension: "rtu".to_string(),
            id_width: 4,
            merged_file_name: "MergedDataFrame.csv".to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("dreview"),
            source_extension: "review".to_string(),
            merged_file_name: "merged.csv".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(TagCsvError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TagCsvError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| TagCsvError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["tagcsv.toml", ".tagcsv.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(workers) = cli_args.max_workers {
            self.pool.max_workers = workers;
        }

        if let Some(poll) = cli_args.poll_interval_ms {
            self.pool.poll_interval_ms = poll;
        }

        if let Some(id_width) = cli_args.id_width {
            self.capture.id_width = id_width;
        }

        if let Some(ref tool) = cli_args.capture_tool {
            self.capture.tool = tool.clone();
        }

        if let Some(ref tool) = cli_args.archive_tool {
            self.archive.tool = tool.clone();
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.directory = Some(output_dir.clone());
        }

        if let Some(report) = cli_args.generate_report {
            self.output.generate_report = report;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| TagCsvError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| TagCsvError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.poll_interval_ms == 0 {
            return Err(TagCsvError::Config {
                message: "Poll interval must be greater than 0".to_string(),
            });
        }

        if self.capture.id_width == 0 || self.capture.id_width > 32 {
            return Err(TagCsvError::Config {
                message: format!(
                    "Capture id width must be between 1 and 32, got {}",
                    self.capture.id_width
                ),
            });
        }

        for (name, tool) in [("capture", &self.capture.tool), ("archive", &self.archive.tool)] {
            if tool.as_os_str().is_empty() {
                return Err(TagCsvError::Config {
                    message: format!("No extractor tool configured for {} files", name),
                });
            }
        }

        for (name, ext) in [
            ("capture", &self.capture.source_extension),
            ("archive", &self.archive.source_extension),
        ] {
            if ext.is_empty() || ext.contains('.') {
                return Err(TagCsvError::Config {
                    message: format!(
                        "Invalid {} source extension '{}' (expected e.g. \"dt\")",
                        name, ext
                    ),
                });
            }
        }

        for name in [&self.capture.merged_file_name, &self.archive.merged_file_name] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(TagCsvError::Config {
                    message: format!("Merged file name must be a plain file name: '{}'", name),
                });
            }
        }

        Ok(())
    }

    /// Worker bound with the "0 = one per CPU" rule applied.
    pub fn effective_workers(&self) -> usize {
        if self.pool.max_workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.pool.max_workers
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.pool.poll_interval_ms)
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub max_workers: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub id_width: Option<u32>,
    pub capture_tool: Option<PathBuf>,
    pub archive_tool: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub generate_report: Option<bool>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_workers(mut self, workers: Option<usize>) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval_ms: Option<u64>) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_id_width(mut self, id_width: Option<u32>) -> Self {
        self.id_width = id_width;
        self
    }

    pub fn with_capture_tool(mut self, tool: Option<PathBuf>) -> Self {
        self.capture_tool = tool;
        self
    }

    pub fn with_archive_tool(mut self, tool: Option<PathBuf>) -> Self {
        self.archive_tool = tool;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_generate_report(mut self, report: Option<bool>) -> Self {
        self.generate_report = report;
        self
    }
}
