use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagCsvError {
    #[error("Invalid conversion request: {message}")]
    InputValidation { message: String },

    #[error("{tool} failed: {message}")]
    ExternalTool {
        tool: String,
        message: String,
        stderr: String,
    },

    #[error("File access failed: {path}")]
    FileAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Merge failed: {message}")]
    Merge { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("A conversion task is already running: {task_id}")]
    TaskAlreadyRunning { task_id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification carried in results and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    ExternalTool,
    FileAccess,
    Merge,
    Cancelled,
    Other,
}

impl TagCsvError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        TagCsvError::InputValidation {
            message: message.into(),
        }
    }

    pub fn file_access<P: AsRef<std::path::Path>>(path: P, source: std::io::Error) -> Self {
        TagCsvError::FileAccess {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn merge<S: Into<String>>(message: S) -> Self {
        TagCsvError::Merge {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TagCsvError::InputValidation { .. } | TagCsvError::InvalidPath { .. } => {
                ErrorKind::InputValidation
            }
            TagCsvError::ExternalTool { .. } => ErrorKind::ExternalTool,
            TagCsvError::FileAccess { .. } | TagCsvError::Io(_) => ErrorKind::FileAccess,
            TagCsvError::Merge { .. } => ErrorKind::Merge,
            TagCsvError::Cancelled => ErrorKind::Cancelled,
            TagCsvError::TaskAlreadyRunning { .. } | TagCsvError::Config { .. } => ErrorKind::Other,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for TagCsvError {
    fn user_message(&self) -> String {
        match self {
            TagCsvError::InputValidation { message } => {
                format!("Invalid conversion request: {}", message)
            }
            TagCsvError::ExternalTool {
                tool,
                message,
                stderr,
            } => {
                if stderr.trim().is_empty() {
                    format!("{} failed: {}", tool, message)
                } else {
                    format!("{} failed: {}\n{}", tool, message, stderr.trim())
                }
            }
            TagCsvError::FileAccess { path, source } => {
                format!("Could not access {}: {}", path, source)
            }
            TagCsvError::Merge { message } => format!("Could not merge output: {}", message),
            TagCsvError::Cancelled => "Operation was cancelled by user".to_string(),
            TagCsvError::TaskAlreadyRunning { task_id } => {
                format!("Another conversion is still running ({})", task_id)
            }
            TagCsvError::Config { message } => format!("Configuration error: {}", message),
            TagCsvError::InvalidPath { path } => format!("Invalid path: {}", path),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            TagCsvError::InputValidation { .. } => Some(
                "Check the time window (--start must be before --end), the source files and the output directory.".to_string()
            ),
            TagCsvError::ExternalTool { .. } => Some(
                "Verify the extractor tool path in the configuration file and that it runs on this machine.".to_string()
            ),
            TagCsvError::FileAccess { .. } => Some(
                "Ensure you have the necessary read/write permissions for the source and output directories.".to_string()
            ),
            TagCsvError::Merge { .. } => Some(
                "No extractor output could be merged. Check the time window and tag filter, or run with -vv to see per-file errors.".to_string()
            ),
            TagCsvError::TaskAlreadyRunning { .. } => Some(
                "Wait for the running conversion to finish or cancel it first.".to_string()
            ),
            TagCsvError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for TagCsvError {
    fn from(error: toml::de::Error) -> Self {
        TagCsvError::Config {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for TagCsvError {
    fn from(error: csv::Error) -> Self {
        match error.into_kind() {
            csv::ErrorKind::Io(io) => TagCsvError::Io(io),
            other => TagCsvError::Merge {
                message: format!("{:?}", other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, TagCsvError>;
