use crate::error::{TagCsvError, UserFriendlyError};
use crate::extractor::{JobOutcome, JobState};
use crate::service::ConversionResult;
use console::{style, Emoji, Term};
use serde_json;
use std::time::Duration;

use super::progress::format_duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &TagCsvError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        eprintln!("{}{}", INFO, style(format!("Suggestion: {}", suggestion)).cyan());
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => eprintln!("SUGGESTION: {}", suggestion),
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => println!("=== {} ===", title),
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => println!("{}", "-".repeat(60)),
            OutputMode::Json => {}
        }
    }

    /// Final summary of one conversion. JSON mode always prints, since it
    /// is the machine-readable result.
    pub fn print_conversion_result(&self, result: &ConversionResult, elapsed: Duration) {
        match self.mode {
            OutputMode::Json => self.print_json_result(result, elapsed),
            _ if self.quiet => {}
            OutputMode::Human => self.print_human_result(result, elapsed),
            OutputMode::Plain => self.print_plain_result(result, elapsed),
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn highlight(&self, value: impl ToString) -> String {
        if self.use_colors {
            style(value.to_string()).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        let emoji = match msg_type {
            MessageType::Success => CHECKMARK,
            MessageType::Error => CROSS,
            MessageType::Warning => WARNING,
            MessageType::Info => INFO,
        };

        let line = if self.use_colors {
            let styled = match msg_type {
                MessageType::Success => style(message).green().bold(),
                MessageType::Error => style(message).red().bold(),
                MessageType::Warning => style(message).yellow().bold(),
                MessageType::Info => style(message).cyan(),
            };
            format!("{}{}", emoji, styled)
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };
            format!("{} {}", prefix, message)
        };

        match msg_type {
            MessageType::Error => eprintln!("{}", line),
            _ => println!("{}", line),
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn print_human_result(&self, result: &ConversionResult, elapsed: Duration) {
        println!();
        self.print_separator();

        let headline = if result.cancelled {
            "Conversion cancelled"
        } else if result.is_partial() {
            "Conversion completed with failures"
        } else if result.success {
            "Conversion completed!"
        } else {
            "Conversion failed"
        };

        if self.use_colors {
            let styled = if result.success && !result.is_partial() {
                style(headline).green().bold()
            } else if result.success || result.cancelled {
                style(headline).yellow().bold()
            } else {
                style(headline).red().bold()
            };
            println!("{}", styled);
        } else {
            println!("{}", headline);
        }

        println!();
        println!("  Files extracted: {}", self.highlight(result.processed_count));
        if result.failed_count > 0 {
            println!("  Files failed:    {}", self.highlight(result.failed_count));
        }
        if let Some(ref merge) = result.merge {
            println!("  Rows written:    {}", self.highlight(merge.rows));
            if merge.duplicates_removed > 0 {
                println!("  Duplicates:      {}", merge.duplicates_removed);
            }
        }
        if let Some(ref path) = result.merged_path {
            println!("  Output:          {}", self.highlight(path.display()));
        }
        println!("  Time taken:      {}", self.highlight(format_duration(elapsed)));

        let failures: Vec<&JobOutcome> = result
            .outcomes
            .iter()
            .filter(|o| o.state == JobState::Failed)
            .collect();
        if !failures.is_empty() && self.verbose_level > 0 {
            println!();
            println!("Failed files:");
            for outcome in failures {
                println!(
                    "  - {}: {}",
                    outcome.source_name(),
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        if !result.success {
            if let Some(ref summary) = result.error_summary {
                println!();
                println!("  {}", summary);
            }
        }

        self.print_separator();
    }

    fn print_json_result(&self, result: &ConversionResult, elapsed: Duration) {
        let summary = serde_json::json!({
            "type": "summary",
            "success": result.success,
            "cancelled": result.cancelled,
            "processed": result.processed_count,
            "failed": result.failed_count,
            "merged_path": result.merged_path,
            "failure": result.failure,
            "error": result.error_summary,
            "duration_ms": elapsed.as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn print_plain_result(&self, result: &ConversionResult, elapsed: Duration) {
        let status = if result.cancelled {
            "CANCELLED"
        } else if result.success {
            "COMPLETED"
        } else {
            "FAILED"
        };
        println!("{}: conversion", status);
        println!("Files extracted: {}", result.processed_count);
        println!("Files failed: {}", result.failed_count);
        if let Some(ref path) = result.merged_path {
            println!("Output: {}", path.display());
        }
        if let Some(ref summary) = result.error_summary {
            println!("Error: {}", summary);
        }
        println!("Duration: {:?}", elapsed);
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!(OutputMode::from_string("human"), OutputMode::Human);
        assert_eq!(OutputMode::from_string("JSON"), OutputMode::Json);
        assert_eq!(OutputMode::from_string("plain"), OutputMode::Plain);
        assert_eq!(OutputMode::from_string("invalid"), OutputMode::Human);
    }

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(!formatter.should_show_message(0));
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 1, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(1));
        assert!(!formatter.should_show_message(2));
        assert!(!formatter.use_colors);
    }

    #[test]
    fn test_print_result_in_every_mode() {
        let result = ConversionResult {
            success: true,
            processed_count: 2,
            failed_count: 1,
            error_summary: Some("1 of 3 files failed to extract".to_string()),
            ..ConversionResult::default()
        };

        for mode in [OutputMode::Human, OutputMode::Json, OutputMode::Plain] {
            OutputFormatter::new(mode, 1, false)
                .print_conversion_result(&result, Duration::from_millis(1500));
        }
    }
}
