use crate::tasks::{TaskSnapshot, TaskStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new_spinner());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        pb.set_message(message.to_string());
        pb
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Mirror a polled task snapshot on the spinner.
pub fn update_task_spinner(pb: &ProgressBar, snapshot: &TaskSnapshot) {
    if snapshot.status == TaskStatus::Running && !snapshot.progress.is_empty() {
        pb.set_message(snapshot.progress.clone());
    }
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    let final_message = format!("{} (completed in {})", message, format_duration(duration));
    pb.finish_with_message(final_message);
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: TaskStatus, progress: &str) -> TaskSnapshot {
        TaskSnapshot {
            task_id: Some("capture_task_1".to_string()),
            status,
            progress: progress.to_string(),
            result: None,
        }
    }

    #[test]
    fn test_disabled_spinner_is_hidden() {
        let manager = ProgressManager::new(false);
        assert!(manager.create_spinner("test").is_hidden());
    }

    #[test]
    fn test_spinner_follows_running_task_only() {
        let pb = ProgressBar::hidden();
        update_task_spinner(&pb, &snapshot(TaskStatus::Running, "2/5 files extracted"));
        assert_eq!(pb.message(), "2/5 files extracted");

        update_task_spinner(&pb, &snapshot(TaskStatus::Cancelled, "Processing cancelled by user"));
        assert_eq!(pb.message(), "2/5 files extracted");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
