use crate::request::TimeWindow;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Write an executable `sh` script standing in for an extractor tool.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// Window on 2024-03-01 between two whole hours.
pub fn window(start_hour: u32, end_hour: u32) -> TimeWindow {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    TimeWindow {
        start: day.and_hms_opt(start_hour, 0, 0).unwrap(),
        end: day.and_hms_opt(end_hour, 0, 0).unwrap(),
    }
}

/// A zombie or a missing `/proc` entry counts as dead.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            let state = stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .unwrap_or("X");
            !matches!(state, "Z" | "X" | "x")
        }
        Err(_) => false,
    }
}

/// Poll until `pid` is gone or `timeout` elapses.
#[cfg(target_os = "linux")]
pub fn wait_for_exit(pid: u32, timeout: std::time::Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    !process_alive(pid)
}
