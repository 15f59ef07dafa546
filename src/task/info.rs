//! Task status snapshot

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::status::TaskStatus;
use crate::config::TaskOption;

/// Point-in-time view of a task, serialised for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub id: String,
    pub debug: bool,
    pub status: TaskStatus,
    pub msg: String,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub timeuse_second: f64,
    pub timeuse_msg: String,
    /// Total units, addresses times ports
    pub task_all_num: u64,
    pub task_success_num: u64,
    /// Open endpoints found
    pub task_asset_num: u64,
    /// Completion percentage with two decimals
    pub task_process: String,
    pub option: TaskOption,
}

impl TaskInfo {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `1h02m03s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Completed share of `total` as a percentage, `"0.00"` for an empty task
pub fn format_progress(completed: u64, total: u64) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", completed as f64 / total as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0h00m00s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "0h01m05s");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 7)), "3h00m07s");
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "0h00m59s");
    }

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(0, 0), "0.00");
        assert_eq!(format_progress(1, 3), "33.33");
        assert_eq!(format_progress(8, 8), "100.00");
    }

    #[test]
    fn test_json_keys() {
        let info = TaskInfo {
            name: "t".into(),
            id: "id".into(),
            debug: false,
            status: TaskStatus::Running,
            msg: String::new(),
            start_time: None,
            end_time: None,
            timeuse_second: 1.5,
            timeuse_msg: format_elapsed(Duration::from_millis(1500)),
            task_all_num: 8,
            task_success_num: 4,
            task_asset_num: 1,
            task_process: format_progress(4, 8),
            option: TaskOption::new("10.0.0.0/30"),
        };
        let value: serde_json::Value = serde_json::from_str(&info.to_json().unwrap()).unwrap();
        assert_eq!(value["status"], "running");
        assert_eq!(value["task_process"], "50.00");
        assert_eq!(value["timeuse_msg"], "0h00m01s");
        assert_eq!(value["option"]["target"], "10.0.0.0/30");
    }
}
