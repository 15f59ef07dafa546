//! Task status and the pause gate workers wait on

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

use crate::ScanError;

/// Lifecycle states of a scan task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Init,
    Running,
    Success,
    PausedByProgram,
    PausedManually,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Init => "init",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::PausedByProgram => "paused_by_program",
            TaskStatus::PausedManually => "paused_manually",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TaskStatus::PausedByProgram | TaskStatus::PausedManually)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a resume request was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Back to `Running`
    Resumed,
    /// Inside the exclusion window; the task stays paused by the schedule and
    /// resumes when the window ends
    DeferredBySchedule,
}

/// Current status of a task, shared between the owner, the schedule monitor
/// and every pipeline worker.
///
/// Workers block in [`wait_while_paused`](Self::wait_while_paused) and are
/// woken as soon as the status leaves a paused state.
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<TaskStatus>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(TaskStatus::Init)
    }
}

impl StatusCell {
    pub fn new(status: TaskStatus) -> Self {
        let (tx, _) = watch::channel(status);
        Self { tx }
    }

    pub fn get(&self) -> TaskStatus {
        *self.tx.borrow()
    }

    pub fn set(&self, status: TaskStatus) {
        self.tx.send_replace(status);
    }

    /// Apply `f` atomically; `f` returns the new status or `None` to keep
    /// the current one. Returns whether the status changed.
    pub fn transition<F>(&self, f: F) -> bool
    where
        F: FnOnce(TaskStatus) -> Option<TaskStatus>,
    {
        self.tx.send_if_modified(|status| match f(*status) {
            Some(next) if next != *status => {
                *status = next;
                true
            }
            _ => false,
        })
    }

    /// Schedule monitor transition. Never touches a manual pause or a
    /// terminal state.
    pub fn apply_schedule(&self, in_window: bool) -> bool {
        self.transition(|status| match (status, in_window) {
            (TaskStatus::Running, true) => Some(TaskStatus::PausedByProgram),
            (TaskStatus::PausedByProgram, false) => Some(TaskStatus::Running),
            _ => None,
        })
    }

    /// Manual pause request
    pub fn pause(&self) -> crate::Result<()> {
        let mut result = Ok(());
        self.tx.send_if_modified(|status| match *status {
            TaskStatus::Running | TaskStatus::PausedByProgram => {
                *status = TaskStatus::PausedManually;
                true
            }
            TaskStatus::PausedManually => {
                result = Err(ScanError::TaskStateError(
                    "task is already paused".to_string(),
                ));
                false
            }
            other => {
                result = Err(ScanError::TaskStateError(format!(
                    "task can not be paused in state {}",
                    other
                )));
                false
            }
        });
        result
    }

    /// Manual resume request. `in_window` is whether now falls inside the
    /// task's exclusion window.
    pub fn resume(&self, in_window: bool) -> crate::Result<ResumeOutcome> {
        let mut result = Ok(ResumeOutcome::Resumed);
        self.tx.send_if_modified(|status| match *status {
            TaskStatus::PausedManually if in_window => {
                *status = TaskStatus::PausedByProgram;
                result = Ok(ResumeOutcome::DeferredBySchedule);
                true
            }
            TaskStatus::PausedManually => {
                *status = TaskStatus::Running;
                true
            }
            TaskStatus::PausedByProgram => {
                result = Ok(ResumeOutcome::DeferredBySchedule);
                false
            }
            TaskStatus::Running => {
                result = Err(ScanError::TaskStateError(
                    "task is already running".to_string(),
                ));
                false
            }
            other => {
                result = Err(ScanError::TaskStateError(format!(
                    "task can not be resumed in state {}",
                    other
                )));
                false
            }
        });
        result
    }

    /// Returns once the status is not paused
    pub async fn wait_while_paused(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as self, so this cannot fail
        let _ = rx.wait_for(|status| !status.is_paused()).await;
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn running() -> StatusCell {
        StatusCell::new(TaskStatus::Running)
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::PausedByProgram).unwrap(),
            "\"paused_by_program\""
        );
        assert_eq!(TaskStatus::PausedManually.to_string(), "paused_manually");
        assert!(TaskStatus::Success.is_terminal());
        assert!(!TaskStatus::Running.is_paused());
    }

    #[test]
    fn test_schedule_never_overrides_manual_pause() {
        let cell = running();
        cell.pause().unwrap();
        assert!(!cell.apply_schedule(true));
        assert!(!cell.apply_schedule(false));
        assert_eq!(cell.get(), TaskStatus::PausedManually);
    }

    #[test]
    fn test_schedule_transitions() {
        let cell = running();
        assert!(cell.apply_schedule(true));
        assert_eq!(cell.get(), TaskStatus::PausedByProgram);
        assert!(!cell.apply_schedule(true));
        assert!(cell.apply_schedule(false));
        assert_eq!(cell.get(), TaskStatus::Running);

        let done = StatusCell::new(TaskStatus::Success);
        assert!(!done.apply_schedule(true));
    }

    #[test]
    fn test_pause_rules() {
        let cell = running();
        assert!(cell.pause().is_ok());
        let err = cell.pause().unwrap_err();
        assert_eq!(err.to_string(), "Task state error: task is already paused");

        let program = StatusCell::new(TaskStatus::PausedByProgram);
        assert!(program.pause().is_ok());
        assert_eq!(program.get(), TaskStatus::PausedManually);

        assert!(StatusCell::new(TaskStatus::Init).pause().is_err());
        assert!(StatusCell::new(TaskStatus::Success).pause().is_err());
    }

    #[test]
    fn test_resume_rules() {
        let cell = running();
        let err = cell.resume(false).unwrap_err();
        assert_eq!(err.to_string(), "Task state error: task is already running");

        cell.pause().unwrap();
        assert_eq!(cell.resume(false).unwrap(), ResumeOutcome::Resumed);
        assert_eq!(cell.get(), TaskStatus::Running);

        cell.pause().unwrap();
        assert_eq!(cell.resume(true).unwrap(), ResumeOutcome::DeferredBySchedule);
        assert_eq!(cell.get(), TaskStatus::PausedByProgram);
        assert_eq!(cell.resume(true).unwrap(), ResumeOutcome::DeferredBySchedule);

        assert!(StatusCell::new(TaskStatus::Error).resume(false).is_err());
    }

    #[tokio::test]
    async fn test_wait_while_paused_wakes_on_resume() {
        let cell = Arc::new(running());
        cell.pause().unwrap();

        let waiter = {
            let cell = Arc::clone(&cell);
            tokio::spawn(async move { cell.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        cell.resume(false).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_while_running_returns_immediately() {
        let cell = running();
        tokio::time::timeout(Duration::from_millis(100), cell.wait_while_paused())
            .await
            .unwrap();
    }
}
