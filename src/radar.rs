//! Radar orchestrator, owning at most one running task

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{RadarConfig, TaskOption};
use crate::discovery::{default_prober, SharedProber};
use crate::dispatch::Dispatch;
use crate::task::{ResumeOutcome, Task, TaskInfo, TaskStatus};
use crate::ScanError;

#[derive(Default)]
struct Slot {
    active: Option<Arc<Task>>,
    runner: Option<JoinHandle<TaskStatus>>,
    last: Option<Arc<Task>>,
}

/// Runs scan tasks one at a time
pub struct Radar {
    config: RadarConfig,
    prober: Option<SharedProber>,
    slot: Mutex<Slot>,
}

/// Radar state for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct RadarInfo {
    pub name: String,
    /// `idle` or `working`
    pub status: &'static str,
    pub task: Option<TaskInfo>,
}

impl Radar {
    pub fn new(config: RadarConfig) -> Self {
        Self {
            config,
            prober: None,
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Use `prober` for liveness checks instead of the default
    pub fn with_prober(mut self, prober: SharedProber) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn config(&self) -> &RadarConfig {
        &self.config
    }

    /// Start a task in the background. Fails while another task is still
    /// running or paused.
    pub async fn start_task(
        &self,
        option: TaskOption,
        dispatch: Arc<dyn Dispatch>,
    ) -> crate::Result<Arc<Task>> {
        self.start(Task::with_config(option, &self.config), dispatch).await
    }

    /// Start a task built by the caller
    pub async fn start(&self, task: Task, dispatch: Arc<dyn Dispatch>) -> crate::Result<Arc<Task>> {
        let mut slot = self.slot.lock().await;
        Self::retire_finished(&mut slot);
        if slot.active.is_some() {
            return Err(ScanError::TaskStateError(
                "there are already scanning tasks running".to_string(),
            ));
        }

        let task = Arc::new(task);
        let prober = self.prober.clone().unwrap_or_else(default_prober);
        let runner = Arc::clone(&task);
        let handle = tokio::spawn(async move { runner.run(dispatch, prober).await });

        log::info!("radar {}: task {} ({}) started", self.config.name, task.id(), task.name());
        slot.active = Some(Arc::clone(&task));
        slot.runner = Some(handle);
        Ok(task)
    }

    fn retire_finished(slot: &mut Slot) {
        if slot.active.as_ref().is_some_and(|task| task.is_finished()) {
            slot.last = slot.active.take();
            slot.runner = None;
        }
    }

    /// The running task, or the last one when idle
    pub async fn current_task(&self) -> Option<Arc<Task>> {
        let mut slot = self.slot.lock().await;
        Self::retire_finished(&mut slot);
        slot.active.clone().or_else(|| slot.last.clone())
    }

    async fn active_task(&self) -> crate::Result<Arc<Task>> {
        let mut slot = self.slot.lock().await;
        Self::retire_finished(&mut slot);
        slot.active
            .clone()
            .ok_or_else(|| ScanError::TaskStateError("no running task".to_string()))
    }

    pub async fn pause(&self) -> crate::Result<()> {
        self.active_task().await?.pause()
    }

    pub async fn resume(&self) -> crate::Result<ResumeOutcome> {
        self.active_task().await?.resume()
    }

    /// Cancel the active task, if any
    pub async fn cancel(&self) -> bool {
        match self.active_task().await {
            Ok(task) => {
                task.cancel();
                true
            }
            Err(_) => false,
        }
    }

    pub async fn is_working(&self) -> bool {
        let mut slot = self.slot.lock().await;
        Self::retire_finished(&mut slot);
        slot.active.is_some()
    }

    pub async fn info(&self) -> RadarInfo {
        let working = self.is_working().await;
        RadarInfo {
            name: self.config.name.clone(),
            status: if working { "working" } else { "idle" },
            task: self.current_task().await.map(|task| task.info()),
        }
    }

    pub async fn info_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(&self.info().await)?)
    }

    /// Wait for the active task to finish and return its final status
    pub async fn wait(&self) -> Option<TaskStatus> {
        let (task, runner) = {
            let mut slot = self.slot.lock().await;
            (slot.active.clone()?, slot.runner.take())
        };

        let status = match runner {
            Some(handle) => match handle.await {
                Ok(status) => status,
                Err(e) => {
                    log::error!("task {} aborted: {}", task.id(), e);
                    task.status()
                }
            },
            // another caller is already waiting on the runner
            None => {
                let mut status = task.status_watch();
                let _ = status.wait_for(|s| s.is_terminal()).await;
                task.status()
            }
        };

        let mut slot = self.slot.lock().await;
        if slot.active.as_ref().is_some_and(|active| Arc::ptr_eq(active, &task)) {
            slot.active = None;
            slot.last = Some(task);
        }
        Some(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::LivenessProber;
    use crate::dispatch::EndpointTransfer;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::time::Duration;

    struct Quiet;

    #[async_trait]
    impl Dispatch for Quiet {
        async fn callback(&self, _tx: EndpointTransfer) {}
        async fn end(&self) {}
    }

    struct Slow;

    #[async_trait]
    impl LivenessProber for Slow {
        async fn is_live(&self, _ip: IpAddr, _timeout: Duration) -> bool {
            tokio::time::sleep(Duration::from_millis(200)).await;
            false
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn radar() -> Radar {
        Radar::new(RadarConfig::default()).with_prober(Arc::new(Slow))
    }

    fn option() -> TaskOption {
        TaskOption::new("192.0.2.1").with_ports("80").with_ping(true)
    }

    #[tokio::test]
    async fn test_second_task_rejected() {
        let radar = radar();
        radar.start_task(option(), Arc::new(Quiet)).await.unwrap();

        let err = radar.start_task(option(), Arc::new(Quiet)).await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "Task state error: there are already scanning tasks running"
        );

        assert_eq!(radar.wait().await, Some(TaskStatus::Success));
        assert!(radar.start_task(option(), Arc::new(Quiet)).await.is_ok());
        radar.wait().await;
    }

    #[tokio::test]
    async fn test_info_idle_keeps_last_task() {
        let radar = radar();
        let idle = radar.info().await;
        assert_eq!(idle.status, "idle");
        assert!(idle.task.is_none());

        let task = radar.start_task(option(), Arc::new(Quiet)).await.unwrap();
        assert_eq!(radar.info().await.status, "working");
        radar.wait().await;

        let info = radar.info().await;
        assert_eq!(info.status, "idle");
        assert_eq!(info.task.unwrap().id, task.id());
        let json: serde_json::Value = serde_json::from_str(&radar.info_json().await.unwrap()).unwrap();
        assert_eq!(json["task"]["status"], "success");
    }

    #[tokio::test]
    async fn test_pause_without_task() {
        let radar = radar();
        assert!(radar.pause().await.is_err());
        assert!(radar.resume().await.is_err());
        assert!(!radar.cancel().await);
    }
}
