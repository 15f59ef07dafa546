//! Scan task: lifecycle, pipeline wiring and progress counters
//!
//! A task runs three bounded stages in series:
//!
//! ```text
//! enumerate ──> ping pool ──> scan pool ──> scanner ──> probe sink ──> finger pool ──> Dispatch
//!      │            │ (dead host: +ports completed)
//!      └─ excluded host: +ports completed
//! ```
//!
//! Every stage applies backpressure to the one before it, and every
//! `(address, port)` unit ends up counted as completed exactly once.

pub mod info;
pub mod monitor;
pub mod pool;
pub mod status;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{RadarConfig, TaskOption};
use crate::core::{Scanner, ScannerBuilder, ScannerFactory, ScannerOption};
use crate::discovery::SharedProber;
use crate::dispatch::{Dispatch, EndpointTransfer};
use crate::network::{OpenEndpoint, ProbeSink};
use crate::schedule::{within_window, Clock, SystemClock};
use crate::top_ports::expand_ports;
use crate::utils::address_exclusions::ExcludedAddressSet;
use crate::utils::shuffle::IndexPermutation;
use crate::utils::target_parser::AddressSpace;
use crate::ScanError;

pub use info::TaskInfo;
pub use pool::WorkerPool;
pub use status::{ResumeOutcome, StatusCell, TaskStatus};

/// Progress counters, updated by every worker
#[derive(Debug, Default)]
pub struct Counters {
    /// Addresses times ports
    pub total: AtomicU64,
    pub completed: AtomicU64,
    /// Open endpoints found
    pub assets: AtomicU64,
}

impl Counters {
    fn complete(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
struct Timing {
    start_time: Option<DateTime<Local>>,
    end_time: Option<DateTime<Local>>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

/// Everything parsed from the task option before the pipeline starts
struct Plan {
    ports: Arc<Vec<u16>>,
    targets: AddressSpace,
    excluded: ExcludedAddressSet,
}

pub struct Task {
    id: String,
    name: String,
    debug: bool,
    option: TaskOption,
    status: Arc<StatusCell>,
    counters: Arc<Counters>,
    msg: Mutex<String>,
    timing: Mutex<Timing>,
    cancel: CancellationToken,
    started: AtomicBool,
    clock: Arc<dyn Clock>,
    monitor_interval: Duration,
    liveness_timeout: Duration,
    scanner_builder: ScannerBuilder,
}

impl Task {
    pub fn new(option: TaskOption) -> Self {
        Self::with_config(option, &RadarConfig::default())
    }

    /// Task with engine-level settings taken from `config`
    pub fn with_config(mut option: TaskOption, config: &RadarConfig) -> Self {
        option.normalize();
        let id = Uuid::new_v4().to_string();
        let name = if option.name.trim().is_empty() {
            format!("{}-{}", config.name, &id[..8])
        } else {
            option.name.clone()
        };

        Self {
            id,
            name,
            debug: option.debug || config.debug,
            option,
            status: Arc::new(StatusCell::default()),
            counters: Arc::new(Counters::default()),
            msg: Mutex::new(String::new()),
            timing: Mutex::new(Timing::default()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            clock: Arc::new(SystemClock),
            monitor_interval: config.monitor_interval(),
            liveness_timeout: config.liveness_timeout(),
            scanner_builder: ScannerFactory::builder(),
        }
    }

    /// Replace the clock exclusion windows are evaluated against
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    /// Replace how the scanner is built from the option's mode
    pub fn with_scanner_builder(mut self, builder: ScannerBuilder) -> Self {
        self.scanner_builder = builder;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn option(&self) -> &TaskOption {
        &self.option
    }

    pub fn status(&self) -> TaskStatus {
        self.status.get()
    }

    /// Receiver that observes every status change
    pub fn status_watch(&self) -> tokio::sync::watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Stop enumerating new hosts. Work already handed to the pools still
    /// runs to completion.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("task {} cancelled", self.id);
            self.cancel.cancel();
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Manual pause; overrides the schedule until resumed
    pub fn pause(&self) -> crate::Result<()> {
        self.status.pause()?;
        log::info!("task {} paused", self.id);
        Ok(())
    }

    /// Manual resume. Inside the exclusion window the task stays paused by
    /// the schedule instead.
    pub fn resume(&self) -> crate::Result<ResumeOutcome> {
        let in_window = within_window(self.option.exclude_time_range.as_ref(), self.clock.as_ref());
        let outcome = self.status.resume(in_window)?;
        match outcome {
            ResumeOutcome::Resumed => log::info!("task {} resumed", self.id),
            ResumeOutcome::DeferredBySchedule => log::info!(
                "task {} inside exclusion window, resumes when it ends",
                self.id
            ),
        }
        Ok(outcome)
    }

    pub fn info(&self) -> TaskInfo {
        let status = self.status.get();
        let (start_time, end_time, elapsed) = match self.timing.lock() {
            Ok(timing) => {
                let elapsed = timing
                    .elapsed
                    .or_else(|| timing.started.map(|s| s.elapsed()))
                    .unwrap_or_default();
                (timing.start_time, timing.end_time, elapsed)
            }
            Err(_) => (None, None, Duration::ZERO),
        };
        let total = self.counters.total.load(Ordering::Acquire);
        let completed = self.counters.completed.load(Ordering::Acquire);

        TaskInfo {
            name: self.name.clone(),
            id: self.id.clone(),
            debug: self.debug,
            status,
            msg: self.msg.lock().map(|m| m.clone()).unwrap_or_default(),
            start_time,
            end_time,
            timeuse_second: elapsed.as_secs_f64(),
            timeuse_msg: info::format_elapsed(elapsed),
            task_all_num: total,
            task_success_num: completed,
            task_asset_num: self.counters.assets.load(Ordering::Acquire),
            task_process: info::format_progress(completed, total),
            option: self.option.clone(),
        }
    }

    fn milestone(&self, msg: &str) {
        if self.debug {
            log::info!("[{}] {}", self.id, msg);
        } else {
            log::debug!("[{}] {}", self.id, msg);
        }
    }

    fn plan(&self) -> crate::Result<Plan> {
        self.option.validate()?;
        let ports = expand_ports(&self.option.port)?;
        let targets = AddressSpace::parse(&self.option.target)?;
        let excluded = ExcludedAddressSet::parse(&self.option.exclude_target)?;
        Ok(Plan {
            ports: Arc::new(ports),
            targets,
            excluded,
        })
    }

    fn mark_started(&self) {
        if let Ok(mut timing) = self.timing.lock() {
            timing.start_time = Some(Local::now());
            timing.started = Some(Instant::now());
        }
    }

    fn stop_clock(&self) {
        if let Ok(mut timing) = self.timing.lock() {
            timing.end_time = Some(Local::now());
            timing.elapsed = Some(timing.started.map(|s| s.elapsed()).unwrap_or_default());
        }
    }

    /// `end()` runs before the terminal status is published, so an owner
    /// waiting on the status never sees the dispatch still holding resources.
    async fn finish(&self, status: TaskStatus, dispatch: &dyn Dispatch) -> TaskStatus {
        self.stop_clock();
        dispatch.end().await;
        self.status.set(status);
        status
    }

    async fn fail(&self, err: ScanError, dispatch: &dyn Dispatch) -> TaskStatus {
        log::error!("task {} failed: {}", self.id, err);
        if let Ok(mut msg) = self.msg.lock() {
            *msg = err.to_string();
        }
        dispatch.on_error(&err).await;
        self.finish(TaskStatus::Error, dispatch).await
    }

    /// Run the task to a terminal state and return it. `dispatch` receives
    /// every open endpoint; `prober` is used when the option enables `ping`.
    pub async fn run(&self, dispatch: Arc<dyn Dispatch>, prober: SharedProber) -> TaskStatus {
        if self.started.swap(true, Ordering::AcqRel) {
            log::warn!("task {} already started", self.id);
            return self.status();
        }
        self.mark_started();
        self.milestone("task start");

        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(e) => return self.fail(e, dispatch.as_ref()).await,
        };

        let port_count = plan.ports.len() as u64;
        let total = plan.targets.len().saturating_mul(port_count);
        self.counters.total.store(total, Ordering::Release);
        log::info!(
            "task {}: {} addresses x {} ports = {} units, mode {}",
            self.id,
            plan.targets.len(),
            port_count,
            total,
            self.option.mode
        );

        let finger_pool = Arc::new(WorkerPool::new("finger", self.option.pool.finger));
        let sink = Arc::new(TaskSink {
            counters: Arc::clone(&self.counters),
            finger_pool: Arc::clone(&finger_pool),
            dispatch: Arc::clone(&dispatch),
            option: Arc::new(self.option.clone()),
        });

        let scanner = match (self.scanner_builder)(
            self.option.mode,
            ScannerOption::new(self.option.rate, self.option.timeout_duration()),
            sink,
        ) {
            Ok(scanner) => scanner,
            Err(e) => return self.fail(e, dispatch.as_ref()).await,
        };
        log::debug!("task {} using {} scanner", self.id, scanner.name());

        self.status.transition(|s| (s == TaskStatus::Init).then_some(TaskStatus::Running));
        // a task started inside its window waits before the first host
        let in_window = within_window(self.option.exclude_time_range.as_ref(), self.clock.as_ref());
        if self.status.apply_schedule(in_window) {
            log::info!("task {} starts inside its exclusion window, paused", self.id);
        }

        let monitor_stop = CancellationToken::new();
        let monitor = tokio::spawn(monitor::run_schedule_monitor(
            self.option.exclude_time_range,
            Arc::clone(&self.status),
            Arc::clone(&self.clock),
            self.monitor_interval,
            monitor_stop.clone(),
        ));

        let pipeline = Arc::new(Pipeline {
            scanner: Arc::clone(&scanner),
            ports: Arc::clone(&plan.ports),
            counters: Arc::clone(&self.counters),
            status: Arc::clone(&self.status),
            cancel: self.cancel.clone(),
            scan_pool: WorkerPool::new("scan", self.option.pool.scan),
            prober,
            liveness_timeout: self.liveness_timeout,
        });
        let ping_pool = WorkerPool::new("ping", self.option.pool.ping);

        self.enumerate(&plan, &pipeline, &ping_pool).await;

        ping_pool.drain().await;
        self.milestone("ping pool drained");
        pipeline.scan_pool.drain().await;
        self.milestone("scan pool drained");
        scanner.drain().await;
        self.milestone("scanner drained");
        finger_pool.drain().await;
        self.milestone("finger pool drained");

        scanner.release().await;
        self.milestone("scanner released");
        ping_pool.close();
        pipeline.scan_pool.close();
        finger_pool.close();

        monitor_stop.cancel();
        if let Err(e) = monitor.await {
            log::warn!("schedule monitor failed: {}", e);
        }
        self.milestone("schedule monitor stopped");

        self.stop_clock();
        let info = self.info();
        log::info!(
            "task {} finished in {}: {}/{} units, {} open",
            self.id,
            info.timeuse_msg,
            info.task_success_num,
            info.task_all_num,
            info.task_asset_num
        );
        self.finish(TaskStatus::Success, dispatch.as_ref()).await
    }

    /// Walk every block in permuted order and feed hosts into the pipeline
    async fn enumerate(&self, plan: &Plan, pipeline: &Arc<Pipeline>, ping_pool: &WorkerPool) {
        let port_count = plan.ports.len() as u64;

        'blocks: for block in plan.targets.blocks() {
            self.milestone(&format!("enumerating {}", block));
            let order = IndexPermutation::new(block.len());

            for i in 0..block.len() {
                if self.cancel.is_cancelled() || !pipeline.wait_unpaused().await {
                    log::info!("task {}: cancelled, no new hosts dispatched", self.id);
                    break 'blocks;
                }

                let Some(ip) = block.nth(order.get(i)) else {
                    continue;
                };

                if plan.excluded.is_excluded(ip) {
                    log::trace!("{} excluded", ip);
                    self.counters.complete(port_count);
                    continue;
                }

                let stage = Arc::clone(pipeline);
                let submit = async {
                    if self.option.ping {
                        ping_pool.submit(stage.ping_host(ip)).await
                    } else {
                        pipeline.scan_pool.submit(stage.scan_host(ip)).await
                    }
                };
                // a host still waiting for a pool slot is not dispatched yet
                let submitted = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        log::info!("task {}: cancelled, no new hosts dispatched", self.id);
                        break 'blocks;
                    }
                    submitted = submit => submitted,
                };
                if let Err(e) = submitted {
                    log::warn!("task {}: {}", self.id, e);
                    break 'blocks;
                }
            }
        }
    }
}

/// Shared state of the ping and scan stages
struct Pipeline {
    scanner: Arc<dyn Scanner>,
    ports: Arc<Vec<u16>>,
    counters: Arc<Counters>,
    status: Arc<StatusCell>,
    cancel: CancellationToken,
    scan_pool: WorkerPool,
    prober: SharedProber,
    liveness_timeout: Duration,
}

impl Pipeline {
    /// Block while the task is paused. Returns `false` when the task is
    /// cancelled before the pause ends.
    async fn wait_unpaused(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.status.wait_while_paused() => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// Account for a host that will not be probed
    fn skip_host(&self, ip: IpAddr) {
        log::trace!("{} skipped, cancelled while paused", ip);
        self.counters.complete(self.ports.len() as u64);
    }

    async fn ping_host(self: Arc<Self>, ip: IpAddr) {
        if !self.wait_unpaused().await {
            return self.skip_host(ip);
        }
        if self.prober.is_live(ip, self.liveness_timeout).await {
            let stage = Arc::clone(&self);
            if let Err(e) = self.scan_pool.submit(stage.scan_host(ip)).await {
                log::warn!("{}: {}", ip, e);
                self.counters.complete(self.ports.len() as u64);
            }
        } else {
            log::trace!("{} is down", ip);
            self.counters.complete(self.ports.len() as u64);
        }
    }

    /// Probe every port of `ip` in port-list order
    async fn scan_host(self: Arc<Self>, ip: IpAddr) {
        if !self.wait_unpaused().await {
            return self.skip_host(ip);
        }
        for &port in self.ports.iter() {
            if let Err(e) = self.scanner.await_rate_limit().await {
                log::debug!("rate limiter: {}", e);
            }
            if let Err(e) = self.scanner.probe(ip, port).await {
                // no report will come for this probe
                log::debug!("probe {}:{} not issued: {}", ip, port, e);
                self.counters.complete(1);
            }
        }
    }
}

/// Counts every probe outcome and hands open endpoints to the finger pool
struct TaskSink {
    counters: Arc<Counters>,
    finger_pool: Arc<WorkerPool>,
    dispatch: Arc<dyn Dispatch>,
    option: Arc<TaskOption>,
}

#[async_trait]
impl ProbeSink for TaskSink {
    async fn report(&self, outcome: Option<OpenEndpoint>) {
        self.counters.complete(1);
        let Some(entry) = outcome else {
            return;
        };

        self.counters.assets.fetch_add(1, Ordering::AcqRel);
        log::debug!("open {}", entry);

        let dispatch = Arc::clone(&self.dispatch);
        let tx = EndpointTransfer {
            entry,
            param: TaskOption::clone(&self.option),
        };
        if let Err(e) = self
            .finger_pool
            .submit(async move { dispatch.callback(tx).await })
            .await
        {
            log::warn!("{} not dispatched: {}", entry, e);
        }
    }
}
