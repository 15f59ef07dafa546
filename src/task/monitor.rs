//! Exclusion window monitor

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::status::StatusCell;
use crate::schedule::{Clock, ExclusionWindow};

/// Poll `window` every `interval` and pause or resume the task through
/// `status` until `stop` fires. Returns at once when there is no window.
pub async fn run_schedule_monitor(
    window: Option<ExclusionWindow>,
    status: Arc<StatusCell>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    stop: CancellationToken,
) {
    let Some(window) = window else {
        log::debug!("no exclusion window, schedule monitor not started");
        return;
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let in_window = window.is_active(clock.as_ref());
                if status.apply_schedule(in_window) {
                    log::info!("exclusion window {}: task {}", window, status.get());
                }
            }
        }
    }
    log::debug!("schedule monitor stopped");
}
