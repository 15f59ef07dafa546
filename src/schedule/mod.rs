//! Recurring exclusion windows
//!
//! A window describes when scanning must not run. The task's monitor loop
//! evaluates it against a [`Clock`] and flips the task into or out of the
//! program-paused state.

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use crate::ScanError;

const TIME_FORMAT: &str = "%H:%M";

/// Recurrence rule of an exclusion window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowMode {
    /// Every day between begin and end
    Daily,
    /// Monday to Friday between begin and end
    EveryWorkday,
    /// All of Monday to Friday plus Saturday before 05:00
    BusinessHoursBroad,
}

impl WindowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowMode::Daily => "daily",
            WindowMode::EveryWorkday => "every-workday",
            WindowMode::BusinessHoursBroad => "business-hours-broad",
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "daily" => Ok(WindowMode::Daily),
            "every-workday" | "everyWorKDay" | "workday" => Ok(WindowMode::EveryWorkday),
            "business-hours-broad" | "OpeningtimeBroad" => Ok(WindowMode::BusinessHoursBroad),
            other => Err(ScanError::ScheduleError(format!(
                "unknown exclusion window mode: {}",
                other
            ))),
        }
    }
}

/// Recurring time range during which scanning is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct ExclusionWindow {
    pub mode: WindowMode,
    pub begin: NaiveTime,
    pub end: NaiveTime,
}

/// Wire shape of a window: `{"daily": "...", "begin": "HH:MM", "end": "HH:MM"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawWindow {
    daily: String,
    begin: String,
    end: String,
}

impl TryFrom<RawWindow> for ExclusionWindow {
    type Error = ScanError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        ExclusionWindow::new(raw.daily.parse()?, &raw.begin, &raw.end)
    }
}

impl From<ExclusionWindow> for RawWindow {
    fn from(w: ExclusionWindow) -> Self {
        RawWindow {
            daily: w.mode.as_str().to_string(),
            begin: w.begin.format(TIME_FORMAT).to_string(),
            end: w.end.format(TIME_FORMAT).to_string(),
        }
    }
}

impl ExclusionWindow {
    pub fn new(mode: WindowMode, begin: &str, end: &str) -> crate::Result<Self> {
        Ok(Self {
            mode,
            begin: parse_clock_time(begin)?,
            end: parse_clock_time(end)?,
        })
    }

    /// Parse the `mode,begin,end` configuration form, e.g. `daily,09:00,18:00`.
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(ScanError::ScheduleError(format!(
                "exclusion window must be 'mode,begin,end', got '{}'",
                spec
            )));
        }
        Self::new(parts[0].parse()?, parts[1], parts[2])
    }

    /// Whether `now` (local wall-clock time) falls inside the window.
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        let weekday = now.weekday();
        match self.mode {
            WindowMode::Daily => self.covers(now.time()),
            WindowMode::EveryWorkday => {
                if matches!(weekday, Weekday::Sat | Weekday::Sun) {
                    return false;
                }
                self.covers(now.time())
            }
            WindowMode::BusinessHoursBroad => match weekday {
                Weekday::Sat => now.hour() < 5,
                Weekday::Sun => false,
                _ => true,
            },
        }
    }

    pub fn is_active(&self, clock: &dyn Clock) -> bool {
        self.is_active_at(clock.now())
    }

    // [begin, end); a begin later than end wraps past midnight
    fn covers(&self, t: NaiveTime) -> bool {
        if self.begin <= self.end {
            t >= self.begin && t < self.end
        } else {
            t >= self.begin || t < self.end
        }
    }
}

impl FromStr for ExclusionWindow {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ExclusionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.mode,
            self.begin.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

/// `false` when no window is configured.
pub fn within_window(window: Option<&ExclusionWindow>, clock: &dyn Clock) -> bool {
    window.map(|w| w.is_active(clock)).unwrap_or(false)
}

fn parse_clock_time(s: &str) -> crate::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
        .map_err(|e| ScanError::ScheduleError(format!("invalid time '{}': {}", s, e)))
}

/// Source of "now" for window evaluation
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a settable instant
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-06-03 is a Monday
    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_daily_window() {
        let w = ExclusionWindow::parse("daily,09:00,18:00").unwrap();
        assert!(w.is_active_at(at(3, 10, 0)));
        assert!(!w.is_active_at(at(3, 20, 0)));
        assert!(w.is_active_at(at(3, 9, 0)));
        assert!(!w.is_active_at(at(3, 18, 0)));
        // weekends count for daily
        assert!(w.is_active_at(at(8, 10, 0)));
    }

    #[test]
    fn test_every_workday_window() {
        let w = ExclusionWindow::parse("every-workday,09:00,18:00").unwrap();
        assert!(w.is_active_at(at(7, 12, 0)));
        assert!(!w.is_active_at(at(8, 12, 0)));
        assert!(!w.is_active_at(at(9, 12, 0)));
    }

    #[test]
    fn test_business_hours_broad() {
        let w = ExclusionWindow::parse("business-hours-broad,00:00,00:00").unwrap();
        assert!(w.is_active_at(at(4, 23, 0)));
        assert!(w.is_active_at(at(8, 4, 59)));
        assert!(!w.is_active_at(at(8, 5, 0)));
        assert!(!w.is_active_at(at(9, 12, 0)));
    }

    #[test]
    fn test_overnight_window() {
        let w = ExclusionWindow::parse("daily,22:00,06:00").unwrap();
        assert!(w.is_active_at(at(3, 23, 30)));
        assert!(w.is_active_at(at(3, 2, 0)));
        assert!(!w.is_active_at(at(3, 12, 0)));
    }

    #[test]
    fn test_legacy_mode_names() {
        assert_eq!("everyWorKDay".parse::<WindowMode>().unwrap(), WindowMode::EveryWorkday);
        assert_eq!(
            "OpeningtimeBroad".parse::<WindowMode>().unwrap(),
            WindowMode::BusinessHoursBroad
        );
    }

    #[test]
    fn test_rejects_bad_specs() {
        assert!(ExclusionWindow::parse("hourly,09:00,18:00").is_err());
        assert!(ExclusionWindow::parse("daily,9am,18:00").is_err());
        assert!(ExclusionWindow::parse("daily,25:00,18:00").is_err());
        assert!(ExclusionWindow::parse("daily,09:00").is_err());
    }

    #[test]
    fn test_serde_shape() {
        let w = ExclusionWindow::parse("daily,09:00,18:00").unwrap();
        let json = serde_json::to_value(w).unwrap();
        assert_eq!(json["daily"], "daily");
        assert_eq!(json["begin"], "09:00");
        let back: ExclusionWindow = serde_json::from_value(json).unwrap();
        assert_eq!(back, w);

        let bad = serde_json::json!({"daily": "never", "begin": "09:00", "end": "10:00"});
        assert!(serde_json::from_value::<ExclusionWindow>(bad).is_err());
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(at(3, 10, 0));
        let w = ExclusionWindow::parse("daily,09:00,18:00").unwrap();
        assert!(within_window(Some(&w), &clock));
        clock.set(at(3, 20, 0));
        assert!(!within_window(Some(&w), &clock));
        assert!(!within_window(None, &clock));
    }
}
