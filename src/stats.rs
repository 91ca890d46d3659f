//! Dashboard aggregation over the gate log.
//!
//! All calendar math is UTC and every bucket is half-open `[start, end)`.
//! Weeks start on Monday. Months and years follow calendar boundaries.
//! The sparse (`stats_by_period`) and dense (`movements`) paths share the same
//! helpers so a crossing always lands in the same day, week, or month.

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::db::GateLogDB;
use crate::error::{GateError, GateResult};
use crate::model::DirectionCounts;

/// Grouping key for sparse statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl FromStr for Granularity {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => Err(GateError::Validation(format!(
                "invalid period '{}', use: day, week, month",
                other
            ))),
        }
    }
}

impl Granularity {
    /// `YYYY-MM-DD` for days and weeks (the Monday), `YYYY-MM` for months.
    pub fn period_key(&self, ts: DateTime<Utc>) -> String {
        let date = ts.date_naive();
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Week => week_start(date).format("%Y-%m-%d").to_string(),
            Granularity::Month => date.format("%Y-%m").to_string(),
        }
    }
}

/// Window of a dense movement series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementRange {
    Today,
    Last7Days,
    Last12Months,
    Last5Years,
}

impl FromStr for MovementRange {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(MovementRange::Today),
            "7days" => Ok(MovementRange::Last7Days),
            "monthly" => Ok(MovementRange::Last12Months),
            "yearly" => Ok(MovementRange::Last5Years),
            other => Err(GateError::Validation(format!(
                "invalid period '{}', use: today, 7days, monthly, yearly",
                other
            ))),
        }
    }
}

impl MovementRange {
    pub fn bucket_count(&self) -> usize {
        match self {
            MovementRange::Today => 24,
            MovementRange::Last7Days => 7,
            MovementRange::Last12Months => 12,
            MovementRange::Last5Years => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementRange::Today => "today",
            MovementRange::Last7Days => "7days",
            MovementRange::Last12Months => "monthly",
            MovementRange::Last5Years => "yearly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementBucket {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub inbound: u64,
    pub outbound: u64,
}

#[derive(Debug, Serialize)]
pub struct MovementSeries {
    pub period: &'static str,
    pub movements: Vec<MovementBucket>,
}

// bucket under construction
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    label: String,
    date: Option<String>,
}

/// Read-only counting over `GateLogDB`, computed on every call.
pub struct AggregationEngine<'a> {
    log: &'a GateLogDB,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(log: &'a GateLogDB) -> Self {
        Self { log }
    }

    /// Inbound/outbound totals over all history.
    pub fn counts(&self) -> GateResult<DirectionCounts> {
        self.log.count_by_direction()
    }

    /// Counts per period that has at least one entry, keyed so the map
    /// iterates chronologically.
    pub fn stats_by_period(
        &self,
        granularity: Granularity,
    ) -> GateResult<BTreeMap<String, DirectionCounts>> {
        let mut stats: BTreeMap<String, DirectionCounts> = BTreeMap::new();
        for (direction, ts) in self.log.all_movements()? {
            stats
                .entry(granularity.period_key(ts))
                .or_default()
                .record(direction);
        }
        Ok(stats)
    }

    /// Fixed-length series ending at `now`, oldest bucket first. Empty
    /// buckets are present with zero counts.
    pub fn movements(
        &self,
        range: MovementRange,
        now: DateTime<Utc>,
    ) -> GateResult<Vec<MovementBucket>> {
        let windows = windows_for(range, now);
        let mut counts = vec![DirectionCounts::default(); windows.len()];

        if let (Some(first), Some(last)) = (windows.first(), windows.last()) {
            for (direction, ts) in self.log.movements_between(first.start, last.end)? {
                // windows are contiguous, so the owner is the last one starting at or before ts
                let idx = windows.partition_point(|w| w.start <= ts);
                if idx > 0 && ts < windows[idx - 1].end {
                    counts[idx - 1].record(direction);
                }
            }
        }

        Ok(windows
            .into_iter()
            .zip(counts)
            .map(|(w, c)| MovementBucket {
                label: w.label,
                date: w.date,
                inbound: c.inbound,
                outbound: c.outbound,
            })
            .collect())
    }
}

// ---------------------- calendar helpers ----------------------

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

// first day of the month `back` months before (year, month)
fn month_back(year: i32, month: u32, back: u32) -> NaiveDate {
    let total = year * 12 + month as i32 - 1 - back as i32;
    let (y, m) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
    // day 1 of a month in 1..=12 always exists
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MIN)
}

fn year_start(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn windows_for(range: MovementRange, now: DateTime<Utc>) -> Vec<Window> {
    let today = now.date_naive();
    let n = range.bucket_count();
    match range {
        MovementRange::Today => {
            let day_start = midnight(today);
            (0..n as i64)
                .map(|hour| {
                    let start = day_start + Duration::hours(hour);
                    Window {
                        start,
                        end: start + Duration::hours(1),
                        label: format!("{:02}:00", start.hour()),
                        date: None,
                    }
                })
                .collect()
        }
        MovementRange::Last7Days => {
            let mut windows: Vec<Window> = (0..n as i64)
                .map(|back| {
                    let day = today - Duration::days(back);
                    let start = midnight(day);
                    Window {
                        start,
                        end: start + Duration::days(1),
                        label: day.format("%a").to_string(),
                        date: Some(day.format("%Y-%m-%d").to_string()),
                    }
                })
                .collect();
            windows.reverse();
            windows
        }
        MovementRange::Last12Months => {
            let mut windows: Vec<Window> = (0..n as u32)
                .map(|back| {
                    let first = month_back(today.year(), today.month(), back);
                    let next = first
                        .checked_add_months(Months::new(1))
                        .unwrap_or(NaiveDate::MAX);
                    Window {
                        start: midnight(first),
                        end: midnight(next),
                        label: first.format("%b %Y").to_string(),
                        date: Some(first.format("%Y-%m").to_string()),
                    }
                })
                .collect();
            windows.reverse();
            windows
        }
        MovementRange::Last5Years => {
            let mut windows: Vec<Window> = (0..n as i32)
                .map(|back| {
                    let year = today.year() - back;
                    Window {
                        start: midnight(year_start(year)),
                        end: midnight(year_start(year + 1)),
                        label: year.to_string(),
                        date: Some(year.to_string()),
                    }
                })
                .collect();
            windows.reverse();
            windows
        }
    }
}
