//! Time window normalization.
//!
//! A [`Timeframe`] is a loosely specified filter (explicit instants, epoch
//! seconds, a calendar year/month/ISO week, or a period relative to now).
//! [`normalize`] turns it into a half-open [`TimeRange`] whose calendar
//! boundaries are local midnights in the requested timezone.

mod timezone;

pub use timezone::{canonical_timezone_name, parse_timezone, resolve_timezone, TimezoneSources};

use chrono::{DateTime, Datelike, Days, Duration, IsoWeek, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    AllTime,
}

impl Period {
    /// Case-insensitive parse; unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Period> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Period::Day),
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            "year" => Some(Period::Year),
            "all_time" | "alltime" | "all" => Some(Period::AllTime),
            _ => None,
        }
    }

    fn approximate_length(&self) -> Duration {
        match self {
            Period::Day => Duration::days(1),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
            Period::Year => Duration::days(365),
            Period::AllTime => Duration::zero(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeframe {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub from_unix: Option<i64>,
    pub to_unix: Option<i64>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub period: Option<Period>,
}

impl Timeframe {
    pub fn period(period: Period) -> Self {
        Timeframe {
            period: Some(period),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Timeframe::default()
    }
}

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// A range covering every representable instant.
    pub fn all() -> Self {
        TimeRange {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Last whole second inside the range.
    pub fn last_second(&self) -> DateTime<Utc> {
        self.end - Duration::seconds(1)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("ISO week must be between 1 and 53, got {0}")]
    InvalidWeek(u32),
    #[error("ISO year {year} has no week {week}")]
    WeekOutOfYear { year: i32, week: u32 },
    #[error("epoch seconds {0} out of range")]
    InvalidEpoch(i64),
    #[error("year {0} out of range")]
    InvalidYear(i32),
}

/// Normalize `timeframe` against the current instant.
pub fn normalize_now(timeframe: &Timeframe, tz: Tz) -> Result<Option<TimeRange>, TimeframeError> {
    normalize(timeframe, tz, Utc::now())
}

/// Normalize `timeframe` in `tz`, evaluated at `now`.
///
/// Precedence: explicit instants, epoch seconds, year/month/week, period.
/// Returns `Ok(None)` when nothing is set.
pub fn normalize(
    timeframe: &Timeframe,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<Option<TimeRange>, TimeframeError> {
    if let Some(from) = timeframe.from {
        return Ok(Some(TimeRange {
            start: from,
            end: timeframe.to.unwrap_or(now),
        }));
    }

    if let Some(from_unix) = timeframe.from_unix {
        let end = match timeframe.to_unix {
            Some(to_unix) => from_epoch(to_unix)?,
            None => now,
        };
        return Ok(Some(TimeRange {
            start: from_epoch(from_unix)?,
            end,
        }));
    }

    let local_now = now.with_timezone(&tz);

    if let Some(month) = timeframe.month {
        if !(1..=12).contains(&month) {
            return Err(TimeframeError::InvalidMonth(month));
        }
        let year = timeframe.year.unwrap_or_else(|| {
            if local_now.month() < month {
                local_now.year() - 1
            } else {
                local_now.year()
            }
        });
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        return Ok(Some(TimeRange {
            start: local_midnight(tz, calendar_date(year, month, 1)?),
            end: local_midnight(tz, calendar_date(next_year, next_month, 1)?),
        }));
    }

    if let Some(week) = timeframe.week {
        if !(1..=53).contains(&week) {
            return Err(TimeframeError::InvalidWeek(week));
        }
        let year = match timeframe.year {
            Some(year) => {
                if week > iso_weeks_in_year(year)? {
                    return Err(TimeframeError::WeekOutOfYear { year, week });
                }
                year
            }
            None => most_recent_iso_year(local_now.iso_week(), week)?,
        };
        let start = iso_week_start(year, week)?;
        let end = start
            .checked_add_days(Days::new(7))
            .ok_or(TimeframeError::InvalidYear(year))?;
        return Ok(Some(TimeRange {
            start: local_midnight(tz, start),
            end: local_midnight(tz, end),
        }));
    }

    if let Some(year) = timeframe.year {
        return Ok(Some(TimeRange {
            start: local_midnight(tz, calendar_date(year, 1, 1)?),
            end: local_midnight(tz, calendar_date(year + 1, 1, 1)?),
        }));
    }

    if let Some(period) = timeframe.period {
        return Ok(Some(TimeRange {
            start: period_start(period, tz, now),
            end: now,
        }));
    }

    Ok(None)
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, TimeframeError> {
    DateTime::from_timestamp(secs, 0).ok_or(TimeframeError::InvalidEpoch(secs))
}

fn calendar_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, TimeframeError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(TimeframeError::InvalidYear(year))
}

/// Monday of ISO week `week` of `year` (week 1 contains January 4th).
/// 52 or 53.
fn iso_weeks_in_year(year: i32) -> Result<u32, TimeframeError> {
    // Dec 28 always falls in the last ISO week of its year
    Ok(calendar_date(year, 12, 28)?.iso_week().week())
}

/// Latest ISO year whose `week` is not after `current`.
fn most_recent_iso_year(current: IsoWeek, week: u32) -> Result<i32, TimeframeError> {
    let mut year = if week <= current.week() {
        current.year()
    } else {
        current.year() - 1
    };
    // Week 53 only exists in some years, at most six years apart
    while week > iso_weeks_in_year(year)? {
        year -= 1;
    }
    Ok(year)
}

fn iso_week_start(year: i32, week: u32) -> Result<NaiveDate, TimeframeError> {
    let jan4 = calendar_date(year, 1, 4)?;
    let week1_monday = jan4 - Days::new(jan4.weekday().num_days_from_monday() as u64);
    week1_monday
        .checked_add_days(Days::new(7 * (week as u64 - 1)))
        .ok_or(TimeframeError::InvalidYear(year))
}

/// First instant of `date` in `tz`. A midnight skipped by a DST jump resolves
/// to the first valid local time after it.
pub(crate) fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    let mut candidate = midnight;
    // DST gaps never exceed a few hours.
    for _ in 0..(24 * 4) {
        if let Some(instant) = tz.from_local_datetime(&candidate).earliest() {
            return instant.with_timezone(&Utc);
        }
        candidate += Duration::minutes(15);
    }
    Utc.from_utc_datetime(&midnight)
}

/// `now` minus one `period`, computed on the local calendar of `tz`.
fn period_start(period: Period, tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let start = match period {
        Period::AllTime => return DateTime::UNIX_EPOCH,
        Period::Day => local_now.checked_sub_days(Days::new(1)),
        Period::Week => local_now.checked_sub_days(Days::new(7)),
        Period::Month => local_now.checked_sub_months(Months::new(1)),
        Period::Year => local_now.checked_sub_months(Months::new(12)),
    };
    start
        .map(|s| s.with_timezone(&Utc))
        .unwrap_or_else(|| now - period.approximate_length())
}
