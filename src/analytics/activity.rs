//! Listen counts per calendar step, gaps filled with zeros.

use super::Analytics;
use crate::catalog_store::Scope;
use crate::error::{storage, CatalogError, CatalogResult};
use crate::timeframe::{local_midnight, normalize, TimeRange, Timeframe};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Number of steps returned when no year or month is requested.
pub const DEFAULT_ACTIVITY_RANGE: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Step {
    /// Case-insensitive parse; unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Step> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Some(Step::Day),
            "week" => Some(Step::Week),
            "month" => Some(Step::Month),
            "year" => Some(Step::Year),
            _ => None,
        }
    }

    fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Step::Day => date.checked_add_days(Days::new(1)),
            Step::Week => date.checked_add_days(Days::new(7)),
            Step::Month => date.checked_add_months(Months::new(1)),
            Step::Year => date.checked_add_months(Months::new(12)),
        }
    }

    fn rewind(&self, date: NaiveDate, steps: u32) -> Option<NaiveDate> {
        match self {
            Step::Day => date.checked_sub_days(Days::new(steps as u64)),
            Step::Week => date.checked_sub_days(Days::new(7 * steps as u64)),
            Step::Month => date.checked_sub_months(Months::new(steps)),
            Step::Year => date.checked_sub_months(Months::new(12 * steps)),
        }
    }

    /// First day of the step containing `date`.
    fn align(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Step::Day => date,
            Step::Week => date - Days::new(date.weekday().num_days_from_monday() as u64),
            Step::Month => date.with_day(1).unwrap_or(date),
            Step::Year => date.with_ordinal(1).unwrap_or(date),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListenActivityOpts {
    pub step: Step,
    /// Number of steps ending with the current one. Zero or unset means
    /// [`DEFAULT_ACTIVITY_RANGE`]. Ignored when a year or month is given.
    pub range: Option<u32>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    /// Overrides the timezone of the [`Analytics`] instance.
    pub timezone: Option<Tz>,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityPoint {
    pub start: DateTime<Utc>,
    pub listen_count: i64,
}

impl Analytics {
    pub fn listen_activity(&self, opts: &ListenActivityOpts) -> CatalogResult<Vec<ActivityPoint>> {
        self.listen_activity_at(opts, Utc::now())
    }

    /// Activity evaluated as if the current instant were `now`.
    pub fn listen_activity_at(
        &self,
        opts: &ListenActivityOpts,
        now: DateTime<Utc>,
    ) -> CatalogResult<Vec<ActivityPoint>> {
        let tz = opts.timezone.unwrap_or(self.timezone);
        let ranges = activity_ranges(opts, tz, now)?;
        let counts = self
            .store
            .get_listen_activity(&ranges, opts.scope)
            .map_err(storage("get_listen_activity"))?;
        Ok(ranges
            .iter()
            .zip(counts)
            .map(|(range, listen_count)| ActivityPoint {
                start: range.start,
                listen_count,
            })
            .collect())
    }
}

/// One range per step of the requested window.
fn activity_ranges(
    opts: &ListenActivityOpts,
    tz: Tz,
    now: DateTime<Utc>,
) -> CatalogResult<Vec<TimeRange>> {
    let (first_day, window_end) = if opts.year.is_some() || opts.month.is_some() {
        let calendar = Timeframe {
            year: opts.year,
            month: opts.month,
            ..Default::default()
        };
        let window = normalize(&calendar, tz, now)
            .map_err(|e| CatalogError::invalid_input(e.to_string()))?
            .ok_or_else(|| CatalogError::invalid_input("empty activity window"))?;
        (window.start.with_timezone(&tz).date_naive(), window.end)
    } else {
        let steps = match opts.range {
            Some(0) | None => DEFAULT_ACTIVITY_RANGE,
            Some(n) => n,
        };
        let current = opts.step.align(now.with_timezone(&tz).date_naive());
        let first = opts
            .step
            .rewind(current, steps - 1)
            .ok_or_else(|| CatalogError::invalid_input("activity range out of bounds"))?;
        let end = opts
            .step
            .advance(current)
            .ok_or_else(|| CatalogError::invalid_input("activity range out of bounds"))?;
        (first, local_midnight(tz, end))
    };

    let mut ranges = Vec::new();
    let mut day = first_day;
    loop {
        let start = local_midnight(tz, day);
        if start >= window_end {
            break;
        }
        let Some(next) = opts.step.advance(day) else {
            break;
        };
        let end = local_midnight(tz, next).min(window_end);
        ranges.push(TimeRange { start, end });
        day = next;
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::library;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_default_window_is_last_twelve_days_zero_filled() {
        let lib = library();
        let now = utc(2024, 3, 20, 15);
        lib.listen(lib.tracks[0], utc(2024, 3, 20, 9).timestamp());
        lib.listen(lib.tracks[0], utc(2024, 3, 20, 10).timestamp());
        lib.listen(lib.tracks[1], utc(2024, 3, 12, 23).timestamp());
        // Outside the window
        lib.listen(lib.tracks[1], utc(2024, 3, 8, 12).timestamp());
        let analytics = Analytics::new(lib.store.clone());

        let points = analytics
            .listen_activity_at(&ListenActivityOpts::default(), now)
            .unwrap();
        assert_eq!(points.len(), 12);
        assert_eq!(points[0].start, utc(2024, 3, 9, 0));
        assert_eq!(points[11].start, utc(2024, 3, 20, 0));
        assert_eq!(points[3].listen_count, 1);
        assert_eq!(points[11].listen_count, 2);
        assert_eq!(points.iter().map(|p| p.listen_count).sum::<i64>(), 3);
    }

    #[test]
    fn test_month_window_by_week_in_timezone() {
        let lib = library();
        let analytics = Analytics::new(lib.store.clone());
        let rome: Tz = "Europe/Rome".parse().unwrap();
        // 2024-02-01 00:30 in Rome is still January in UTC
        lib.listen(lib.tracks[0], utc(2024, 1, 31, 23).timestamp() + 1800);

        let opts = ListenActivityOpts {
            step: Step::Week,
            year: Some(2024),
            month: Some(2),
            timezone: Some(rome),
            ..Default::default()
        };
        let points = analytics
            .listen_activity_at(&opts, utc(2024, 6, 1, 0))
            .unwrap();
        // Feb 1, 8, 15, 22, 29
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].start, utc(2024, 1, 31, 23));
        assert_eq!(points[0].listen_count, 1);
    }

    #[test]
    fn test_month_steps_and_scope() {
        let lib = library();
        let analytics = Analytics::new(lib.store.clone());
        lib.listen(lib.tracks[0], utc(2023, 11, 5, 0).timestamp());
        lib.listen(lib.tracks[2], utc(2023, 12, 5, 0).timestamp());

        let opts = ListenActivityOpts {
            step: Step::Month,
            range: Some(3),
            scope: Scope::Artist(lib.artists[0]),
            ..Default::default()
        };
        let points = analytics
            .listen_activity_at(&opts, utc(2024, 1, 10, 0))
            .unwrap();
        let counts: Vec<i64> = points.iter().map(|p| p.listen_count).collect();
        assert_eq!(counts, vec![1, 0, 0]);
        assert_eq!(points[0].start, utc(2023, 11, 1, 0));
    }

    #[test]
    fn test_year_step_and_parse() {
        assert_eq!(Step::parse("WEEK"), Some(Step::Week));
        assert_eq!(Step::parse("fortnight"), None);

        let lib = library();
        let analytics = Analytics::new(lib.store.clone());
        let opts = ListenActivityOpts {
            step: Step::Year,
            range: Some(2),
            ..Default::default()
        };
        let points = analytics
            .listen_activity_at(&opts, utc(2024, 7, 1, 0))
            .unwrap();
        assert_eq!(
            points.iter().map(|p| p.start).collect::<Vec<_>>(),
            vec![utc(2023, 1, 1, 0), utc(2024, 1, 1, 0)]
        );

        let invalid = ListenActivityOpts {
            month: Some(0),
            ..Default::default()
        };
        assert!(analytics.listen_activity_at(&invalid, utc(2024, 7, 1, 0)).is_err());
    }
}
