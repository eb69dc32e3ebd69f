use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

pub const DEFAULT_HISTORY_WEEKS: u32 = 4;
pub const MAX_HISTORY_WEEKS: u32 = 52;

/// Half-open time range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Window {
    pub fn week_of(week_start: NaiveDate) -> Self {
        let from = start_of_day(week_start);
        Window {
            from,
            to: from + Duration::days(7),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

/// The windows a weekly report reads: the reporting week, the week before it,
/// and the `history_weeks` weeks preceding the reporting week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportWindows {
    pub week_start: NaiveDate,
    pub current: Window,
    pub previous: Window,
    pub historical: Window,
    pub history_weeks: u32,
}

impl ReportWindows {
    pub fn for_week(week_start: NaiveDate, history_weeks: u32) -> Self {
        let history_weeks = clamp_history_weeks(history_weeks);
        let current = Window::week_of(week_start);
        let previous = Window {
            from: current.from - Duration::days(7),
            to: current.from,
        };
        let historical = Window {
            from: current.from - Duration::days(7 * i64::from(history_weeks)),
            to: current.from,
        };

        ReportWindows {
            week_start,
            current,
            previous,
            historical,
            history_weeks,
        }
    }

    /// Index of the historical week containing `at`, 0 being the oldest.
    pub fn history_slot(&self, at: DateTime<Utc>) -> Option<usize> {
        if !self.historical.contains(at) {
            return None;
        }
        let days = (at - self.historical.from).num_days();
        usize::try_from(days / 7).ok()
    }
}

pub fn clamp_history_weeks(history_weeks: u32) -> u32 {
    history_weeks.clamp(1, MAX_HISTORY_WEEKS)
}

/// Monday of the ISO week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn current_week_start() -> NaiveDate {
    week_start_for(Utc::now().date_naive())
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
