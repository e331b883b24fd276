//! Time buckets for the page-view series

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeriesBucket {
    #[default]
    Day,
    Week,
}

impl SeriesBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesBucket::Day => "day",
            SeriesBucket::Week => "week",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "day" => Some(SeriesBucket::Day),
            "week" => Some(SeriesBucket::Week),
            _ => None,
        }
    }

    /// Sort key of the bucket holding `ts`: the day itself, or the Monday
    /// opening its ISO week.
    pub fn key(&self, ts: DateTime<Utc>) -> NaiveDate {
        let date = ts.date_naive();
        match self {
            SeriesBucket::Day => date,
            SeriesBucket::Week => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(offset)).unwrap_or(date)
            }
        }
    }

    /// Display label for a bucket key: `2024-03-05` for days, `2024-W10`
    /// for ISO weeks.
    pub fn format_key(&self, key: NaiveDate) -> String {
        match self {
            SeriesBucket::Day => key.format("%Y-%m-%d").to_string(),
            SeriesBucket::Week => {
                let week = key.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
        }
    }

    pub fn label(&self, ts: DateTime<Utc>) -> String {
        self.format_key(self.key(ts))
    }
}
