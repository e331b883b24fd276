//! Dashboard report shape

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TechnicalPerformance {
    pub load_time: f64,
    pub dom_content_loaded: f64,
}

/// Page views per time bucket, ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageViewSeries {
    pub points: Vec<(String, u64)>,
}

impl PageViewSeries {
    pub fn labels(&self) -> Vec<&str> {
        self.points.iter().map(|(label, _)| label.as_str()).collect()
    }

    pub fn data(&self) -> Vec<u64> {
        self.points.iter().map(|(_, count)| *count).collect()
    }
}

/// Derived analytics snapshot. Recomputed per request, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub unique_visitors: u64,
    pub page_views: u64,
    pub sessions: u64,
    pub traffic_sources: BTreeMap<String, u64>,
    pub bounce_rate: f64,
    pub avg_session_duration: f64,
    pub pages_per_session: f64,
    pub interaction_events: u64,
    pub conversion_rate: f64,
    pub funnel_drop_off: BTreeMap<String, f64>,
    pub form_abandonment: f64,
    pub cta_ctr: f64,
    pub retention_rate: f64,
    pub technical_performance: TechnicalPerformance,
    /// Emitted as the parallel `page_views_labels` / `page_views_data` arrays
    #[serde(flatten)]
    pub page_views_series: PageViewSeries,
}

impl Serialize for PageViewSeries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PageViewSeries", 2)?;
        state.serialize_field("page_views_labels", &self.labels())?;
        state.serialize_field("page_views_data", &self.data())?;
        state.end()
    }
}

/// `numerator / denominator * 100`, or 0 when there is nothing to divide by.
pub fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round2(numerator as f64 / denominator as f64 * 100.0)
}

/// Arithmetic mean rounded to two decimals; 0 for an empty subset.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
