//! Metrics aggregation over an event snapshot
//!
//! Single pass over the events, counting into per-type accumulators, then
//! derive rates and means. Nothing here touches the store except
//! [`MetricsAggregator::report`], which reads one snapshot and hands it to
//! the pure [`MetricsAggregator::compute`].

use super::bucket::SeriesBucket;
use super::report::{mean, percentage, PageViewSeries, Report, TechnicalPerformance};
use crate::event_store::{Event, EventPayload, EventStore, StoreError, TimeRange};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

/// Reference count the funnel step percentages are divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunnelBaseline {
    /// Total page views
    PageViews,
    /// Count of the configured starting funnel step
    #[default]
    StartStep,
}

impl FunnelBaseline {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunnelBaseline::PageViews => "page_views",
            FunnelBaseline::StartStep => "start_step",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "page_views" => Some(FunnelBaseline::PageViews),
            "start_step" => Some(FunnelBaseline::StartStep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub funnel_baseline: FunnelBaseline,
    /// Step name used as the funnel reference with [`FunnelBaseline::StartStep`]
    pub funnel_start_step: String,
    /// Step name that marks a form being started, for `form_abandonment`
    pub form_start_step: String,
    pub series_bucket: SeriesBucket,
    /// Keep only the most recent N buckets; `None` keeps all
    pub series_limit: Option<usize>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            funnel_baseline: FunnelBaseline::StartStep,
            funnel_start_step: "view_form".to_string(),
            form_start_step: "view_form".to_string(),
            series_bucket: SeriesBucket::Day,
            series_limit: Some(7),
        }
    }
}

#[derive(Default)]
struct Tally<'a> {
    users: HashSet<&'a str>,
    sessions: HashSet<&'a str>,
    page_views: u64,
    clicks: u64,
    conversions: u64,
    cta_clicks: u64,
    bounced_sessions: u64,
    durations: Vec<f64>,
    pages: Vec<f64>,
    traffic_sources: BTreeMap<String, u64>,
    funnel_steps: BTreeMap<&'a str, u64>,
    form_abandonments: u64,
    returning_users: u64,
    load_times: Vec<f64>,
    dom_content_loaded: Vec<f64>,
    page_view_buckets: BTreeMap<NaiveDate, u64>,
}

pub struct MetricsAggregator {
    config: ReportConfig,
}

impl MetricsAggregator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Read the events inside `range` and compute the report.
    pub async fn report(&self, store: &dyn EventStore, range: TimeRange) -> Result<Report, StoreError> {
        let events = store.snapshot(range).await?;
        log::debug!(
            "📊 Computing report over {} events from {}",
            events.len(),
            store.backend_type()
        );
        Ok(self.compute(&events))
    }

    pub fn compute(&self, events: &[Event]) -> Report {
        let mut tally = Tally::default();

        for event in events {
            tally.users.insert(event.user_id.as_str());
            tally.sessions.insert(event.session_id.as_str());

            match &event.payload {
                EventPayload::PageView(_) => {
                    tally.page_views += 1;
                    let key = self.config.series_bucket.key(event.timestamp);
                    *tally.page_view_buckets.entry(key).or_insert(0) += 1;
                }
                EventPayload::Click(_) => tally.clicks += 1,
                EventPayload::Conversion(_) => tally.conversions += 1,
                EventPayload::SessionEnd(s) => {
                    if s.bounced {
                        tally.bounced_sessions += 1;
                    }
                    tally.durations.extend(s.duration);
                    tally.pages.extend(s.pages);
                }
                EventPayload::TrafficSource(t) => {
                    let source = match t.referrer.as_deref().map(str::trim) {
                        Some(r) if !r.is_empty() => r.to_string(),
                        _ => "direct".to_string(),
                    };
                    *tally.traffic_sources.entry(source).or_insert(0) += 1;
                }
                EventPayload::FunnelStep(f) => {
                    if let Some(step) = f.step.as_deref() {
                        *tally.funnel_steps.entry(step).or_insert(0) += 1;
                    }
                }
                EventPayload::FormAbandonment(_) => tally.form_abandonments += 1,
                EventPayload::CtaClick(_) => tally.cta_clicks += 1,
                EventPayload::UserType(u) => {
                    if u.returning {
                        tally.returning_users += 1;
                    }
                }
                EventPayload::Performance(p) => {
                    tally.load_times.extend(p.load_time);
                    tally.dom_content_loaded.extend(p.dom_content_loaded);
                }
                EventPayload::Other { .. } => {}
            }
        }

        self.finish(tally)
    }

    fn finish(&self, tally: Tally<'_>) -> Report {
        let unique_visitors = tally.users.len() as u64;
        let sessions = tally.sessions.len() as u64;
        let page_views = tally.page_views;

        let step_count = |name: &str| tally.funnel_steps.get(name).copied().unwrap_or(0);

        let funnel_reference = match self.config.funnel_baseline {
            FunnelBaseline::PageViews => page_views,
            FunnelBaseline::StartStep => step_count(self.config.funnel_start_step.as_str()),
        };
        let funnel_drop_off = tally
            .funnel_steps
            .iter()
            .map(|(step, count)| (step.to_string(), percentage(*count, funnel_reference)))
            .collect();

        let bucket = self.config.series_bucket;
        let mut points: Vec<(String, u64)> = tally
            .page_view_buckets
            .into_iter()
            .map(|(key, count)| (bucket.format_key(key), count))
            .collect();
        if let Some(limit) = self.config.series_limit {
            let excess = points.len().saturating_sub(limit);
            points.drain(..excess);
        }

        Report {
            unique_visitors,
            page_views,
            sessions,
            traffic_sources: tally.traffic_sources,
            bounce_rate: percentage(tally.bounced_sessions, sessions),
            avg_session_duration: mean(&tally.durations),
            pages_per_session: mean(&tally.pages),
            interaction_events: tally.clicks,
            conversion_rate: percentage(tally.conversions, page_views),
            funnel_drop_off,
            form_abandonment: percentage(
                tally.form_abandonments,
                step_count(self.config.form_start_step.as_str()),
            ),
            cta_ctr: percentage(tally.cta_clicks, page_views),
            retention_rate: percentage(tally.returning_users, unique_visitors),
            technical_performance: TechnicalPerformance {
                load_time: mean(&tally.load_times),
                dom_content_loaded: mean(&tally.dom_content_loaded),
            },
            page_views_series: PageViewSeries { points },
        }
    }
}
