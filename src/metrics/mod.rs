pub mod aggregator;
pub mod bucket;
pub mod report;

pub use aggregator::{FunnelBaseline, MetricsAggregator, ReportConfig};
pub use bucket::SeriesBucket;
pub use report::{PageViewSeries, Report, TechnicalPerformance};
