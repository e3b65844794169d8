//! Generic metric shapes consumed by dashboard tiles.

pub mod metrics;

pub use metrics::{
    HealthAggregate, HealthStatus, ScalarMetric, TimeseriesPoint, TimeseriesResponse,
    TimeseriesSeries,
};
