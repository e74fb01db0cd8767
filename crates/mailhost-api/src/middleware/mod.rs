//! HTTP middleware shared by every route

pub mod metrics;

pub use metrics::{metrics_middleware, prometheus_metrics};
