//! Prometheus metrics
//!
//! Tracks request latency, counts and status codes, plus auth-core outcomes
//! (audit events and gate decisions). Exposed in text format at `/metrics`.

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    auth_events_total: IntCounterVec,
    gate_decisions_total: IntCounterVec,
}

lazy_static! {
    static ref METRICS: Option<Metrics> = build_metrics()
        .map_err(|e| tracing::error!(error = %e, "failed to register metrics"))
        .ok();
}

fn build_metrics() -> Result<Metrics, prometheus::Error> {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        Opts::new(
            "mailhost_http_requests_total",
            "Total HTTP requests by method, endpoint and status",
        ),
        &["method", "endpoint", "status"],
    )?;
    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "mailhost_http_request_duration_seconds",
            "HTTP request duration in seconds by endpoint",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["endpoint"],
    )?;
    let auth_events_total = IntCounterVec::new(
        Opts::new(
            "mailhost_auth_events_total",
            "Authentication events by kind and outcome",
        ),
        &["event", "outcome"],
    )?;
    let gate_decisions_total = IntCounterVec::new(
        Opts::new(
            "mailhost_gate_decisions_total",
            "Request gate decisions on protected paths",
        ),
        &["decision"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration_seconds.clone()))?;
    registry.register(Box::new(auth_events_total.clone()))?;
    registry.register(Box::new(gate_decisions_total.clone()))?;

    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    Ok(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        auth_events_total,
        gate_decisions_total,
    })
}

pub fn record_auth_event(event: &str, outcome: &str) {
    if let Some(metrics) = METRICS.as_ref() {
        metrics
            .auth_events_total
            .with_label_values(&[event, outcome])
            .inc();
    }
}

pub fn record_gate_decision(decision: &str) {
    if let Some(metrics) = METRICS.as_ref() {
        metrics
            .gate_decisions_total
            .with_label_values(&[decision])
            .inc();
    }
}

/// Request count and latency per normalized endpoint
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = normalize_endpoint(request.uri().path());

    let response = next.run(request).await;

    if let Some(metrics) = METRICS.as_ref() {
        let status = response.status().as_u16().to_string();
        metrics
            .http_requests_total
            .with_label_values(&[method.as_str(), endpoint.as_str(), status.as_str()])
            .inc();
        metrics
            .http_request_duration_seconds
            .with_label_values(&[endpoint.as_str()])
            .observe(start.elapsed().as_secs_f64());
    }

    response
}

/// `GET /metrics` in Prometheus text format
pub async fn prometheus_metrics() -> Response {
    let Some(metrics) = METRICS.as_ref() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metrics.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut response = String::from_utf8_lossy(&buffer).into_owned().into_response();
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}

/// Replace UUID and numeric path segments with `:id`
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if is_uuid(seg) || is_numeric(seg) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
