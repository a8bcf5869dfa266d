//! Prometheus-compatible metrics endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use media_convert_lib::{ConversionError, ConversionObserver, RequestContext};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::state::AppState;

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// Server start time
    start_time: Instant,
    /// Total requests processed
    request_count: RwLock<u64>,
    /// Conversion requests by media kind
    requests_by_kind: RwLock<HashMap<String, u64>>,
    /// Successful conversions by media kind
    successes_by_kind: RwLock<HashMap<String, u64>>,
    /// Failures by error kind
    errors_by_type: RwLock<HashMap<String, u64>>,
    /// Upload bytes accepted for conversion
    bytes_in: RwLock<u64>,
    /// Converted bytes returned
    bytes_out: RwLock<u64>,
    /// Total time spent converting successfully
    conversion_millis: RwLock<u64>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            request_count: RwLock::new(0),
            requests_by_kind: RwLock::new(HashMap::new()),
            successes_by_kind: RwLock::new(HashMap::new()),
            errors_by_type: RwLock::new(HashMap::new()),
            bytes_in: RwLock::new(0),
            bytes_out: RwLock::new(0),
            conversion_millis: RwLock::new(0),
        }
    }

    /// Record an incoming conversion request
    pub fn record_request(&self, kind: &str) {
        *self.request_count.write() += 1;
        *self
            .requests_by_kind
            .write()
            .entry(kind.to_string())
            .or_insert(0) += 1;
    }

    /// Record error
    pub fn record_error(&self, error_type: &str) {
        *self
            .errors_by_type
            .write()
            .entry(error_type.to_string())
            .or_insert(0) += 1;
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn request_count(&self) -> u64 {
        *self.request_count.read()
    }

    pub fn error_count(&self, error_type: &str) -> u64 {
        self.errors_by_type
            .read()
            .get(error_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn success_count(&self, kind: &str) -> u64 {
        self.successes_by_kind
            .read()
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        // Server info
        output.push_str("# HELP media_converter_uptime_seconds Server uptime in seconds\n");
        output.push_str("# TYPE media_converter_uptime_seconds counter\n");
        output.push_str(&format!(
            "media_converter_uptime_seconds {}\n",
            self.uptime_secs()
        ));

        output.push_str(
            "\n# HELP media_converter_start_time_seconds Server start time as Unix timestamp\n",
        );
        output.push_str("# TYPE media_converter_start_time_seconds gauge\n");
        output.push_str(&format!(
            "media_converter_start_time_seconds {}\n",
            std::time::SystemTime::UNIX_EPOCH
                .elapsed()
                .unwrap_or(Duration::ZERO)
                .as_secs()
                .saturating_sub(self.uptime_secs())
        ));

        // Request metrics
        output.push_str("\n# HELP media_converter_requests_total Total conversion requests\n");
        output.push_str("# TYPE media_converter_requests_total counter\n");
        output.push_str(&format!(
            "media_converter_requests_total {}\n",
            *self.request_count.read()
        ));

        output.push_str("\n# HELP media_converter_requests_by_kind Conversion requests by media kind\n");
        output.push_str("# TYPE media_converter_requests_by_kind counter\n");
        for (kind, count) in sorted(&self.requests_by_kind.read()) {
            output.push_str(&format!(
                "media_converter_requests_by_kind{{kind=\"{}\"}} {}\n",
                kind, count
            ));
        }

        output.push_str("\n# HELP media_converter_conversions_succeeded_total Successful conversions by media kind\n");
        output.push_str("# TYPE media_converter_conversions_succeeded_total counter\n");
        for (kind, count) in sorted(&self.successes_by_kind.read()) {
            output.push_str(&format!(
                "media_converter_conversions_succeeded_total{{kind=\"{}\"}} {}\n",
                kind, count
            ));
        }

        // Bytes
        output.push_str("\n# HELP media_converter_bytes_in_total Upload bytes accepted for conversion\n");
        output.push_str("# TYPE media_converter_bytes_in_total counter\n");
        output.push_str(&format!(
            "media_converter_bytes_in_total {}\n",
            *self.bytes_in.read()
        ));

        output.push_str("\n# HELP media_converter_bytes_out_total Converted bytes returned\n");
        output.push_str("# TYPE media_converter_bytes_out_total counter\n");
        output.push_str(&format!(
            "media_converter_bytes_out_total {}\n",
            *self.bytes_out.read()
        ));

        output.push_str("\n# HELP media_converter_conversion_seconds_total Time spent in successful conversions\n");
        output.push_str("# TYPE media_converter_conversion_seconds_total counter\n");
        output.push_str(&format!(
            "media_converter_conversion_seconds_total {:.3}\n",
            *self.conversion_millis.read() as f64 / 1000.0
        ));

        // Error metrics
        output.push_str("\n# HELP media_converter_errors_total Total errors by type\n");
        output.push_str("# TYPE media_converter_errors_total counter\n");
        for (error_type, count) in sorted(&self.errors_by_type.read()) {
            output.push_str(&format!(
                "media_converter_errors_total{{type=\"{}\"}} {}\n",
                error_type, count
            ));
        }

        output
    }
}

fn sorted(map: &HashMap<String, u64>) -> Vec<(&String, &u64)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort();
    entries
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionObserver for Metrics {
    fn on_succeeded(&self, ctx: &RequestContext<'_>, output_bytes: u64, elapsed: Duration) {
        *self
            .successes_by_kind
            .write()
            .entry(ctx.kind.to_string())
            .or_insert(0) += 1;
        *self.bytes_in.write() += ctx.input_bytes;
        *self.bytes_out.write() += output_bytes;
        *self.conversion_millis.write() += elapsed.as_millis() as u64;
    }

    fn on_failed(&self, _ctx: &RequestContext<'_>, error: &ConversionError, _elapsed: Duration) {
        self.record_error(error.kind());
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let prometheus_output = state.metrics.export_prometheus();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        prometheus_output,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_convert_lib::MediaKind;

    fn ctx(kind: MediaKind) -> RequestContext<'static> {
        RequestContext {
            request_id: "test",
            kind,
            format: "wav",
            input_bytes: 100,
        }
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert!(metrics.uptime_secs() < 2);
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new();
        metrics.record_request("audio");
        metrics.record_request("audio");

        assert_eq!(metrics.request_count(), 2);
        assert_eq!(metrics.requests_by_kind.read().get("audio"), Some(&2));
    }

    #[test]
    fn test_observer_counts() {
        let metrics = Metrics::new();
        metrics.on_succeeded(&ctx(MediaKind::Audio), 400, Duration::from_millis(1500));
        metrics.on_failed(
            &ctx(MediaKind::Video),
            &ConversionError::Cancelled,
            Duration::ZERO,
        );

        assert_eq!(metrics.success_count("audio"), 1);
        assert_eq!(*metrics.bytes_in.read(), 100);
        assert_eq!(*metrics.bytes_out.read(), 400);
        assert_eq!(metrics.error_count("cancelled"), 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record_request("image");
        metrics.record_error("validation");
        metrics.on_succeeded(&ctx(MediaKind::Image), 10, Duration::from_millis(250));

        let output = metrics.export_prometheus();
        assert!(output.contains("media_converter_uptime_seconds"));
        assert!(output.contains("media_converter_requests_total 1"));
        assert!(output.contains("media_converter_requests_by_kind{kind=\"image\"} 1"));
        assert!(output.contains("media_converter_conversions_succeeded_total{kind=\"image\"} 1"));
        assert!(output.contains("media_converter_errors_total{type=\"validation\"} 1"));
        assert!(output.contains("media_converter_conversion_seconds_total 0.250"));
    }
}
