//! Prometheus recorder setup.

use anyhow::Result;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Latency buckets for request durations, in seconds
const SECONDS_DURATION_BUCKETS: &[f64; 11] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Install the global Prometheus recorder.
///
/// The returned handle renders the `/metrics` payload.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            SECONDS_DURATION_BUCKETS,
        )?
        .install_recorder()?;

    Ok(handle)
}
