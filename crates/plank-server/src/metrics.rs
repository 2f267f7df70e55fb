//! Prometheus recorder setup and metric names.

use metrics::describe_counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use plank_relay::feed::{FEED_ERRORS_TOTAL, FEED_EVENTS_TOTAL};
use plank_relay::queue::QUEUE_DROPPED_TOTAL;

/// Events delivered to clients across all transports.
pub const EVENTS_DELIVERED_TOTAL: &str = "plank_events_delivered_total";

/// Install the global Prometheus recorder and return the render handle.
///
/// Call once at startup, before anything records a metric.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_counter!(FEED_EVENTS_TOTAL, "Events observed by the feed listener");
    describe_counter!(FEED_ERRORS_TOTAL, "Feed listener change log read failures");
    describe_counter!(
        QUEUE_DROPPED_TOTAL,
        "Events dropped from session queues due to overflow"
    );
    describe_counter!(
        EVENTS_DELIVERED_TOTAL,
        "Events delivered to clients across all transports"
    );
    Ok(handle)
}
