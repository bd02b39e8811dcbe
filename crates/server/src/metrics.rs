//! Prometheus metrics

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use voice_assistant_core::TurnResult;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Idempotent; later calls reuse the
/// first handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Render the current metrics snapshot (`/metrics` route)
pub async fn metrics_handler() -> String {
    match HANDLE.get() {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

pub fn record_session_opened() {
    counter!("va_sessions_opened_total").increment(1);
    gauge!("va_sessions_active").increment(1.0);
}

pub fn record_session_closed() {
    counter!("va_sessions_closed_total").increment(1);
    gauge!("va_sessions_active").decrement(1.0);
}

pub fn record_interrupt() {
    counter!("va_interrupts_total").increment(1);
}

/// Per-turn telemetry
pub fn record_turn(result: &TurnResult) {
    histogram!("va_turn_duration_seconds").record(result.processing_time.as_secs_f64());
    histogram!("va_turn_audio_chunks").record(result.audio_chunks_emitted as f64);

    if let Some(error_type) = &result.error {
        counter!("va_turn_errors_total", "error_type" => error_type.clone()).increment(1);
    } else if result.interrupted {
        counter!("va_turns_interrupted_total").increment(1);
    } else {
        counter!("va_turns_completed_total").increment(1);
    }
}
