//! Prometheus metrics for the conversion engine.
//!
//! Counters and histograms for both pipeline stages plus retry accounting.
//! The server crate pulls everything into its registry via [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};

/// Sessions created via `prepare`.
pub static SESSIONS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiomill_sessions_created_total",
        "Total conversion sessions created",
    )
    .unwrap()
});

/// Jobs currently being handled by workers (both stages).
pub static JOBS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "audiomill_jobs_active",
        "Jobs currently being processed by workers",
    )
    .unwrap()
});

/// Downloads that finished successfully.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiomill_downloads_completed_total",
        "Total source downloads completed successfully",
    )
    .unwrap()
});

/// Downloads that exhausted their retries.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiomill_downloads_failed_total",
        "Total source downloads that failed after retries",
    )
    .unwrap()
});

/// Transcodes by terminal result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audiomill_conversions_total", "Total transcodes"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Download stage latency.
pub static DOWNLOAD_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "audiomill_download_duration_seconds",
            "Duration of source downloads",
        )
        .buckets(vec![0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0]),
    )
    .unwrap()
});

/// Transcode stage latency.
pub static CONVERSION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "audiomill_conversion_duration_seconds",
            "Duration of transcodes",
        )
        .buckets(vec![0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0]),
    )
    .unwrap()
});

/// Retry attempts by stage.
pub static JOB_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("audiomill_job_retries_total", "Total job retry attempts"),
        &["stage"], // "download", "convert"
    )
    .unwrap()
});

/// Convert jobs bounced because their source was not downloaded yet.
pub static CONVERT_REQUEUES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "audiomill_convert_requeues_total",
        "Convert jobs re-enqueued while waiting for their source",
    )
    .unwrap()
});

/// All core collectors, for registration in the server registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SESSIONS_CREATED.clone()),
        Box::new(JOBS_ACTIVE.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(DOWNLOAD_DURATION.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(JOB_RETRIES.clone()),
        Box::new(CONVERT_REQUEUES.clone()),
    ]
}

/// Successful terminal outcomes across both stages.
pub fn success_count() -> u64 {
    DOWNLOADS_COMPLETED.get() + CONVERSIONS_TOTAL.with_label_values(&["success"]).get()
}

/// Failed terminal outcomes across both stages.
pub fn failure_count() -> u64 {
    DOWNLOADS_FAILED.get() + CONVERSIONS_TOTAL.with_label_values(&["failed"]).get()
}

/// Fraction of terminal outcomes that succeeded; 1.0 before any traffic.
pub fn success_rate() -> f64 {
    let ok = success_count();
    let err = failure_count();
    let total = ok + err;
    if total == 0 {
        1.0
    } else {
        ok as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_registers_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }

    #[test]
    fn test_success_rate_stays_in_range() {
        // Counters are process-global across the test binary; only assert
        // the zero-traffic identity when nothing has run yet.
        if success_count() == 0 && failure_count() == 0 {
            assert_eq!(success_rate(), 1.0);
        } else {
            assert!((0.0..=1.0).contains(&success_rate()));
        }
    }
}
