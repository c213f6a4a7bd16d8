use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Camera Pipeline Metrics ====
    pub static ref CAMERA_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "camera_frames_processed_total",
                "Total number of tracker frames processed",
            ),
            &["camera"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_ACTIVE_TRACKS: IntGaugeVec = {
        let metric = IntGaugeVec::new(
            Opts::new("camera_active_tracks", "Number of tracks with live state"),
            &["camera"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_CROSSINGS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "camera_crossings_total",
                "Total number of confirmed line crossings",
            ),
            &["camera", "direction"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_SOURCE_ERRORS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "camera_source_errors_total",
                "Total number of frames the detection source failed to deliver",
            ),
            &["camera"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_SNAPSHOTS_SAVED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "camera_snapshots_saved_total",
                "Total number of event snapshot attempts",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== OCR Metrics ====
    pub static ref OCR_READINGS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "ocr_readings_total",
                "Total number of plate readings by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref OCR_PROCESSING_TIME: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "ocr_processing_time_seconds",
                "Time spent reading one plate region",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref OCR_VALIDATION_SCORE: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "ocr_validation_score",
                "Combined validation score of accepted readings",
            )
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
            &["text_type"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref OCR_CONSENSUS_TRACKS: IntGauge = {
        let metric = IntGauge::new(
            "ocr_consensus_tracks",
            "Number of tracks with reading history",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Aggregator Metrics ====
    pub static ref AGGREGATOR_EVENTS_RECEIVED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "aggregator_events_received_total",
                "Total number of crossing events received",
            ),
            &["camera", "role"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_PENDING_ENTRIES: IntGauge = {
        let metric = IntGauge::new(
            "aggregator_pending_entries",
            "Number of entry events waiting for an exit match",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_RECORDS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "aggregator_records_total",
                "Total number of completed records",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_PENDING_EVICTIONS: IntCounter = {
        let metric = IntCounter::new(
            "aggregator_pending_evictions_total",
            "Total number of entries closed early because the pending table was full",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_UNMATCHED_SECONDARY: IntCounter = {
        let metric = IntCounter::new(
            "aggregator_unmatched_secondary_total",
            "Total number of secondary camera events without a pending entry",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_BUFFERED_RECORDS: IntGauge = {
        let metric = IntGauge::new(
            "aggregator_buffered_records",
            "Number of completed records waiting to be written",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_FLUSHES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "aggregator_flushes_total",
                "Total number of output flush attempts",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref AGGREGATOR_DAILY_COUNT: IntGauge = {
        let metric = IntGauge::new(
            "aggregator_daily_count",
            "Primary camera crossings counted today",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
