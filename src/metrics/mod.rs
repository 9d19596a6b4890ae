use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref ACTIVE_SOURCES: IntGauge =
        IntGauge::new("blocking_active_sources", "Sources currently registered by uri")
            .expect("metric can not be created");

    pub static ref POLL_CYCLES: IntCounterVec = IntCounterVec::new(
        Opts::new("blocking_poll_cycles", "Completed poll cycles per model"),
        &["model"]
    )
    .expect("metric can not be created");

    pub static ref FETCH_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("blocking_fetch_errors", "Failed poll cycles by error kind"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref CACHE_HITS: IntCounter =
        IntCounter::new("blocking_cache_hits", "Sources seeded from the cursor cache")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(ACTIVE_SOURCES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(POLL_CYCLES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(FETCH_ERRORS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("collector can be registered");
    });
}

/// Text exposition of every blocking query collector
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::new()
    })
}
