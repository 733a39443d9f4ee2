use crate::catalog_store::CatalogCounts;
use crate::resilience::BreakerState;
use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

/// Metric name prefix for all listenlog metrics
const PREFIX: &str = "listenlog";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref POLLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_polls_total"), "Poller ticks by outcome"),
        &["source", "outcome"]
    ).expect("Failed to create polls_total metric");

    pub static ref EVENTS_RECORDED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_events_recorded_total"), "Listening events recorded"),
        &["source"]
    ).expect("Failed to create events_recorded_total metric");

    pub static ref DEDUP_SKIPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_dedup_skips_total"), "Detections suppressed as duplicates"),
        &["source", "reason"]
    ).expect("Failed to create dedup_skips_total metric");

    pub static ref ENRICHMENT_STEPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_enrichment_steps_total"), "Enrichment steps by outcome"),
        &["step", "status"]
    ).expect("Failed to create enrichment_steps_total metric");

    pub static ref PROVIDER_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_provider_calls_total"), "Provider calls by result"),
        &["service", "result"]
    ).expect("Failed to create provider_calls_total metric");

    pub static ref BREAKER_STATE: GaugeVec = GaugeVec::new(
        Opts::new(
            format!("{PREFIX}_circuit_breaker_state"),
            "Circuit breaker state (0 closed, 1 half-open, 2 open)"
        ),
        &["service"]
    ).expect("Failed to create circuit_breaker_state metric");

    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Items in the catalog"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");
}

pub fn init_metrics() {
    // Registration fails only on duplicates, which tests trigger on purpose
    let _ = REGISTRY.register(Box::new(POLLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EVENTS_RECORDED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DEDUP_SKIPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENRICHMENT_STEPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROVIDER_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BREAKER_STATE.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_poll(source: &str, outcome: &str) {
    POLLS_TOTAL.with_label_values(&[source, outcome]).inc();
}

pub fn record_event(source: &str) {
    EVENTS_RECORDED_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_dedup_skip(source: &str, reason: &str) {
    DEDUP_SKIPS_TOTAL.with_label_values(&[source, reason]).inc();
}

pub fn record_enrichment_step(step: &str, status: &str) {
    ENRICHMENT_STEPS_TOTAL.with_label_values(&[step, status]).inc();
}

pub fn record_provider_call(service: &str, result: &str) {
    PROVIDER_CALLS_TOTAL.with_label_values(&[service, result]).inc();
}

pub fn set_breaker_state(service: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    BREAKER_STATE.with_label_values(&[service]).set(value);
}

pub fn set_catalog_counts(counts: &CatalogCounts) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["artist"])
        .set(counts.artists as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["album"])
        .set(counts.albums as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["track"])
        .set(counts.tracks as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["event"])
        .set(counts.events as f64);
}

/// Text exposition of every registered metric.
pub fn encode() -> Result<String> {
    let mut buffer = vec![];
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
