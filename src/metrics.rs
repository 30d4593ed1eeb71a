//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "socialhub_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Database Metrics
    pub static ref DB_QUERY_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "socialhub_db_query_duration_seconds",
            "Database operation duration in seconds"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["operation"]
    ).expect("metric can be created");
    pub static ref DB_TRANSACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_db_transactions_total", "Total number of write transactions"),
        &["operation", "outcome"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_WRITE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_cache_write_failures_total", "Total number of failed cache writes"),
        &["cache_name"]
    ).expect("metric can be created");

    // Auth Metrics
    pub static ref AUTH_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_auth_rejections_total", "Total number of rejected requests by reason"),
        &["reason"]
    ).expect("metric can be created");
    pub static ref TOKENS_REVOKED_TOTAL: prometheus::IntCounter = prometheus::IntCounter::new(
        "socialhub_tokens_revoked_total",
        "Total number of tokens revoked by logout"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("socialhub_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(DB_QUERY_DURATION_SECONDS.clone()))
        .expect("DB_QUERY_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(DB_TRANSACTIONS_TOTAL.clone()))
        .expect("DB_TRANSACTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_WRITE_FAILURES_TOTAL.clone()))
        .expect("CACHE_WRITE_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(AUTH_REJECTIONS_TOTAL.clone()))
        .expect("AUTH_REJECTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TOKENS_REVOKED_TOTAL.clone()))
        .expect("TOKENS_REVOKED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
