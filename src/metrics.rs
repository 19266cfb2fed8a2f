//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Authentication Metrics
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("notekeep_login_attempts_total", "Total number of login attempts"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref TOKEN_VERIFICATION_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("notekeep_token_verification_failures_total", "Total number of rejected bearer or CSRF tokens"),
        &["purpose", "reason"]
    ).expect("metric can be created");
    pub static ref SESSIONS_REVOKED_TOTAL: IntCounter = IntCounter::new(
        "notekeep_sessions_revoked_total",
        "Total number of sessions revoked by logout"
    ).expect("metric can be created");

    // Request Gate Metrics
    pub static ref GATE_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("notekeep_gate_rejections_total", "Total number of requests rejected at the edge"),
        &["reason"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("notekeep_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(LOGIN_ATTEMPTS_TOTAL.clone()))
        .expect("LOGIN_ATTEMPTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TOKEN_VERIFICATION_FAILURES_TOTAL.clone()))
        .expect("TOKEN_VERIFICATION_FAILURES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SESSIONS_REVOKED_TOTAL.clone()))
        .expect("SESSIONS_REVOKED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(GATE_REJECTIONS_TOTAL.clone()))
        .expect("GATE_REJECTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
