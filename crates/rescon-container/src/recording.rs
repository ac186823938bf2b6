// SPDX-FileCopyrightText: 2026 Rescon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use rescon_core::Operation;

/// Register all rescon metric descriptions.
///
/// Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(
        "rescon_dispatch_total",
        "GET/SET dispatches by operation and outcome"
    );
    describe_histogram!(
        "rescon_dispatch_latency_seconds",
        "Wall-clock time of a dispatch in seconds"
    );
    describe_counter!(
        "rescon_dispatch_abandoned_total",
        "Handler workers detached after the dispatch timeout"
    );
    describe_counter!(
        "rescon_bundle_transitions_total",
        "Bundle lifecycle transitions"
    );
    describe_gauge!("rescon_resources_registered", "Currently registered resources");
}

pub fn record_dispatch(op: Operation, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("rescon_dispatch_total", "op" => op.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("rescon_dispatch_latency_seconds", "op" => op.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_abandoned(op: Operation) {
    metrics::counter!("rescon_dispatch_abandoned_total", "op" => op.to_string()).increment(1);
}

pub fn record_transition(transition: &'static str) {
    metrics::counter!("rescon_bundle_transitions_total", "transition" => transition).increment(1);
}

pub fn set_resources_registered(count: usize) {
    metrics::gauge!("rescon_resources_registered").set(count as f64);
}
