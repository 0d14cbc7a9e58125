/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Metrics for the outbox, consistency waits and the consumer.
//!
//! Recording goes through the `metrics` facade; installing a recorder is left
//! to the binary. Without one every call is a no-op.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::Once;

// ============================================================================
// Metric Names
// ============================================================================

/// Outbox rows committed, by aggregate type.
pub const OUTBOX_EVENTS_WRITTEN: &str = "inventory_outbox_events_written_total";

/// Retryable conflicts hit by serializable transactions, by label.
pub const SERIALIZATION_FAILURES: &str = "inventory_serialization_failures_total";

/// Serializable transactions that gave up after their last attempt, by label.
pub const SERIALIZATION_EXHAUSTIONS: &str = "inventory_serialization_exhaustions_total";

/// Read-after-write waits, by outcome.
pub const CONSISTENCY_WAITS: &str = "inventory_consistency_waits_total";

/// Consumer messages fully processed, by operation.
pub const CONSUMER_MESSAGES_PROCESSED: &str = "inventory_consumer_messages_processed_total";

/// Consumer failures, by kind.
pub const CONSUMER_ERRORS: &str = "inventory_consumer_errors_total";

/// Offsets committed by the consumer.
pub const CONSUMER_OFFSETS_COMMITTED: &str = "inventory_consumer_offsets_committed_total";

/// Messages waiting in the broker client's queues.
pub const CONSUMER_QUEUE_MESSAGES: &str = "inventory_consumer_queue_messages";

/// Consumer lag summed over assigned partitions.
pub const CONSUMER_LAG: &str = "inventory_consumer_lag";

/// Outcome label values for [`CONSISTENCY_WAITS`].
pub mod wait_outcome {
    pub const NOTIFIED: &str = "notified";
    pub const TIMEOUT: &str = "timeout";
    pub const BREAKER_OPEN: &str = "breaker_open";
    pub const SKIPPED: &str = "skipped";
}

static REGISTER: Once = Once::new();

/// Registers metric descriptions with the installed recorder.
///
/// Safe to call multiple times; only the first call has an effect.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        describe_counter!(OUTBOX_EVENTS_WRITTEN, "Outbox events committed");
        describe_counter!(
            SERIALIZATION_FAILURES,
            "Serialization failures and deadlocks seen by serializable transactions"
        );
        describe_counter!(
            SERIALIZATION_EXHAUSTIONS,
            "Serializable transactions that exhausted their retries"
        );
        describe_counter!(CONSISTENCY_WAITS, "Read-after-write waits by outcome");
        describe_counter!(
            CONSUMER_MESSAGES_PROCESSED,
            "Outbox messages processed by the consumer"
        );
        describe_counter!(CONSUMER_ERRORS, "Consumer errors by kind");
        describe_counter!(CONSUMER_OFFSETS_COMMITTED, "Offsets committed by the consumer");
        describe_gauge!(CONSUMER_QUEUE_MESSAGES, "Messages in the broker client queues");
        describe_gauge!(CONSUMER_LAG, "Consumer lag across assigned partitions");

        tracing::debug!("Registered resource inventory metric descriptions");
    });
}

// ============================================================================
// Metric Recording
// ============================================================================

pub fn record_outbox_write(aggregate_type: &str) {
    counter!(OUTBOX_EVENTS_WRITTEN, "aggregate_type" => aggregate_type.to_string()).increment(1);
}

pub fn record_serialization_failure(label: &str) {
    counter!(SERIALIZATION_FAILURES, "label" => label.to_string()).increment(1);
}

pub fn record_serialization_exhaustion(label: &str) {
    counter!(SERIALIZATION_EXHAUSTIONS, "label" => label.to_string()).increment(1);
}

pub fn record_consistency_wait(outcome: &'static str) {
    counter!(CONSISTENCY_WAITS, "outcome" => outcome).increment(1);
}

pub fn record_message_processed(operation: &str) {
    counter!(CONSUMER_MESSAGES_PROCESSED, "operation" => operation.to_string()).increment(1);
}

pub fn record_consumer_error(kind: &'static str) {
    counter!(CONSUMER_ERRORS, "kind" => kind).increment(1);
}

pub fn record_offsets_committed(count: usize) {
    counter!(CONSUMER_OFFSETS_COMMITTED).increment(count as u64);
}

/// Updates the gauges derived from broker client statistics.
pub fn set_consumer_statistics(queued_messages: i64, lag: i64) {
    gauge!(CONSUMER_QUEUE_MESSAGES).set(queued_messages as f64);
    gauge!(CONSUMER_LAG).set(lag as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        register_metrics();
        record_outbox_write("kessel.tuples");
        record_serialization_failure("report_resource");
        record_consistency_wait(wait_outcome::TIMEOUT);
        set_consumer_statistics(3, 10);
    }
}
