use opentelemetry::metrics::{Counter, Histogram, UpDownCounter};
use opentelemetry::{global, KeyValue};
use std::sync::OnceLock;
use std::time::Instant;

/// OpenTelemetry metrics for server observability.
///
/// Tracks connections, commands, notifications, and replication.
/// Singleton instance accessed via `Metrics::get()`.
pub struct Metrics {
    // Connection metrics
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,

    // Command metrics
    pub commands_total: Counter<u64>,
    pub command_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,

    // Notification metrics
    pub notifications_total: Counter<u64>,

    // Replication metrics
    pub changes_enqueued_total: Counter<u64>,
    pub replica_writes_total: Counter<u64>,
    pub replicas_evicted_total: Counter<u64>,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    pub fn init() -> &'static Self {
        METRICS.get_or_init(|| {
            let meter = global::meter("courier-kv");

            Metrics {
                connections_total: meter
                    .u64_counter("courier_connections_total")
                    .with_description("Total number of client connections")
                    .init(),

                connections_active: meter
                    .i64_up_down_counter("courier_connections_active")
                    .with_description("Number of open client connections")
                    .init(),

                commands_total: meter
                    .u64_counter("courier_commands_total")
                    .with_description("Total number of commands executed")
                    .init(),

                command_duration: meter
                    .f64_histogram("courier_command_duration_seconds")
                    .with_description("Command execution duration in seconds")
                    .init(),

                errors_total: meter
                    .u64_counter("courier_errors_total")
                    .with_description("Total number of protocol and connection errors")
                    .init(),

                notifications_total: meter
                    .u64_counter("courier_notifications_total")
                    .with_description("Key update pushes sent to subscribers")
                    .init(),

                changes_enqueued_total: meter
                    .u64_counter("courier_changes_enqueued_total")
                    .with_description("Change records queued for replication")
                    .init(),

                replica_writes_total: meter
                    .u64_counter("courier_replica_writes_total")
                    .with_description("Change records written to replicas")
                    .init(),

                replicas_evicted_total: meter
                    .u64_counter("courier_replicas_evicted_total")
                    .with_description("Replicas dropped by the eviction policy")
                    .init(),
            }
        })
    }

    pub fn get() -> &'static Self {
        METRICS.get().unwrap_or_else(|| {
            // For tests, initialize with defaults if not already initialized
            Self::init()
        })
    }

    pub fn record_command(&self, command: &str, duration: f64) {
        let labels = &[KeyValue::new("command", command.to_string())];
        self.commands_total.add(1, labels);
        self.command_duration.record(duration, labels);
    }

    pub fn record_error(&self, error_type: &str, command: Option<&str>) {
        let mut labels = vec![KeyValue::new("error_type", error_type.to_string())];
        if let Some(cmd) = command {
            labels.push(KeyValue::new("command", cmd.to_string()));
        }
        self.errors_total.add(1, &labels);
    }

    pub fn increment_connections(&self) {
        self.connections_total.add(1, &[]);
        self.connections_active.add(1, &[]);
    }

    pub fn decrement_connections(&self) {
        self.connections_active.add(-1, &[]);
    }

    pub fn record_notification(&self, delivered: bool) {
        self.notifications_total
            .add(1, &[KeyValue::new("outcome", outcome(delivered))]);
    }

    pub fn record_change_enqueued(&self) {
        self.changes_enqueued_total.add(1, &[]);
    }

    pub fn record_replica_write(&self, delivered: bool) {
        self.replica_writes_total
            .add(1, &[KeyValue::new("outcome", outcome(delivered))]);
    }

    pub fn record_replica_evicted(&self) {
        self.replicas_evicted_total.add(1, &[]);
    }
}

fn outcome(delivered: bool) -> &'static str {
    if delivered {
        "delivered"
    } else {
        "failed"
    }
}

// Timer utility for measuring durations
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
