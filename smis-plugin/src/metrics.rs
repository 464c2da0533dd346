//! Metrics for the SMI-S adapter
//!
//! Recorded through the `metrics` facade. The library installs no exporter;
//! the embedding process decides where the numbers go.

use std::time::Instant;

use metrics::{counter, histogram};

use crate::error::SmisError;

/// Metric names
pub mod names {
    /// Counter: Total adapter operations by operation and result
    pub const OPERATIONS_TOTAL: &str = "smis_operations_total";
    /// Histogram: Duration of adapter operations in seconds
    pub const OPERATION_DURATION_SECONDS: &str = "smis_operation_duration_seconds";
    /// Counter: Job status polls by resulting status
    pub const JOB_POLLS_TOTAL: &str = "smis_job_polls_total";
    /// Counter: Replica relationships detached before volume deletion
    pub const REPLICA_DETACH_TOTAL: &str = "smis_replica_detach_total";
}

/// Record an adapter operation with its result
pub fn record_operation(operation: &str, status: &str, duration_secs: f64) {
    counter!(names::OPERATIONS_TOTAL, "operation" => operation.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::OPERATION_DURATION_SECONDS, "operation" => operation.to_string())
        .record(duration_secs);
}

/// Record one poll of a provider job
pub fn record_job_poll(status: &str) {
    counter!(names::JOB_POLLS_TOTAL, "status" => status.to_string()).increment(1);
}

/// Record a replica detach issued before a delete
pub fn record_detach() {
    counter!(names::REPLICA_DETACH_TOTAL).increment(1);
}

/// Helper for timing operations
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn success(self) {
        record_operation(self.operation, "success", self.start.elapsed().as_secs_f64());
    }

    /// Complete the operation with the error's code as status
    pub fn failure(self, err: &SmisError) {
        record_operation(self.operation, err.code().as_str(), self.start.elapsed().as_secs_f64());
    }

    /// Record the outcome of `result` and hand it back.
    pub fn finish<T>(self, result: crate::error::Result<T>) -> crate::error::Result<T> {
        match &result {
            Ok(_) => self.success(),
            Err(e) => self.failure(e),
        }
        result
    }
}
