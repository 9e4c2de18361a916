//! ProgressLoggerFactory の実装
//!
//! - **TracingProgressLoggerFactory**: operation の状態遷移を tracing に流す
//! - **RecordingProgressLoggerFactory**: `"{category}:{description} {phase} {status}"` の形で記録する

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::ports::{ProgressLogger, ProgressLoggerFactory};

#[derive(Default)]
pub struct TracingProgressLoggerFactory;

impl TracingProgressLoggerFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressLoggerFactory for TracingProgressLoggerFactory {
    fn new_operation(&self, category: &str, description: &str) -> Box<dyn ProgressLogger> {
        Box::new(TracingProgressLogger {
            category: category.to_string(),
            description: description.to_string(),
        })
    }
}

struct TracingProgressLogger {
    category: String,
    description: String,
}

impl ProgressLogger for TracingProgressLogger {
    fn started(&self, status: &str) {
        info!(category = %self.category, operation = %self.description, %status, "operation started");
    }

    fn progress(&self, status: &str) {
        info!(category = %self.category, operation = %self.description, %status, "operation progress");
    }

    fn completed(&self, status: &str) {
        info!(category = %self.category, operation = %self.description, %status, "operation completed");
    }
}

#[derive(Default)]
pub struct RecordingProgressLoggerFactory {
    records: Arc<Mutex<Vec<String>>>,
}

impl RecordingProgressLoggerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressLoggerFactory for RecordingProgressLoggerFactory {
    fn new_operation(&self, category: &str, description: &str) -> Box<dyn ProgressLogger> {
        Box::new(RecordingProgressLogger {
            operation: format!("{category}:{description}"),
            records: Arc::clone(&self.records),
        })
    }
}

struct RecordingProgressLogger {
    operation: String,
    records: Arc<Mutex<Vec<String>>>,
}

impl RecordingProgressLogger {
    fn record(&self, phase: &str, status: &str) {
        let line = format!("{} {phase} {status}", self.operation);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.trim_end().to_string());
    }
}

impl ProgressLogger for RecordingProgressLogger {
    fn started(&self, status: &str) {
        self.record("started", status);
    }

    fn progress(&self, status: &str) {
        self.record("progress", status);
    }

    fn completed(&self, status: &str) {
        self.record("completed", status);
    }
}
