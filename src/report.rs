use std::fmt;

use crate::error::{FailureKind, ItemError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub item: String,
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(item: impl Into<String>, err: &ItemError) -> Self {
        Self {
            item: item.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Per-run tally. Every failure is listed; nothing partial is reported as complete.
/// Call sites log each failure with their own context; this only aggregates.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub label: &'static str,
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            succeeded: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failure(&mut self, item: impl Into<String>, err: &ItemError) {
        self.failures.push(Failure::new(item, err));
    }

    pub fn record(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn log(&self) {
        tracing::info!(
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed(),
            "{} finished",
            self.label
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed",
            self.label,
            self.succeeded,
            self.failed()
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        writeln!(f)?;
        for failure in &self.failures {
            writeln!(
                f,
                "  failed [{}] {}: {}",
                failure.kind, failure.item, failure.message
            )?;
        }
        Ok(())
    }
}
