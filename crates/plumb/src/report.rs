//! Completion reports for pipeline chains.
//!
//! `end` never panics and never loses a failure: every stage and every sink
//! settles into one of the statuses here, and the failure classes (a
//! process that never started, a process that exited non-zero, a sink that
//! failed to write) stay distinguishable for callers building
//! automation on top.

use std::io;
use std::process::ExitStatus;

/// Terminal state of one spawned process in a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// The OS refused to start the process (unknown executable, permission
    /// denied). Carries the `io::ErrorKind` so ENOENT-class failures are
    /// recognizable.
    SpawnFailed { kind: io::ErrorKind, message: String },
    /// The process reached a terminal state. Death by signal is a valid
    /// terminal state (`status.code()` is `None`), not a hang.
    Exited(ExitStatus),
    /// Waiting on the process failed in the OS layer.
    WaitFailed { message: String },
}

impl StageStatus {
    /// True only for a clean zero exit.
    pub fn success(&self) -> bool {
        matches!(self, StageStatus::Exited(status) if status.success())
    }
}

/// One stage's contribution to a chain report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Canonical command line, for diagnostics.
    pub command: String,
    pub status: StageStatus,
}

/// Terminal state of one attached sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    /// All bytes written, flush completed.
    Flushed,
    /// The destination could not be opened.
    OpenFailed { kind: io::ErrorKind, message: String },
    /// Writing or flushing failed after the sink was open.
    WriteFailed { kind: io::ErrorKind, message: String },
}

/// One sink's contribution to a chain report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// The destination path, or a label for handle/writer sinks.
    pub destination: String,
    pub status: SinkStatus,
}

/// The settled result of awaiting a chain.
///
/// `stages` are in chain order, head first. `sinks` are in attachment
/// order. `warnings` carry non-fatal conditions (broken pipes swallowed in
/// transit) that completed the chain anyway.
#[derive(Debug, Clone, Default)]
pub struct ChainResult {
    pub stages: Vec<StageReport>,
    pub sinks: Vec<SinkReport>,
    pub warnings: Vec<String>,
}

impl ChainResult {
    /// True when every stage exited zero and every sink flushed.
    /// Warnings do not affect this.
    pub fn ok(&self) -> bool {
        self.stages.iter().all(|s| s.status.success())
            && self.sinks.iter().all(|s| s.status == SinkStatus::Flushed)
    }
}
