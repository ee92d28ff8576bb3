//! Pipeline nodes: composition, redirection, and completion fan-in.
//!
//! A [`Pipeline`] is a handle to one process or a chain of piped
//! processes. Connecting operations are synchronous and non-blocking
//! (bytes move in background tasks), and [`Pipeline::end`] is the only
//! suspending call. A node stays valid after being piped from: piping the
//! same node again forks an independent downstream branch fed a duplicate
//! of the same output.

use std::future::{Future, IntoFuture};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::debug;

use plumb_template::{ParseError, ParsedCommand, Template};

use crate::error::ChainError;
use crate::report::{ChainResult, SinkReport, StageReport};
use crate::sink::SinkTarget;
use crate::stage::Stage;
use crate::tee::{SinkTicket, SinkWriter};

/// Tokenize a template, spawn its command, and wrap it as a single-stage
/// pipeline.
///
/// Parse errors are synchronous and fatal: nothing is spawned. A spawn
/// refusal is not: the node is returned and its completion reports
/// [`StageStatus::SpawnFailed`](crate::StageStatus::SpawnFailed).
///
/// Must be called from within a tokio runtime.
pub fn shell(template: &Template) -> Result<Pipeline, ParseError> {
    let command = template.parse()?;
    Ok(Pipeline::from_stage(Stage::spawn(command)))
}

/// A handle to one process or an assembled chain ending at a specific
/// process.
///
/// Completion scope: a node waits on every stage in its chain, on the
/// stage-to-stage wires of its own lineage, and on every sink attached to
/// its lineage up to the moment a combination was made. Branches forked
/// from a shared ancestor after that point are siblings and complete
/// independently.
pub struct Pipeline {
    /// Chain order, head first, tail last.
    stages: Vec<Arc<Stage>>,
    /// File/writer sinks whose flush gates this node's completion.
    sinks: Mutex<Vec<SinkTicket>>,
    /// Stage-to-stage wires; awaited (not reported) so completion never
    /// fires while an upstream pump is still delivering.
    wires: Mutex<Vec<SinkTicket>>,
}

impl Pipeline {
    fn from_stage(stage: Arc<Stage>) -> Self {
        Self {
            stages: vec![stage],
            sinks: Mutex::new(Vec::new()),
            wires: Mutex::new(Vec::new()),
        }
    }

    fn head(&self) -> &Arc<Stage> {
        // Chains are built from at least one stage and only ever extended.
        &self.stages[0]
    }

    fn tail(&self) -> &Arc<Stage> {
        &self.stages[self.stages.len() - 1]
    }

    /// The commands in this chain, head first.
    pub fn commands(&self) -> Vec<ParsedCommand> {
        self.stages.iter().map(|s| s.command().clone()).collect()
    }

    /// Connect this chain's tail output to `target`'s head input and
    /// return the combined chain.
    ///
    /// Neither operand is invalidated. Piping from `self` again creates an
    /// independent branch reading a duplicate of the same output; the
    /// upstream process is not re-spawned. Piping *into* the same target
    /// twice is refused: stdin has a single reader.
    pub fn pipe(&self, target: &Pipeline) -> Result<Pipeline, ChainError> {
        let head = target.head();
        let writer = match head.claim_stdin()? {
            Some(stdin) => SinkWriter::Ready(Box::new(stdin)),
            // Target never spawned; its copy of the stream is discarded.
            None => SinkWriter::Ready(Box::new(tokio::io::sink())),
        };
        let wire = self
            .tail()
            .output()
            .subscribe(writer, format!("{} stdin", head.command().program));
        debug!(
            source = %self.tail().command().program,
            target = %head.command().program,
            "connected pipe"
        );

        let mut stages = self.stages.clone();
        stages.extend(target.stages.iter().cloned());
        let mut sinks = snapshot(&self.sinks);
        sinks.extend(snapshot(&target.sinks));
        let mut wires = snapshot(&self.wires);
        wires.extend(snapshot(&target.wires));
        wires.push(wire);

        Ok(Pipeline {
            stages,
            sinks: Mutex::new(sinks),
            wires: Mutex::new(wires),
        })
    }

    /// Redirect the tail's output into a destination, truncating files.
    ///
    /// May be called repeatedly on the same node: each call attaches an
    /// independent sink receiving a full copy of the output, and each
    /// flush independently gates `end`.
    pub fn redirect(&self, target: impl Into<SinkTarget>) -> &Self {
        self.attach_sink(target.into(), false);
        self
    }

    /// As [`redirect`](Pipeline::redirect), but opens the path in append
    /// mode.
    pub fn append(&self, path: impl AsRef<Path>) -> &Self {
        self.attach_sink(SinkTarget::from(path.as_ref()), true);
        self
    }

    fn attach_sink(&self, target: SinkTarget, append: bool) {
        let (writer, destination) = target.into_writer(append);
        debug!(source = %self.tail().command().program, dest = %destination, append, "redirected");
        let ticket = self.tail().output().subscribe(writer, destination);
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ticket);
    }

    /// Wait until every process in the chain has reached a terminal state
    /// and every sink in this node's lineage has flushed, then report.
    ///
    /// Any number of callers may wait concurrently; all are notified.
    /// There is no implicit timeout: a process killed externally still
    /// settles through its exit path, but a process that never exits is
    /// waited on forever.
    pub async fn end(&self) -> ChainResult {
        // A head process that reads stdin gets EOF instead of a hang, and
        // an unconsumed tail is drained so it cannot block on a full pipe
        // buffer.
        for stage in &self.stages {
            stage.close_stdin_if_unclaimed();
        }
        self.tail().output().drain_if_unconsumed();

        let mut stages = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let status = stage.wait().await;
            stages.push(StageReport {
                command: stage.command().to_string(),
                status,
            });
        }
        for wire in snapshot(&self.wires) {
            wire.wait().await;
        }
        let mut sinks = Vec::new();
        for ticket in snapshot(&self.sinks) {
            let status = ticket.wait().await;
            sinks.push(SinkReport {
                destination: ticket.destination().to_string(),
                status,
            });
        }
        let warnings = self.stages.iter().flat_map(|s| s.warnings()).collect();

        ChainResult {
            stages,
            sinks,
            warnings,
        }
    }
}

/// `await`-ing a node is `end`.
impl IntoFuture for Pipeline {
    type Output = ChainResult;
    type IntoFuture = Pin<Box<dyn Future<Output = ChainResult> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.end().await })
    }
}

fn snapshot(tickets: &Mutex<Vec<SinkTicket>>) -> Vec<SinkTicket> {
    tickets.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
