//! Errors raised while assembling a pipeline graph.
//!
//! Template errors are [`plumb_template::ParseError`] and happen before any
//! process exists. Runtime failures (spawn refusal, sink I/O, broken pipes)
//! are never errors at the call site; they surface asynchronously in the
//! chain's [`ChainResult`](crate::ChainResult).

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// The pipe target's standard input already has an upstream source.
    /// Standard input is a single-reader stream; a process can be the
    /// target of at most one `pipe`.
    #[error("process standard input is already connected to an upstream source")]
    InputAlreadyClaimed,
}
