//! plumb: templated process pipelines for tokio.
//!
//! Describe a chain of external processes with a templated command syntax,
//! wire their standard streams together, optionally redirect the final
//! output into files, and await the whole thing as one unit:
//!
//! ```no_run
//! use plumb::{shell, template};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let greeting = "Hello World";
//!     let chain = shell(&template!("echo -n " {greeting}))?
//!         .pipe(&shell(&template!("rev"))?)?;
//!     chain.redirect("reversed.txt");
//!     let result = chain.end().await;
//!     assert!(result.ok());
//!     Ok(())
//! }
//! ```
//!
//! This crate provides:
//!
//! - **Pipeline**: a node wrapping one process or an assembled chain, with
//!   `pipe`, `redirect`, `append`, and awaitable `end`
//! - **Fan-out**: piping or redirecting the same node repeatedly gives each
//!   consumer an independent full copy of the output
//! - **Reports**: per-stage exit status and per-sink flush status, with
//!   spawn failures and broken pipes surfaced instead of swallowed
//!
//! The template syntax and tokenizer live in [`plumb_template`] and are
//! re-exported here.

pub mod error;
pub mod pipeline;
pub mod report;
mod sink;
mod stage;
mod tee;

pub use error::ChainError;
pub use pipeline::{Pipeline, shell};
pub use report::{ChainResult, SinkReport, SinkStatus, StageReport, StageStatus};
pub use sink::SinkTarget;
pub use tee::PIPE_CHUNK_SIZE;

pub use plumb_template::{ParseError, ParsedCommand, Template, TemplateBuilder, template};

/// Build the template and spawn it in one step: `shell!("echo -n " {x})`
/// is `shell(&template!("echo -n " {x}))`.
#[macro_export]
macro_rules! shell {
    ($($part:tt)+) => {
        $crate::shell(&$crate::template!($($part)+))
    };
}
