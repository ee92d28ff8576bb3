//! plumb-template: the templated command-line tokenizer.
//!
//! A [`Template`] is a command description made of literal text segments
//! interleaved with interpolated values, the way a parameterized command
//! line is written. The tokenizer turns a template into a [`ParsedCommand`]
//! (program name plus ordered argument list) with shell-like quoting rules:
//!
//! - whitespace separates arguments
//! - `'...'` and `"..."` group verbatim, quotes stripped
//! - an interpolated value is one argument, never re-split on its own
//!   whitespace, and may concatenate onto an in-progress token
//!   (`--file=${name}` patterns)
//!
//! Parsing is pure and synchronous; all errors are fatal [`ParseError`]s.
//!
//! ```
//! use plumb_template::template;
//!
//! let cmd = template!("echo -n " {"a string"}).parse().unwrap();
//! assert_eq!(cmd.program, "echo");
//! assert_eq!(cmd.args, vec!["-n", "a string"]);
//! ```

pub mod command;
pub mod template;
pub mod tokenizer;

pub use command::ParsedCommand;
pub use template::{Template, TemplateBuilder};
pub use tokenizer::ParseError;
