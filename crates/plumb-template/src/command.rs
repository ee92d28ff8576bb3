//! The tokenizer's output: a program name and its argument list.

use std::borrow::Cow;
use std::fmt;

use crate::tokenizer::is_word_break;

/// A fully tokenized command, ready to hand to a spawn primitive.
///
/// Argument order is preserved exactly as parsed. The `Display` impl
/// renders a canonical command line, re-quoting arguments that contain
/// whitespace or quotes, such that re-parsing the rendered line yields an
/// equal `ParsedCommand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The program to execute (name or path).
    pub program: String,
    /// Positional arguments, in order.
    pub args: Vec<String>,
}

impl fmt::Display for ParsedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", quoted(arg))?;
        }
        Ok(())
    }
}

/// Re-quote an argument for display. Bare words pass through; anything
/// with whitespace or quote characters (or the empty string) is wrapped in
/// whichever quote kind it does not itself contain. Arguments containing
/// both quote kinds cannot be represented in this grammar (it has no
/// escapes) and fall back to single quotes.
fn quoted(arg: &str) -> Cow<'_, str> {
    let needs_quoting =
        arg.is_empty() || arg.chars().any(|c| is_word_break(c) || c == '\'' || c == '"');
    if !needs_quoting {
        Cow::Borrowed(arg)
    } else if !arg.contains('"') {
        Cow::Owned(format!("\"{arg}\""))
    } else {
        Cow::Owned(format!("'{arg}'"))
    }
}
