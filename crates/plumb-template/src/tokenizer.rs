//! The template tokenizer state machine.
//!
//! Walks a template's segments character by character, feeding each
//! interpolated value into the machine at its slot between segments.
//! The state is the authority on how the next character or value is
//! consumed:
//!
//! ```text
//! Initial → CommandName → Args → {Token | SingleQuoted | DoubleQuoted | Value}*
//! ```
//!
//! In-progress text rides inside the state variant, so a token interrupted
//! by a value picks up exactly where it left off. End of input inside a
//! quote is fatal; end of input anywhere else finalizes the last argument.

use thiserror::Error;

use crate::command::ParsedCommand;
use crate::template::Template;

/// Fatal tokenizer errors. Parsing never partially succeeds: on any of
/// these, no command is produced and nothing is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The template was empty or whitespace-only, or a value was
    /// interpolated before any command name was collected.
    #[error("template has no command name")]
    MissingCommand,
    /// A single- or double-quoted string was never closed.
    #[error("unterminated quoted string")]
    UnterminatedString,
    /// A value was interpolated inside a quoted string; quoted strings are
    /// fully literal.
    #[error("interpolated value inside a quoted string")]
    InterpolationInQuote,
}

/// Argument separators: space, tab, newline, carriage return. Everything
/// else is word material.
pub(crate) fn is_word_break(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

enum State {
    /// Skipping whitespace before the command name.
    Initial,
    /// Accumulating the command name.
    CommandName(String),
    /// Between arguments.
    Args,
    /// Accumulating a bare token.
    Token(String),
    /// Accumulating an argument that began as an interpolated value.
    Value(String),
    /// Inside `'...'`.
    SingleQuoted(String),
    /// Inside `"..."`.
    DoubleQuoted(String),
}

/// Tokenize a template into a program name and ordered argument list.
pub fn parse(template: &Template) -> Result<ParsedCommand, ParseError> {
    let mut program: Option<String> = None;
    let mut args: Vec<String> = Vec::new();
    let mut state = State::Initial;

    for (i, segment) in template.segments().iter().enumerate() {
        for c in segment.chars() {
            state = consume_char(state, c, &mut program, &mut args);
        }
        if let Some(value) = template.values().get(i) {
            state = consume_value(state, value)?;
        }
    }

    finish(state, program, args)
}

fn consume_char(
    state: State,
    c: char,
    program: &mut Option<String>,
    args: &mut Vec<String>,
) -> State {
    match state {
        State::Initial => {
            if is_word_break(c) {
                State::Initial
            } else {
                State::CommandName(c.to_string())
            }
        }
        State::CommandName(mut name) => {
            if is_word_break(c) {
                *program = Some(name);
                State::Args
            } else {
                name.push(c);
                State::CommandName(name)
            }
        }
        State::Args => match c {
            c if is_word_break(c) => State::Args,
            '\'' => State::SingleQuoted(String::new()),
            '"' => State::DoubleQuoted(String::new()),
            c => State::Token(c.to_string()),
        },
        State::Token(mut token) => {
            if is_word_break(c) {
                args.push(token);
                State::Args
            } else {
                token.push(c);
                State::Token(token)
            }
        }
        State::Value(mut value) => {
            if is_word_break(c) {
                args.push(value);
                State::Args
            } else {
                value.push(c);
                State::Value(value)
            }
        }
        State::SingleQuoted(mut text) => {
            if c == '\'' {
                args.push(text);
                State::Args
            } else {
                text.push(c);
                State::SingleQuoted(text)
            }
        }
        State::DoubleQuoted(mut text) => {
            if c == '"' {
                args.push(text);
                State::Args
            } else {
                text.push(c);
                State::DoubleQuoted(text)
            }
        }
    }
}

fn consume_value(state: State, value: &str) -> Result<State, ParseError> {
    match state {
        // A value cannot supply (or extend) the command name.
        State::Initial | State::CommandName(_) => Err(ParseError::MissingCommand),
        State::Args => Ok(State::Value(value.to_string())),
        State::Token(mut token) => {
            token.push_str(value);
            Ok(State::Token(token))
        }
        State::Value(mut current) => {
            current.push_str(value);
            Ok(State::Value(current))
        }
        State::SingleQuoted(_) | State::DoubleQuoted(_) => Err(ParseError::InterpolationInQuote),
    }
}

fn finish(
    state: State,
    program: Option<String>,
    mut args: Vec<String>,
) -> Result<ParsedCommand, ParseError> {
    let program = match state {
        State::Initial => None,
        State::CommandName(name) => Some(name),
        State::Args => program,
        State::Token(token) => {
            args.push(token);
            program
        }
        State::Value(value) => {
            args.push(value);
            program
        }
        State::SingleQuoted(_) | State::DoubleQuoted(_) => {
            return Err(ParseError::UnterminatedString);
        }
    };

    match program {
        Some(program) => Ok(ParsedCommand { program, args }),
        None => Err(ParseError::MissingCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template;

    fn parse_str(input: &str) -> Result<ParsedCommand, ParseError> {
        Template::literal(input).parse()
    }

    #[test]
    fn splits_on_whitespace() {
        let cmd = parse_str("echo hello world").unwrap();
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["hello", "world"]);
    }

    #[test]
    fn skips_leading_and_trailing_whitespace() {
        let cmd = parse_str("  \t echo  hi \n").unwrap();
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["hi"]);
    }

    #[test]
    fn command_name_only() {
        let cmd = parse_str("ls").unwrap();
        assert_eq!(cmd.program, "ls");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn single_quotes_are_verbatim() {
        // The embedded double quote is just a character inside '...'.
        let cmd = parse_str(r#"echo -n 'hello4"'"#).unwrap();
        assert_eq!(cmd.args, vec!["-n", "hello4\""]);
    }

    #[test]
    fn double_quotes_group_whitespace() {
        let cmd = parse_str(r#"grep "two words" file"#).unwrap();
        assert_eq!(cmd.args, vec!["two words", "file"]);
    }

    #[test]
    fn empty_quoted_argument() {
        let cmd = parse_str(r#"printf """#).unwrap();
        assert_eq!(cmd.args, vec![""]);
    }

    #[test]
    fn value_becomes_one_argument() {
        let cmd = template!("echo -n " {"a string"}).parse().unwrap();
        assert_eq!(cmd.args, vec!["-n", "a string"]);
    }

    #[test]
    fn zero_value_is_not_dropped() {
        let cmd = template!("echo -n " {0}).parse().unwrap();
        assert_eq!(cmd.args, vec!["-n", "0"]);
    }

    #[test]
    fn empty_string_value_is_an_argument() {
        let cmd = template!("echo " {""} " tail").parse().unwrap();
        assert_eq!(cmd.args, vec!["", "tail"]);
    }

    #[test]
    fn value_with_metacharacters_stays_single() {
        // "abc ; " is one argument; the `;` never becomes an operator and
        // the internal whitespace never splits.
        let cmd = template!("echo -n " {"abc ; "} {4}).parse().unwrap();
        assert_eq!(cmd.args, vec!["-n", "abc ; ", "4"]);
    }

    #[test]
    fn value_concatenates_onto_token() {
        let name = "archive";
        let cmd = template!("tar --file=" {name} ".tgz").parse().unwrap();
        assert_eq!(cmd.args, vec!["--file=archive.tgz"]);
    }

    #[test]
    fn adjacent_values_concatenate() {
        let cmd = template!("echo " {"a"} {"b"}).parse().unwrap();
        assert_eq!(cmd.args, vec!["ab"]);
    }

    #[test]
    fn trailing_whitespace_after_value() {
        let cmd = template!("echo -n " {"a string"} "  ").parse().unwrap();
        assert_eq!(cmd.args, vec!["-n", "a string"]);
    }

    #[test]
    fn unterminated_single_quote_fails() {
        assert_eq!(parse_str("echo 'abc"), Err(ParseError::UnterminatedString));
    }

    #[test]
    fn unterminated_double_quote_fails() {
        assert_eq!(parse_str(r#"echo "abc"#), Err(ParseError::UnterminatedString));
    }

    #[test]
    fn empty_template_fails() {
        assert_eq!(parse_str(""), Err(ParseError::MissingCommand));
    }

    #[test]
    fn whitespace_only_template_fails() {
        assert_eq!(parse_str("  \t\n "), Err(ParseError::MissingCommand));
    }

    #[test]
    fn value_before_command_name_fails() {
        let t = template!(" " {"echo"} " hi");
        assert_eq!(t.parse(), Err(ParseError::MissingCommand));
    }

    #[test]
    fn value_during_command_name_fails() {
        let t = template!("ec" {"ho"});
        assert_eq!(t.parse(), Err(ParseError::MissingCommand));
    }

    #[test]
    fn value_inside_single_quote_fails() {
        let t = template!("echo 'a" {"b"} "c'");
        assert_eq!(t.parse(), Err(ParseError::InterpolationInQuote));
    }

    #[test]
    fn value_inside_double_quote_fails() {
        let t = template!("echo \"a" {"b"} "c\"");
        assert_eq!(t.parse(), Err(ParseError::InterpolationInQuote));
    }
}
