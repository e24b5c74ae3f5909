//! Request-line framing and tokenizing.
//!
//! A command is one line terminated by `\n` (a preceding `\r` is stripped).
//! Tokens split on ASCII space/tab; empty lines are ignored; command names
//! are matched case-insensitively by the caller.

/// A tokenized request: the command name and its arguments, both borrowed
/// from the original line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
}

/// Splits `line` (with any trailing `\r` already stripped by the caller's
/// framing) into a [`Request`]. Returns `None` for a blank line.
pub fn parse_line(line: &str) -> Option<Request<'_>> {
    let mut tokens = line.split(|c: char| c == ' ' || c == '\t').filter(|s| !s.is_empty());
    let name = tokens.next()?;
    Some(Request {
        name,
        args: tokens.collect(),
    })
}

/// Strips a trailing `\r` from a line obtained by splitting on `\n`.
pub fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}
