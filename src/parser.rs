//! Turns a raw input line into a [`CommandRequest`].
//!
//! The grammar is deliberately flat: whitespace-separated words, at most one
//! `>` followed by a file name, and an optional trailing `&`. There is no
//! quoting, escaping, or pipeline support.

use crate::command::CommandRequest;
use std::path::PathBuf;
use thiserror::Error;

/// Output redirection operator.
pub const REDIRECT_OP: &str = ">";
/// Background operator, recognised only as the last argument.
pub const BACKGROUND_OP: &str = "&";

/// Input errors. None of them is fatal to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Error: No output file specified after '>'")]
    MissingRedirectTarget,
    #[error("Error: no command to execute")]
    MissingCommand,
}

/// Result of parsing one line.
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    /// Blank line; nothing to do.
    Empty,
    /// A runnable request. `warning` carries a non-fatal problem that was
    /// recovered from, such as a `>` with no file name.
    Request {
        request: CommandRequest,
        warning: Option<ParseError>,
    },
    /// Nothing runnable remained after operators were stripped.
    Invalid(Vec<ParseError>),
}

/// Parse a single line of input.
///
/// Tokens are scanned left to right. The first `>` ends the argument list and
/// the token after it becomes the redirect target; anything further is
/// ignored. A trailing `&` on the remaining list marks the request as
/// background.
pub fn parse_line(line: &str) -> Parsed {
    let mut tokens = line.split_whitespace();
    let mut argv = Vec::new();
    let mut redirect = None;
    let mut warning = None;

    while let Some(token) = tokens.next() {
        if token == REDIRECT_OP {
            match tokens.next() {
                Some(target) => redirect = Some(PathBuf::from(target)),
                None => warning = Some(ParseError::MissingRedirectTarget),
            }
            break;
        }
        argv.push(token.to_string());
    }

    if argv.is_empty() && redirect.is_none() && warning.is_none() {
        return Parsed::Empty;
    }

    let background = argv.last().is_some_and(|last| last == BACKGROUND_OP);
    if background {
        argv.pop();
    }

    match CommandRequest::new(argv, redirect, background) {
        Some(request) => Parsed::Request { request, warning },
        None => {
            let mut errors: Vec<ParseError> = warning.into_iter().collect();
            errors.push(ParseError::MissingCommand);
            Parsed::Invalid(errors)
        }
    }
}
