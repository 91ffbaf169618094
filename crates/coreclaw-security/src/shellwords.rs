// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shell-style command tokenization.
//!
//! Commands run without a shell interpreter, so the command string is split
//! into argv here: single quotes are literal, double quotes allow backslash
//! escapes, backslash escapes the next character outside single quotes.
//! Unterminated quotes are an error.

use coreclaw_core::CoreclawError;

/// Split a command line into argv tokens.
pub fn tokenize(command: &str) -> Result<Vec<String>, CoreclawError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut has_token = false;
    let mut chars = command.chars();

    #[derive(PartialEq)]
    enum State {
        Plain,
        Single,
        Double,
    }
    let mut state = State::Plain;

    while let Some(c) = chars.next() {
        match state {
            State::Plain => match c {
                '\'' => {
                    state = State::Single;
                    has_token = true;
                }
                '"' => {
                    state = State::Double;
                    has_token = true;
                }
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| {
                        CoreclawError::BadArgs(
                            "trailing backslash in command".to_string(),
                        )
                    })?;
                    current.push(escaped);
                    has_token = true;
                }
                c if c.is_whitespace() => {
                    if has_token {
                        tokens.push(std::mem::take(&mut current));
                        has_token = false;
                    }
                }
                other => {
                    current.push(other);
                    has_token = true;
                }
            },
            State::Single => match c {
                '\'' => state = State::Plain,
                other => current.push(other),
            },
            State::Double => match c {
                '"' => state = State::Plain,
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| {
                        CoreclawError::BadArgs(
                            "unterminated double quote in command".to_string(),
                        )
                    })?;
                    current.push(escaped);
                }
                other => current.push(other),
            },
        }
    }

    match state {
        State::Single => {
            return Err(CoreclawError::BadArgs(
                "unterminated single quote in command".to_string(),
            ));
        }
        State::Double => {
            return Err(CoreclawError::BadArgs(
                "unterminated double quote in command".to_string(),
            ));
        }
        State::Plain => {}
    }

    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}
