// src/core/protocol/request.rs

//! Parsing of client requests: `<VERB>|<field1>|<field2>...`.

use crate::core::GatewayError;
use std::str::FromStr;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Separates the fields of a request.
pub const DELIMITER: char = '|';

/// The verbs a client may send. Verbs are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum Verb {
    #[strum(serialize = "READ")]
    Read,
    #[strum(serialize = "WRITE")]
    Write,
    #[strum(serialize = "GETCHANGED")]
    GetChanged,
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `READ|<id>`
    Read { id: String },
    /// `WRITE|<id>|<value>`
    Write { id: String, value: String },
    /// `GETCHANGED`
    GetChanged,
}

impl Request {
    /// Parses one request line (without its terminator).
    ///
    /// Fields beyond the ones a verb needs are ignored. A verb with missing or
    /// empty fields is rejected, as is any unknown verb.
    pub fn parse(line: &str) -> Result<Self, GatewayError> {
        let tokens = tokenize(line);
        let Some(first) = tokens.first() else {
            return Err(GatewayError::Protocol("empty request".to_string()));
        };
        let verb = Verb::from_str(first)
            .map_err(|_| GatewayError::Protocol(format!("unknown verb '{first}'")))?;

        let field = |index: usize| -> Result<String, GatewayError> {
            match tokens.get(index) {
                Some(token) if !token.is_empty() => Ok((*token).to_string()),
                _ => Err(GatewayError::Protocol(format!(
                    "{verb} expects at least {index} field(s)"
                ))),
            }
        };

        match verb {
            Verb::Read => Ok(Request::Read { id: field(1)? }),
            Verb::Write => Ok(Request::Write {
                id: field(1)?,
                value: field(2)?,
            }),
            Verb::GetChanged => Ok(Request::GetChanged),
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            Request::Read { .. } => Verb::Read,
            Request::Write { .. } => Verb::Write,
            Request::GetChanged => Verb::GetChanged,
        }
    }
}

/// Splits a request on the delimiter. A trailing empty field is dropped, so
/// `READ|` yields just `READ`; inner empty fields are kept.
pub fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = line.split(DELIMITER).collect();
    if tokens.last().is_some_and(|t| t.is_empty()) {
        tokens.pop();
    }
    tokens
}
