// src/core/protocol/response.rs

//! Responses sent back to clients, one line each.

use std::fmt::{self, Write};

pub const WRITE_OK: &str = "WRITE_OK";
pub const WRITE_FAIL: &str = "WRITE_FAIL";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const READ_FAIL: &str = "READ_FAIL";
pub const INVALID: &str = "INVALID";

/// Separates the entries of a `GETCHANGED` response.
pub const CHANGE_SEPARATOR: char = ';';
/// Escapes a separator, `=` or itself inside a `GETCHANGED` id or value.
pub const CHANGE_ESCAPE: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The textual rendering of a value read from a point.
    Value(String),
    /// The point is not registered.
    NotFound,
    /// The data source failed to read the point.
    ReadFail,
    WriteOk,
    WriteFail,
    /// `id=value` pairs changed since the last poll.
    Changed(Vec<(String, String)>),
    /// The request was malformed or used an unknown verb.
    Invalid,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Value(v) => f.write_str(v),
            Response::NotFound => f.write_str(NOT_FOUND),
            Response::ReadFail => f.write_str(READ_FAIL),
            Response::WriteOk => f.write_str(WRITE_OK),
            Response::WriteFail => f.write_str(WRITE_FAIL),
            Response::Changed(changes) => {
                for (i, (id, value)) in changes.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{CHANGE_SEPARATOR}")?;
                    }
                    write_escaped(f, id)?;
                    f.write_char('=')?;
                    write_escaped(f, value)?;
                }
                Ok(())
            }
            Response::Invalid => f.write_str(INVALID),
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        if c == CHANGE_SEPARATOR || c == '=' || c == CHANGE_ESCAPE {
            f.write_char(CHANGE_ESCAPE)?;
        }
        f.write_char(c)?;
    }
    Ok(())
}
