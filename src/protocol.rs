//! Wire codec for the newline-delimited console protocol.
//!
//! Grammar, one request and one response per line:
//!
//! ```text
//! request   = [ "base64:" ] call LF
//! call      = module SP function [ SP parameter ]
//! response  = [ ( "true" | "false" ) ":" payload ] LF
//! ```
//!
//! The parameter is everything after the function name, spaces included; it
//! is never split further. A request carrying the `base64:` marker gets the
//! *payload* of its response base64-encoded; the `true:`/`false:` prefix is
//! always clear text. Since responses are newline-framed, payloads that
//! contain line breaks (such as `help` output) only survive transport when
//! the request opts into base64.
//!
//! This module is pure text handling; sockets live in [`crate::server`] and
//! the module tree in [`crate::module`].

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Marker a client prepends to opt a request (and its response payload)
/// into base64 transport. Matched case-sensitively.
pub const BASE64_MARKER: &str = "base64:";

/// Separator between the completion prefix and the payload of a response.
pub const RESPONSE_SEPARATOR: char = ':';

/// A parsed call line, borrowing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call<'a> {
    /// Target module id, resolved against the tree root.
    pub module: &'a str,
    /// Function name, looked up on the resolved module only.
    pub function: &'a str,
    /// Raw parameter text, `None` when the line ends after the function.
    pub parameter: Option<&'a str>,
}

/// Split a logical call line into module, function, and parameter.
///
/// Splitting happens twice on the first space, so the parameter keeps its
/// internal spaces. A line without at least `module function` is an error.
pub fn split_call(line: &str) -> Result<Call<'_>> {
    let (module, rest) = line
        .split_once(' ')
        .context("malformed call: missing function name")?;
    let (function, parameter) = match rest.split_once(' ') {
        Some((function, parameter)) => (function, Some(parameter)),
        None => (rest, None),
    };
    Ok(Call { module, function, parameter })
}

/// Strip the transport layer from a raw request line, returning the logical
/// line and whether base64 transport was requested.
///
/// A request that carries the marker but not a valid base64 body is a
/// protocol violation, reported as an error rather than handled per-call;
/// the connection handler treats it as fatal to the connection.
pub fn decode_request(raw: &str) -> Result<(String, bool)> {
    match raw.strip_prefix(BASE64_MARKER) {
        Some(body) => {
            let bytes = STANDARD
                .decode(body)
                .context("invalid base64 request body")?;
            Ok((String::from_utf8_lossy(&bytes).into_owned(), true))
        }
        None => Ok((raw.to_owned(), false)),
    }
}

/// Render a response line (without the trailing newline) for a call that
/// produced a result. `encoded` mirrors the request's transport choice.
pub fn encode_response(finished: bool, payload: &str, encoded: bool) -> String {
    if encoded {
        format!("{finished}{RESPONSE_SEPARATOR}{}", STANDARD.encode(payload))
    } else {
        format!("{finished}{RESPONSE_SEPARATOR}{payload}")
    }
}
