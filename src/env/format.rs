// src/env/format.rs

//! The flat `key=value` text format shared by bulk import and persistence.
//!
//! - One entry per line, split on the first `=`.
//! - Blank lines and lines whose first non-blank character is `#` are ignored.
//! - No quoting or escaping; values are taken verbatim after the `=`.

use std::fmt;

/// Why a line of an import was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    MissingSeparator,
    EmptyKey,
    InvalidKey(&'static str),
    InvalidValue(&'static str),
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedReason::MissingSeparator => f.write_str("missing '=' separator"),
            MalformedReason::EmptyKey => f.write_str("empty key"),
            MalformedReason::InvalidKey(why) => write!(f, "invalid key: {why}"),
            MalformedReason::InvalidValue(why) => write!(f, "invalid value: {why}"),
        }
    }
}

/// Classification of one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    Blank,
    Comment,
    Entry { key: &'a str, value: &'a str },
    Malformed(MalformedReason),
}

pub fn parse_line(raw: &str) -> ParsedLine<'_> {
    let line = raw.strip_suffix('\r').unwrap_or(raw);

    if line.trim().is_empty() {
        return ParsedLine::Blank;
    }
    if line.trim_start().starts_with('#') {
        return ParsedLine::Comment;
    }

    let Some((key, value)) = line.split_once('=') else {
        return ParsedLine::Malformed(MalformedReason::MissingSeparator);
    };

    let key = key.trim();
    if key.is_empty() {
        return ParsedLine::Malformed(MalformedReason::EmptyKey);
    }
    if let Err(why) = validate_key(key) {
        return ParsedLine::Malformed(MalformedReason::InvalidKey(why));
    }
    if let Err(why) = validate_value(value) {
        return ParsedLine::Malformed(MalformedReason::InvalidValue(why));
    }

    ParsedLine::Entry { key, value }
}

/// Keys must survive a persist/import round-trip and be usable as
/// environment variable names.
pub fn validate_key(key: &str) -> Result<(), &'static str> {
    if key.is_empty() {
        return Err("must not be empty");
    }
    if key.contains('=') {
        return Err("must not contain '='");
    }
    if key.chars().any(char::is_whitespace) {
        return Err("must not contain whitespace");
    }
    if key.contains('\0') {
        return Err("must not contain NUL");
    }
    if key.starts_with('#') {
        return Err("must not start with '#'");
    }
    Ok(())
}

pub fn validate_value(value: &str) -> Result<(), &'static str> {
    if value.contains('\n') || value.contains('\r') {
        return Err("must not contain line breaks");
    }
    if value.contains('\0') {
        return Err("must not contain NUL");
    }
    Ok(())
}

/// Render entries as `key=value` lines, each terminated by `\n`.
pub fn render<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}
