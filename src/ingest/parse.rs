//! Payload parsing for UDP samples.
//!
//! A datagram carries `<metric>:<value>`. The payload is split on the first
//! separator only, so the value part is everything after it; surrounding ASCII
//! whitespace (typically a trailing newline from `echo | nc -u`) is ignored.

use thiserror::Error;

/// Separator between metric key and value.
const SEPARATOR: u8 = b':';

/// Errors that can occur during payload parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("missing ':' separator")]
    MissingSeparator,

    #[error("empty metric key")]
    EmptyKey,

    #[error("value {raw:?} is not an integer")]
    InvalidValue { raw: String },
}

/// Parse a raw datagram payload into a `(metric_key, value)` pair.
pub fn parse_sample(data: &[u8]) -> Result<(&str, i64), ParseError> {
    let text = std::str::from_utf8(data).map_err(|_| ParseError::NotUtf8)?;

    let Some(split_at) = text.bytes().position(|b| b == SEPARATOR) else {
        return Err(ParseError::MissingSeparator);
    };

    let key = text[..split_at].trim();
    if key.is_empty() {
        return Err(ParseError::EmptyKey);
    }

    let raw_value = text[split_at + 1..].trim();
    let value = raw_value
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidValue {
            raw: raw_value.to_string(),
        })?;

    Ok((key, value))
}
