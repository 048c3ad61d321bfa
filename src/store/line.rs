//! Record file line codec.
//!
//! One line per task identity:
//!
//! ```text
//! <identity:40 hex>|<unix time:10 digits>|<status code:1-2 digits>|<base64(json outcome)|empty>
//! ```
//!
//! Parsing is strict; a line that violates any field constraint is dropped
//! by the store and the file is rewritten clean on the next persist.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::core::outcome::Outcome;
use crate::core::record::LastRecord;
use crate::core::types::{StatusCode, TaskIdentity};

/// Why a record line was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    /// Wrong number of `|`-separated fields.
    #[error("expected 4 fields, got {0}")]
    FieldCount(usize),

    /// Identity is not exactly 40 lowercase hex characters.
    #[error("invalid identity field")]
    BadIdentity,

    /// Timestamp is not exactly 10 decimal digits.
    #[error("invalid timestamp field")]
    BadTimestamp,

    /// Status code is not 1-2 decimal digits.
    #[error("invalid status code field")]
    BadStatus,

    /// Payload is neither empty nor base64 of a serialized outcome.
    #[error("invalid payload field")]
    BadPayload,
}

/// Serialize one record as a storage line.
pub(crate) fn encode_line(record: &LastRecord) -> String {
    let payload = record
        .message()
        .and_then(|outcome| serde_json::to_vec(outcome).ok())
        .map(|bytes| BASE64.encode(bytes))
        .unwrap_or_default();
    format!(
        "{}|{:010}|{}|{}",
        record.identity(),
        record.last_execution_time(),
        record.status_code().code(),
        payload
    )
}

/// Parse one storage line back into a record.
pub(crate) fn parse_line(line: &str) -> Result<LastRecord, LineError> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != 4 {
        return Err(LineError::FieldCount(fields.len()));
    }

    let identity = TaskIdentity::parse(fields[0]).ok_or(LineError::BadIdentity)?;

    let time_field = fields[1];
    if time_field.len() != 10 || !time_field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LineError::BadTimestamp);
    }
    let time: i64 = time_field.parse().map_err(|_| LineError::BadTimestamp)?;

    let code_field = fields[2];
    if code_field.is_empty()
        || code_field.len() > 2
        || !code_field.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(LineError::BadStatus);
    }
    let code: u8 = code_field.parse().map_err(|_| LineError::BadStatus)?;
    let status = StatusCode::from_code(code);

    let message: Option<Outcome> = if fields[3].is_empty() {
        None
    } else {
        let bytes = BASE64
            .decode(fields[3])
            .map_err(|_| LineError::BadPayload)?;
        Some(serde_json::from_slice(&bytes).map_err(|_| LineError::BadPayload)?)
    };

    Ok(LastRecord::new(identity, time, status, message))
}
