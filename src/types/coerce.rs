//! Turning raw wire cells into [`NativeValue`]s.
//!
//! Every cell reaches the driver as text (or JSON that is rendered back to
//! text). Nulls are decided by the server, so a missing cell is always a
//! missing value regardless of the column's declared nullability.

use super::error::CoercionError;
use super::value::NativeValue;
use super::{BaseKind, TypeDescriptor};

use chrono::{DateTime, NaiveDate, NaiveDateTime};


const TRUE_TOKENS: [&str; 6] = ["true", "t", "1", "yes", "y", "on"];
const FALSE_TOKENS: [&str; 6] = ["false", "f", "0", "no", "n", "off"];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];


/// Coerce one raw cell according to its column type.
pub fn coerce(
    raw: Option<&str>,
    descriptor: &TypeDescriptor,
) -> Result<Option<NativeValue>, CoercionError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    if descriptor.is_array() {
        let items: Vec<serde_json::Value> = serde_json::from_str(raw.trim())
            .map_err(|_| CoercionError::InvalidArray(raw.to_string()))?;
        let element = descriptor.element();
        let values = items
            .iter()
            .map(|item| coerce(cell_text(item).as_deref(), &element))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Some(NativeValue::Array(values)));
    }

    let value = match descriptor.base_kind {
        BaseKind::String => NativeValue::String(raw.to_string()),
        BaseKind::Bytea => NativeValue::Bytes(parse_bytes(raw)),
        kind => NativeValue::String(raw.to_string()).cast(kind)?,
    };
    Ok(Some(value))
}

/// Render a JSON cell as the text the coercion layer expects.
pub(crate) fn cell_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Result<bool, CoercionError> {
    let token = raw.trim().to_ascii_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(CoercionError::InvalidBoolean(raw.to_string()))
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, CoercionError> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .or_else(|| parse_datetime(trimmed).ok().map(|dt| dt.date()))
        .ok_or_else(|| CoercionError::InvalidTemporal {
            raw: raw.to_string(),
            target: BaseKind::Date,
        })
}

/// Timestamps with an offset are normalised to UTC.
pub(crate) fn parse_datetime(raw: &str) -> Result<NaiveDateTime, CoercionError> {
    let trimmed = raw.trim();

    let with_offset = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok());
    if let Some(dt) = with_offset {
        return Ok(dt.naive_utc());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .ok_or_else(|| CoercionError::InvalidTemporal {
            raw: raw.to_string(),
            target: BaseKind::DateTime,
        })
}

/// `\x`-prefixed hex is decoded; anything else is taken as UTF-8 text.
pub(crate) fn parse_bytes(raw: &str) -> Vec<u8> {
    raw.strip_prefix("\\x")
        .and_then(|digits| hex::decode(digits).ok())
        .unwrap_or_else(|| raw.as_bytes().to_vec())
}
