// Catalog Normalizer
//
// Shared coercion and ordering helpers used at every extraction point of the
// content sources. Upstream fields may be missing, null, strings where numbers
// are expected, or NaN after parsing; all of these collapse to `None`.

use serde_json::Value;
use std::cmp::Ordering;

/// Absolute URLs pass through; anything else is a path under `cdn_origin`.
/// Empty or missing values become `None`.
pub fn normalize_thumbnail(raw: Option<&str>, cdn_origin: &str) -> Option<String> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Some(raw.to_string());
    }

    let origin = cdn_origin.trim_end_matches('/');
    let path = raw.trim_start_matches('/');
    Some(format!("{}/{}", origin, path))
}

/// Number or numeric string to a finite f64
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn coerce_f32(value: &Value) -> Option<f32> {
    coerce_f64(value).map(|n| n as f32).filter(|n| n.is_finite())
}

/// Non-negative integer, truncating any fraction
pub fn coerce_u64(value: &Value) -> Option<u64> {
    coerce_f64(value).filter(|n| *n >= 0.0).map(|n| n as u64)
}

pub fn coerce_u32(value: &Value) -> Option<u32> {
    coerce_u64(value).and_then(|n| u32::try_from(n).ok())
}

/// Parse an episode/chapter label such as "12" or "12.5"
pub fn parse_number(label: &str) -> Option<f32> {
    label.trim().parse::<f32>().ok().filter(|n| n.is_finite())
}

/// Strings from a JSON array, skipping anything that isn't a non-empty string
pub fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// First non-empty candidate, trimmed
pub fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// At most `max_chars` characters of `s`, for log lines
pub fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

pub fn status_or_unknown(status: Option<&str>) -> String {
    first_non_empty(&[status]).unwrap_or("Unknown").to_string()
}

/// RFC 3339 (UTC) from an RFC 3339 string, epoch milliseconds, or a
/// `{year, month (0-indexed), date, hour, minute}` object
pub fn normalize_timestamp(value: &Value) -> Option<String> {
    use chrono::{NaiveDate, TimeZone, Utc};

    match value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc).to_rfc3339()),
        Value::Number(_) => {
            let millis = coerce_f64(value)? as i64;
            Utc.timestamp_millis_opt(millis).single().map(|dt| dt.to_rfc3339())
        }
        Value::Object(_) => {
            let year = coerce_f64(&value["year"])? as i32;
            let month = coerce_u32(&value["month"])? + 1;
            let date = coerce_u32(&value["date"])?;
            let hour = coerce_u32(&value["hour"]).unwrap_or(0);
            let minute = coerce_u32(&value["minute"]).unwrap_or(0);
            let naive = NaiveDate::from_ymd_opt(year, month, date)?.and_hms_opt(hour, minute, 0)?;
            Some(Utc.from_utc_datetime(&naive).to_rfc3339())
        }
        _ => None,
    }
}

/// Heuristic pagination: a full page means there may be more
pub fn has_next_page(returned: usize, page_size: usize) -> bool {
    page_size > 0 && returned >= page_size
}

/// Ascending by a float key; NaN-free keys are guaranteed by the coercions above
pub fn sort_ascending_by<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> f32,
{
    items.sort_by(|a, b| key(a).total_cmp(&key(b)));
}

/// Descending by rating, `None` treated as 0. Stable for equal ratings.
pub fn sort_by_rating_desc<T, F>(items: &mut [T], rating: F)
where
    F: Fn(&T) -> Option<f32>,
{
    items.sort_by(|a, b| {
        let ra = rating(a).unwrap_or(0.0);
        let rb = rating(b).unwrap_or(0.0);
        rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
    });
}

/// A composite episode/chapter id split into its parts
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeId {
    pub parent_id: String,
    pub number: String,
    /// Translation override carried as a third `::` segment
    pub translation: Option<String>,
}

/// Split `parentId::number[::translation]`, or the legacy `parentId-number`
pub fn split_composite_id(id: &str) -> Option<CompositeId> {
    if id.contains("::") {
        let mut parts = id.split("::");
        let parent_id = parts.next()?.trim();
        let number = parts.next()?.trim();
        let translation = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if parent_id.is_empty() || number.is_empty() {
            return None;
        }
        return Some(CompositeId {
            parent_id: parent_id.to_string(),
            number: number.to_string(),
            translation,
        });
    }

    let (parent_id, number) = id.rsplit_once('-')?;
    if parent_id.is_empty() || parse_number(number).is_none() {
        return None;
    }
    Some(CompositeId {
        parent_id: parent_id.to_string(),
        number: number.to_string(),
        translation: None,
    })
}

pub fn compose_id(parent_id: &str, number: &str) -> String {
    format!("{}::{}", parent_id, number)
}
