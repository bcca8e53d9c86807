use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::ApiError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Canonical page of list data, whatever pagination style the service used.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedResult<T> {
    pub data_source: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    /// First page and no items.
    pub empty: bool,
    /// No further page should be requested.
    pub no_more: bool,
    /// Cursor for the next page of cursor-based lists.
    pub next_marker: Option<String>,
    pub error: Option<ApiError>,
}

impl<T> PaginatedResult<T> {
    /// The "not loaded yet" shape.
    pub fn empty_default() -> Self {
        Self {
            data_source: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total: 0,
            empty: false,
            no_more: false,
            next_marker: None,
            error: None,
        }
    }

    pub fn failed(error: ApiError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty_default()
        }
    }
}

/// Converts a raw list payload into a [`PaginatedResult`].
///
/// Accepts the payload itself or an envelope with a non-null `data` field.
/// `no_more` is derived with increasing precedence from `total` vs
/// `page * page_size`, `no_more`, `noMore`, a `null` `next_marker`, and
/// finally an empty `list`. Extraction failures never panic: they come back
/// as the default shape with `error` set.
pub fn normalize<T: DeserializeOwned>(raw: Option<&Value>) -> PaginatedResult<T> {
    let raw = match raw {
        None | Some(Value::Null) => return PaginatedResult::empty_default(),
        Some(raw) => raw,
    };
    match extract(raw) {
        Ok(result) => result,
        Err(message) => PaginatedResult::failed(ApiError::MalformedPayload(message)),
    }
}

fn extract<T: DeserializeOwned>(raw: &Value) -> Result<PaginatedResult<T>, String> {
    let payload = match raw.get("data") {
        Some(data) if !data.is_null() => data,
        _ => raw,
    };
    let object = payload
        .as_object()
        .ok_or_else(|| format!("expected an object payload, got {}", value_kind(payload)))?;
    let list = object
        .get("list")
        .and_then(Value::as_array)
        .ok_or_else(|| "payload has no `list` array".to_string())?;

    let data_source = list
        .iter()
        .enumerate()
        .map(|(index, item)| {
            T::deserialize(item).map_err(|err| format!("list item {index}: {err}"))
        })
        .collect::<Result<Vec<T>, String>>()?;

    let page = number(object, "page");
    let page_size = number(object, "page_size");
    let total = number(object, "total");

    let mut no_more = false;
    if let (Some(total), Some(page_size), Some(page)) = (total, page_size, page) {
        no_more = total <= page_size.saturating_mul(page);
    }
    if let Some(flag) = object.get("no_more").and_then(Value::as_bool) {
        no_more = flag;
    }
    if let Some(flag) = object.get("noMore").and_then(Value::as_bool) {
        no_more = flag;
    }
    let next_marker = match object.get("next_marker") {
        Some(Value::Null) => {
            no_more = true;
            None
        }
        Some(Value::String(marker)) => Some(marker.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    };
    let empty = data_source.is_empty() && page == Some(1);
    if data_source.is_empty() {
        no_more = true;
    }

    Ok(PaginatedResult {
        data_source,
        page: page.map(saturate_u32).unwrap_or(1),
        page_size: page_size.map(saturate_u32).unwrap_or(DEFAULT_PAGE_SIZE),
        total: total.unwrap_or(0),
        empty,
        no_more,
        next_marker,
        error: None,
    })
}

fn number(object: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = object.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
