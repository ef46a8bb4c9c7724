//! Input validation.
//!
//! Every external parameter passes through one of the checks below before it
//! reaches the store. String checks run against the trimmed value.

use serde_json::{Map, Value};

use crate::config::Limits;
use crate::error::{WatchlistError, WatchlistResult};

/// Bounds for numeric parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberRule {
    /// Accept 0 (negatives are still rejected)
    pub allow_zero: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberRule {
    pub fn positive() -> Self {
        Self::default()
    }
}

/// Accept a JSON number or a numeric string, as long as it is finite.
pub fn coerce_number(field: &str, value: &Value) -> WatchlistResult<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(WatchlistError::validation_field(
            field,
            format!("{} must be a valid number", field),
        )),
    }
}

pub fn check_string(field: &str, value: &Value, max_len: Option<usize>) -> WatchlistResult<String> {
    let s = value.as_str().ok_or_else(|| {
        WatchlistError::validation_field(field, format!("{} must be a string", field))
    })?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(WatchlistError::validation_field(
            field,
            format!("{} cannot be empty", field),
        ));
    }
    if let Some(max) = max_len {
        if trimmed.chars().count() > max {
            return Err(WatchlistError::validation_field(
                field,
                format!("{} must be at most {} characters", field, max),
            ));
        }
    }
    Ok(trimmed.to_string())
}

pub fn check_number(field: &str, value: &Value, rule: NumberRule) -> WatchlistResult<f64> {
    let n = coerce_number(field, value)?;
    if n < 0.0 || (n == 0.0 && !rule.allow_zero) {
        let bound = if rule.allow_zero { "non-negative" } else { "greater than 0" };
        return Err(WatchlistError::validation_field(
            field,
            format!("{} must be {}", field, bound),
        ));
    }
    if let Some(min) = rule.min {
        if n < min {
            return Err(WatchlistError::validation_field(
                field,
                format!("{} must be at least {}", field, min),
            ));
        }
    }
    if let Some(max) = rule.max {
        if n > max {
            return Err(WatchlistError::validation_field(
                field,
                format!("{} must be at most {}", field, max),
            ));
        }
    }
    Ok(n)
}

pub fn check_boolean(field: &str, value: &Value) -> WatchlistResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(WatchlistError::validation_field(
                field,
                format!("{} must be a boolean", field),
            )),
        },
        _ => Err(WatchlistError::validation_field(
            field,
            format!("{} must be a boolean", field),
        )),
    }
}

pub fn check_array<T, F>(
    field: &str,
    value: &Value,
    max_items: Option<usize>,
    mut element: F,
) -> WatchlistResult<Vec<T>>
where
    F: FnMut(&Value) -> WatchlistResult<T>,
{
    let items = value.as_array().ok_or_else(|| {
        WatchlistError::validation_field(field, format!("{} must be an array", field))
    })?;
    if let Some(max) = max_items {
        if items.len() > max {
            return Err(WatchlistError::validation_field(
                field,
                format!("{} cannot have more than {} items", field, max),
            ));
        }
    }
    items
        .iter()
        .enumerate()
        .map(|(i, v)| element(v).map_err(|e| e.with_prefix(&format!("{}[{}]", field, i))))
        .collect()
}

/// Typed view over a request's parameter object.
///
/// A JSON `null` is treated the same as an absent field, except by
/// [`Params::nullable_string`] where it means "clear".
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Params<'a> {
    pub fn new(value: &'a Value) -> WatchlistResult<Self> {
        match value {
            Value::Object(map) => Ok(Self { map: Some(map) }),
            Value::Null => Ok(Self { map: None }),
            _ => Err(WatchlistError::validation("Parameters must be an object")),
        }
    }

    fn raw(&self, field: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(field))
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.raw(field).filter(|v| !v.is_null())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.raw(field).is_some()
    }

    pub fn required_string(&self, field: &str, max_len: Option<usize>) -> WatchlistResult<String> {
        let value = self.get(field).ok_or_else(|| {
            WatchlistError::validation_field(field, format!("{} is required", field))
        })?;
        check_string(field, value, max_len)
    }

    pub fn optional_string(
        &self,
        field: &str,
        max_len: Option<usize>,
    ) -> WatchlistResult<Option<String>> {
        self.get(field)
            .map(|v| check_string(field, v, max_len))
            .transpose()
    }

    /// Any string, untrimmed and possibly empty. Only the type is checked.
    pub fn optional_text(&self, field: &str) -> WatchlistResult<Option<String>> {
        self.get(field)
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    WatchlistError::validation_field(field, format!("{} must be a string", field))
                })
            })
            .transpose()
    }

    /// Absent ⇒ `None`, `null` ⇒ `Some(None)`, a string ⇒ `Some(Some(_))`.
    pub fn nullable_string(
        &self,
        field: &str,
        max_len: Option<usize>,
    ) -> WatchlistResult<Option<Option<String>>> {
        match self.raw(field) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(v) => check_string(field, v, max_len).map(|s| Some(Some(s))),
        }
    }

    pub fn required_number(&self, field: &str, rule: NumberRule) -> WatchlistResult<f64> {
        let value = self.get(field).ok_or_else(|| {
            WatchlistError::validation_field(field, format!("{} is required", field))
        })?;
        check_number(field, value, rule)
    }

    pub fn optional_number(&self, field: &str, rule: NumberRule) -> WatchlistResult<Option<f64>> {
        self.get(field)
            .map(|v| check_number(field, v, rule))
            .transpose()
    }

    /// Absent ⇒ `None`, `null` ⇒ `Some(None)`, a number ⇒ `Some(Some(_))`.
    pub fn nullable_number(
        &self,
        field: &str,
        rule: NumberRule,
    ) -> WatchlistResult<Option<Option<f64>>> {
        match self.raw(field) {
            None => Ok(None),
            Some(Value::Null) => Ok(Some(None)),
            Some(v) => check_number(field, v, rule).map(|n| Some(Some(n))),
        }
    }

    /// Any finite number, floored. Range handling is left to the caller.
    pub fn optional_integer(&self, field: &str) -> WatchlistResult<Option<i64>> {
        self.get(field)
            .map(|v| coerce_number(field, v).map(|n| n.floor() as i64))
            .transpose()
    }

    pub fn optional_boolean(&self, field: &str) -> WatchlistResult<Option<bool>> {
        self.get(field).map(|v| check_boolean(field, v)).transpose()
    }

    pub fn optional_array<T, F>(
        &self,
        field: &str,
        max_items: Option<usize>,
        element: F,
    ) -> WatchlistResult<Option<Vec<T>>>
    where
        F: FnMut(&Value) -> WatchlistResult<T>,
    {
        self.get(field)
            .map(|v| check_array(field, v, max_items, element))
            .transpose()
    }
}

pub fn normalize_coin_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trim, lower-case and de-duplicate tags, keeping first occurrences.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// The `tags` parameter, bounded and normalized.
pub fn tags_param(params: &Params<'_>, field: &str, limits: &Limits) -> WatchlistResult<Option<Vec<String>>> {
    let tags = params.optional_array(field, Some(limits.max_tags), |v| {
        check_string("tag", v, Some(limits.max_tag_len))
    })?;
    Ok(tags.map(normalize_tags))
}

/// A `tags` filter for reads. Elements are checked like stored tags but the
/// list itself is not bounded by `max_tags`.
pub fn tag_filter_param(
    params: &Params<'_>,
    field: &str,
    limits: &Limits,
) -> WatchlistResult<Option<Vec<String>>> {
    let tags = params.optional_array(field, None, |v| {
        check_string("tag", v, Some(limits.max_tag_len))
    })?;
    Ok(tags.map(normalize_tags))
}
