use super::MalformedRecordError;
use crate::records::{Edited, RecordType};
use serde_json::{Map, Value};

/// Strips source-specific type tags from an identifier
///
/// Handles both compound `type:id` encodings and fullname prefixes such
/// as `t3_abc123`.
pub fn strip_namespace(raw: &str) -> &str {
    if let Some((_, bare)) = raw.rsplit_once(':') {
        return bare;
    }

    match raw.split_once('_') {
        Some((tag, bare)) if is_type_tag(tag) && !bare.is_empty() => bare,
        _ => raw,
    }
}

fn is_type_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next() == Some('t') && {
        let rest = chars.as_str();
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
    }
}

/// Typed accessors over one upstream object
///
/// Every accessor names the field it failed on so a dropped record can be
/// traced back to the offending payload.
pub(super) struct Fields<'a> {
    record_type: RecordType,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    /// Wraps a payload, unwrapping a `{kind, data}` envelope when present
    pub fn new(record_type: RecordType, raw: &'a Value) -> Result<Self, MalformedRecordError> {
        let object = match raw.get("data") {
            Some(data) if raw.get("kind").is_some() => data,
            _ => raw,
        };

        let map = object.as_object().ok_or_else(|| MalformedRecordError {
            record_type,
            field: "<payload>".to_string(),
            reason: "expected a JSON object".to_string(),
        })?;

        Ok(Self { record_type, map })
    }

    pub fn error(&self, field: &str, reason: impl Into<String>) -> MalformedRecordError {
        MalformedRecordError {
            record_type: self.record_type,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn required(&self, key: &str) -> Result<&'a Value, MalformedRecordError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Err(self.error(key, "missing")),
            Some(value) => Ok(value),
        }
    }

    pub fn raw(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    pub fn str(&self, key: &str) -> Result<String, MalformedRecordError> {
        self.required(key)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.error(key, "expected a string"))
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<String>, MalformedRecordError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.error(key, "expected a string or null")),
        }
    }

    /// Bare identifier read from `key`
    pub fn id(&self, key: &str) -> Result<String, MalformedRecordError> {
        let raw = self.str(key)?;
        let bare = strip_namespace(&raw);
        if bare.is_empty() {
            return Err(self.error(key, "empty identifier"));
        }
        Ok(bare.to_string())
    }

    /// Integer field; fractional values are truncated toward zero
    pub fn int(&self, key: &str) -> Result<i64, MalformedRecordError> {
        let value = self.required(key)?;
        if let Some(i) = value.as_i64() {
            return Ok(i);
        }
        value
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
            .ok_or_else(|| self.error(key, "expected a number"))
    }

    pub fn float(&self, key: &str) -> Result<f64, MalformedRecordError> {
        self.required(key)?
            .as_f64()
            .ok_or_else(|| self.error(key, "expected a number"))
    }

    pub fn boolean(&self, key: &str) -> Result<bool, MalformedRecordError> {
        self.required(key)?
            .as_bool()
            .ok_or_else(|| self.error(key, "expected a boolean"))
    }

    /// Boolean that upstream omits on some objects; absent or null reads as false
    pub fn flag(&self, key: &str) -> Result<bool, MalformedRecordError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.error(key, "expected a boolean")),
        }
    }

    /// Unix timestamp in seconds, truncated from floating-point seconds
    pub fn timestamp(&self, key: &str) -> Result<i64, MalformedRecordError> {
        self.int(key)
    }

    pub fn edited(&self, key: &str) -> Result<Edited, MalformedRecordError> {
        match self.map.get(key) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(Edited::Never),
            Some(value) => value
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| Edited::At(f.trunc() as i64))
                .ok_or_else(|| self.error(key, "expected false or a timestamp")),
        }
    }

    /// Ordered list of strings
    pub fn str_list(&self, key: &str) -> Result<Vec<String>, MalformedRecordError> {
        let items = self
            .required(key)?
            .as_array()
            .ok_or_else(|| self.error(key, "expected an array"))?;

        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.error(key, "expected an array of strings"))
            })
            .collect()
    }
}
