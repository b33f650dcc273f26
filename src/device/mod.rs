//! Classification and normalization of gateway device records.
//!
//! A poll of the gateway yields a heterogeneous list of devices: the supervisor itself,
//! power meters and microinverters. Each record is classified into a [`DeviceCategory`]
//! and mapped into a [`NormalizedPoint`] independently of every other record.

pub mod batch;
pub mod classify;
pub mod transform;

pub use batch::{assemble, assemble_values, assemble_with, Batch, DeviceFailure};
pub use classify::{classify, classify_with, ClassifyMode};
pub use transform::{serial_short, transform};

use crate::model::{DeviceCategory, NormalizedPoint};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum DeviceError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("field {field} is not numeric: {raw:?}")]
    TypeCoercion { field: &'static str, raw: String },
    #[error("device type {device_type:?} cannot be classified")]
    UnclassifiableDevice { device_type: String },
    #[error("malformed device record: {0}")]
    MalformedRecord(String),
}

/// A single value as the gateway reports it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(f64),
}

impl RawValue {
    /// Numeric view of the value; text is parsed after trimming surrounding whitespace.
    /// NaN and infinities are not measurements and yield `None`.
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
            RawValue::Number(n) => *n,
        };
        Some(value).filter(|v| v.is_finite())
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Text(s) => f.write_str(s),
            RawValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// One device entry of the gateway's device list. Which keys are present depends on the
/// kind of device, so every lookup is fallible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDeviceRecord {
    values: HashMap<String, RawValue>,
}

impl RawDeviceRecord {
    /// Convert one decoded JSON device entry. `null` counts as absent; nested arrays and
    /// objects carry nothing the pipeline reads and are dropped.
    pub fn from_value(value: &Value) -> Result<Self, DeviceError> {
        let object = value.as_object().ok_or_else(|| {
            DeviceError::MalformedRecord(format!("expected an object, got {}", value))
        })?;

        let values = object
            .iter()
            .filter_map(|(key, value)| {
                let raw = match value {
                    Value::String(s) => RawValue::Text(s.to_owned()),
                    Value::Number(n) => RawValue::Number(n.as_f64()?),
                    Value::Bool(b) => RawValue::Text(b.to_string()),
                    Value::Null | Value::Array(_) | Value::Object(_) => return None,
                };
                Some((key.to_owned(), raw))
            })
            .collect();

        Ok(RawDeviceRecord { values })
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<RawValue>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.values.get(field)
    }

    pub fn require(&self, field: &'static str) -> Result<&RawValue, DeviceError> {
        self.get(field).ok_or(DeviceError::MissingField(field))
    }

    pub fn text(&self, field: &'static str) -> Result<String, DeviceError> {
        self.require(field).map(RawValue::to_string)
    }

    pub fn number(&self, field: &'static str) -> Result<f64, DeviceError> {
        let raw = self.require(field)?;
        raw.to_f64().ok_or_else(|| DeviceError::TypeCoercion {
            field,
            raw: raw.to_string(),
        })
    }

    pub fn serial(&self) -> Option<String> {
        self.get("SERIAL").map(RawValue::to_string)
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawDeviceRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = RawDeviceRecord::default();
        for (field, value) in iter {
            record.insert(field, value);
        }
        record
    }
}

/// Classify and transform one record.
pub fn normalize(
    mode: ClassifyMode,
    record: &RawDeviceRecord,
) -> Result<NormalizedPoint, DeviceError> {
    let category: DeviceCategory = classify_with(mode, record)?;
    transform(category, record)
}
