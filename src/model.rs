use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Layout of the gateway's `DATATIME` / `CURTIME` stamps, always UTC.
pub const GATEWAY_TIME_FORMAT: &str = "%Y,%m,%d,%H,%M,%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceCategory {
    Supervisor,
    ProductionMeter,
    ConsumptionMeter,
    WorkingInverter,
    FaultedInverter,
}

impl DeviceCategory {
    pub fn measurement(self) -> Measurement {
        match self {
            DeviceCategory::Supervisor => Measurement::Supervisor,
            DeviceCategory::ProductionMeter => Measurement::Production,
            DeviceCategory::ConsumptionMeter => Measurement::Consumption,
            DeviceCategory::WorkingInverter | DeviceCategory::FaultedInverter => {
                Measurement::Inverters
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Measurement {
    Supervisor,
    Production,
    Consumption,
    Inverters,
}

impl Measurement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measurement::Supervisor => "Supervisor",
            Measurement::Production => "Production",
            Measurement::Consumption => "Consumption",
            Measurement::Inverters => "Inverters",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a point field: coerced measurements are floats, pass-through fields keep the
/// shape the gateway sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Float(_) => None,
        }
    }
}

/// One time-series point. Tags and fields live in separate maps, ordered by name so two
/// points built from the same record compare (and serialize) identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPoint {
    pub measurement: Measurement,
    pub tags: BTreeMap<&'static str, String>,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl NormalizedPoint {
    pub fn new(measurement: Measurement) -> Self {
        NormalizedPoint {
            measurement,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Device-reported time of the reading, taken from the `curtime` field.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let curtime = self.field("curtime")?.as_str()?;
        NaiveDateTime::parse_from_str(curtime.trim(), GATEWAY_TIME_FORMAT)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

/// Connection to the gateway's HTTP interface.
#[derive(Debug, Clone)]
pub struct Gateway {
    pub base_url: String,
    pub client: reqwest::Client,
}
