use serde::Deserialize;
use serde_json::Value;

/* Result reported by a healthy gateway */
pub const SUCCEED: &str = "succeed";

/// Body of `dl_cgi?Command=DeviceList`. Device entries stay untyped here; their shape
/// depends on the device kind and is resolved per device by `crate::device`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceList {
    pub devices: Vec<Value>,
    pub result: Option<String>,
}

impl DeviceList {
    /// The gateway attaches `"result": "succeed"`; a missing result is not treated as failure.
    pub fn succeeded(&self) -> bool {
        self.result.as_deref().map_or(true, |r| r == SUCCEED)
    }
}
