pub mod endpoint;
pub mod error;
pub mod response;

use crate::model;
use async_trait::async_trait;
pub use error::Error;
pub use response::DeviceList;
use serde::de::DeserializeOwned;
use serde_json::Value;

use std::collections::BTreeMap;
use std::time::Duration;

/// Anything that can produce the gateway's device list.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    async fn device_list(&self) -> Result<DeviceList, Error>;
}

#[async_trait]
impl DeviceSource for model::Gateway {
    async fn device_list(&self) -> Result<DeviceList, Error> {
        device_list(self).await
    }
}

pub fn gateway(host: &str, port: u16, timeout_secs: u64) -> Result<model::Gateway, Error> {
    let client = reqwest::ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .or(Err(Error::InternalError))?;

    Ok(model::Gateway {
        base_url: format!("http://{}:{}", host, port),
        client,
    })
}

/// Map transport failures and non-2xx responses to Error
fn map_api_err(error: reqwest::Error) -> Error {
    match error.status() {
        Some(http::StatusCode::NOT_FOUND) => Error::NotFound(error.to_string()),
        _ => Error::GatewayError(error.to_string()),
    }
}

async fn get<T: DeserializeOwned>(
    gateway: &model::Gateway,
    endpoint: &endpoint::Endpoint,
) -> Result<T, Error> {
    let url = format!("{}{}", gateway.base_url, endpoint);

    let response_text = gateway
        .client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(map_api_err)?
        .text()
        .await
        .map_err(|e| Error::GatewayError(format!("Error reading gateway response: {}", e)))?;

    log::trace!("endpoint: {}, response_text: {}", endpoint, response_text);

    serde_json::from_str::<T>(&response_text)
        .map_err(|e| Error::InvalidResponse(response_text, e.to_string()))
}

/// Fetch the current device list from the gateway.
pub async fn device_list(gateway: &model::Gateway) -> Result<DeviceList, Error> {
    let list: DeviceList = get(gateway, endpoint::DEVICE_LIST).await?;

    if !list.succeeded() {
        log::warn!(
            "gateway reported result {:?} for {} devices",
            list.result,
            list.devices.len()
        );
    }

    Ok(list)
}

/// Dump the raw device list keyed by serial, for diagnosing records the pipeline rejects.
pub async fn dump_devices(gateway: &model::Gateway) -> Result<BTreeMap<String, Value>, Error> {
    let list = device_list(gateway).await?;

    Ok(list
        .devices
        .into_iter()
        .enumerate()
        .map(|(index, device)| {
            let key = match device.get("SERIAL").and_then(Value::as_str) {
                Some(serial) => serial.to_string(),
                None => {
                    log::warn!("No SERIAL reported for device #{}", index);
                    format!("#{}", index)
                }
            };
            (key, device)
        })
        .collect())
}
