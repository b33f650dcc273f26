//! Polls a SunPower PVS gateway's device list and turns it into time-series points.

pub mod api;
pub mod device;
pub mod model;
pub mod monitor;
pub mod report;
pub mod writer;

pub use api::Error;
