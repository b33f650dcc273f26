use prometheus::{Encoder, GaugeVec, IntCounter, IntGauge, TextEncoder};
use sunpower_rs::device::Batch;
use sunpower_rs::monitor::CycleOutcome;

lazy_static! {
    static ref FIELD_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "sunpower_field",
            "last value of a numeric field reported by a gateway device",
        ),
        &["measurement", "serial", "field"],
    )
    .unwrap();
    static ref POLLS_COUNTER: IntCounter =
        register_int_counter!("sunpower_polls_total", "poll cycles run").unwrap();
    static ref POLL_FAILURES_COUNTER: IntCounter = register_int_counter!(
        "sunpower_poll_failures_total",
        "poll cycles where the gateway could not be read"
    )
    .unwrap();
    static ref WRITE_FAILURES_COUNTER: IntCounter = register_int_counter!(
        "sunpower_write_failures_total",
        "poll cycles whose batch could not be written to the database"
    )
    .unwrap();
    static ref DEVICE_ERRORS_GAUGE: IntGauge = register_int_gauge!(
        "sunpower_device_errors",
        "devices skipped in the last assembled batch"
    )
    .unwrap();
}

/// Replace the field gauge with every float field of `batch`; devices that dropped out of
/// the list do not keep their last value.
fn process_batch(batch: &Batch) {
    FIELD_GAUGE.reset();
    for point in &batch.points {
        let serial = point.tag("serial").unwrap_or_default();
        for (field, value) in &point.fields {
            if let Some(value) = value.as_f64() {
                FIELD_GAUGE
                    .with_label_values(&[point.measurement.as_str(), serial, *field])
                    .set(value);
            }
        }
    }
    DEVICE_ERRORS_GAUGE.set(batch.errors.len() as i64);
}

/// Update the exporter registry from the outcome of one poll cycle.
pub fn record(outcome: &CycleOutcome) {
    POLLS_COUNTER.inc();
    match outcome {
        CycleOutcome::Written(batch) => process_batch(batch),
        CycleOutcome::GatewayFailed(_) => POLL_FAILURES_COUNTER.inc(),
        CycleOutcome::WriteFailed(batch, _) => {
            WRITE_FAILURES_COUNTER.inc();
            DEVICE_ERRORS_GAUGE.set(batch.errors.len() as i64);
        }
    }
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, sunpower_rs::Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(sunpower_rs::Error::FormatError))?;
    String::from_utf8(buffer).or(Err(sunpower_rs::Error::FormatError))
}

#[cfg(test)]
mod test {
    use super::*;
    use sunpower_rs::model::{FieldValue, Measurement, NormalizedPoint};

    fn inverter(serial: &str, power: f64) -> NormalizedPoint {
        let mut point = NormalizedPoint::new(Measurement::Inverters);
        point.tags.insert("serial", serial.to_string());
        point.fields.insert("ac_power_kw", FieldValue::Float(power));
        point
    }

    #[test]
    fn departed_device_leaves_the_field_gauge() {
        let both = Batch {
            points: vec![
                inverter("E00121234567A08088935", 0.29),
                inverter("E00121234567A08097339", 0.31),
            ],
            errors: vec![],
        };
        process_batch(&both);
        let before = read().unwrap();
        assert!(before.contains("E00121234567A08088935"), "{}", before);
        assert!(before.contains("E00121234567A08097339"), "{}", before);

        let one = Batch {
            points: vec![inverter("E00121234567A08097339", 0.3)],
            errors: vec![],
        };
        process_batch(&one);
        let after = read().unwrap();
        assert!(!after.contains("E00121234567A08088935"), "{}", after);
        assert!(after.contains("E00121234567A08097339"), "{}", after);
    }
}
