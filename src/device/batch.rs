use super::classify::WORKING_STATE;
use super::{normalize, ClassifyMode, DeviceError, RawDeviceRecord};
use crate::model::{Measurement, NormalizedPoint};
use serde::Serialize;
use serde_json::Value;

/// A device that could not be turned into a point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceFailure {
    /// Position of the device in the gateway's list.
    pub index: usize,
    pub serial: Option<String>,
    pub error: DeviceError,
}

/// Points of one poll cycle, in gateway order, with the devices that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    pub points: Vec<NormalizedPoint>,
    pub errors: Vec<DeviceFailure>,
}

impl Batch {
    fn push(
        &mut self,
        index: usize,
        serial: Option<String>,
        result: Result<NormalizedPoint, DeviceError>,
    ) {
        match result {
            Ok(point) => self.points.push(point),
            Err(error) => self.errors.push(DeviceFailure {
                index,
                serial,
                error,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.errors.is_empty()
    }

    fn inverters(&self) -> impl Iterator<Item = &NormalizedPoint> {
        self.points
            .iter()
            .filter(|p| p.measurement == Measurement::Inverters)
    }

    /// `serial_short` of every inverter in the batch.
    pub fn reported_inverters(&self) -> impl Iterator<Item = &str> {
        self.inverters().filter_map(|p| p.tag("serial_short"))
    }

    /// `serial_short` of every inverter not in the working state.
    pub fn faulted_inverters(&self) -> impl Iterator<Item = &str> {
        self.inverters()
            .filter(|p| {
                p.field("statedescr").and_then(|v| v.as_str()) != Some(WORKING_STATE)
            })
            .filter_map(|p| p.tag("serial_short"))
    }
}

pub fn assemble(devices: &[RawDeviceRecord]) -> Batch {
    assemble_with(ClassifyMode::Lenient, devices)
}

pub fn assemble_with(mode: ClassifyMode, devices: &[RawDeviceRecord]) -> Batch {
    let mut batch = Batch::default();
    for (index, record) in devices.iter().enumerate() {
        batch.push(index, record.serial(), normalize(mode, record));
    }
    batch
}

/// Assemble straight from the decoded device list; a device entry that is not even a JSON
/// object is reported like any other failing device.
pub fn assemble_values(mode: ClassifyMode, devices: &[Value]) -> Batch {
    let mut batch = Batch::default();
    for (index, value) in devices.iter().enumerate() {
        let (serial, result) = match RawDeviceRecord::from_value(value) {
            Ok(record) => (record.serial(), normalize(mode, &record)),
            Err(e) => (None, Err(e)),
        };
        batch.push(index, serial, result);
    }
    batch
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn inverter(serial: &str, state: &str) -> Value {
        json!({
            "DEVICE_TYPE": "Inverter",
            "SERIAL": serial,
            "MODEL": "AC_Module_Type_D",
            "DESCR": format!("Inverter {}", serial),
            "SWVER": "4.21.4",
            "TYPE": "SOLARBRIDGE",
            "STATE": state.to_lowercase(),
            "STATEDESCR": state,
            "MOD_SN": serial,
            "freq_hz": "60.01",
            "i_3phsum_a": "1.22",
            "i_mppt1_a": "5.73",
            "ltea_3phsum_kwh": "1520.3366",
            "p_3phsum_kw": "0.2934",
            "p_mpptsum_kw": "0.3005",
            "t_htsnk_degc": "41",
            "v_mppt1_v": "52.44",
            "vln_3phavg_v": "241.38",
            "DATATIME": "2021,03,19,14,15,00",
            "CURTIME": "2021,03,19,14,17,30"
        })
    }

    #[test]
    fn empty_list_is_an_empty_batch() {
        assert!(assemble(&[]).is_empty());
        assert!(assemble_values(ClassifyMode::Lenient, &[]).is_empty());
    }

    #[test]
    fn failing_device_does_not_drop_the_others() {
        let mut broken = inverter("E00121234567A08088938", "Working");
        broken.as_object_mut().unwrap().remove("MODEL");

        let devices = vec![
            inverter("E00121234567A08088935", "Working"),
            broken,
            inverter("E00121234567A08097339", "Working"),
        ];
        let batch = assemble_values(ClassifyMode::Lenient, &devices);

        assert_eq!(
            vec!["08088935", "08097339"],
            batch.reported_inverters().collect::<Vec<_>>()
        );
        assert_eq!(
            vec![DeviceFailure {
                index: 1,
                serial: Some("E00121234567A08088938".to_string()),
                error: DeviceError::MissingField("MODEL"),
            }],
            batch.errors
        );
    }

    #[test]
    fn non_finite_reading_only_drops_its_device() {
        let mut not_a_number = inverter("E00121234567A08088938", "Working");
        not_a_number["p_3phsum_kw"] = json!("NaN");
        let mut infinite = inverter("E00121234567A08097345", "Working");
        infinite["v_mppt1_v"] = json!("inf");

        let devices = vec![
            inverter("E00121234567A08088935", "Working"),
            not_a_number,
            infinite,
            inverter("E00121234567A08097339", "Working"),
        ];
        let batch = assemble_values(ClassifyMode::Lenient, &devices);

        assert_eq!(
            vec!["08088935", "08097339"],
            batch.reported_inverters().collect::<Vec<_>>()
        );
        assert_eq!(
            vec![
                DeviceFailure {
                    index: 1,
                    serial: Some("E00121234567A08088938".to_string()),
                    error: DeviceError::TypeCoercion {
                        field: "p_3phsum_kw",
                        raw: "NaN".to_string()
                    },
                },
                DeviceFailure {
                    index: 2,
                    serial: Some("E00121234567A08097345".to_string()),
                    error: DeviceError::TypeCoercion {
                        field: "v_mppt1_v",
                        raw: "inf".to_string()
                    },
                },
            ],
            batch.errors
        );
    }

    #[test]
    fn numeric_serial_is_kept_on_failure() {
        let devices = vec![json!({"SERIAL": 12345678, "STATEDESCR": "Working"})];
        let from_values = assemble_values(ClassifyMode::Lenient, &devices);
        let records = vec![RawDeviceRecord::from_value(&devices[0]).unwrap()];
        let from_records = assemble(&records);

        assert_eq!(Some("12345678".to_string()), from_values.errors[0].serial);
        assert_eq!(from_records.errors, from_values.errors);
    }

    #[test]
    fn non_object_entry_is_reported() {
        let devices = vec![json!("garbage"), inverter("E00121234567A08088935", "Working")];
        let batch = assemble_values(ClassifyMode::Lenient, &devices);

        assert_eq!(1, batch.points.len());
        assert_eq!(0, batch.errors[0].index);
        assert_eq!(None, batch.errors[0].serial);
        assert!(matches!(
            batch.errors[0].error,
            DeviceError::MalformedRecord(_)
        ));
    }

    #[test]
    fn records_keep_input_order() {
        let records: Vec<RawDeviceRecord> = [
            ("E00121234567A10041974", "Working"),
            ("E00121234567A08088935", "Error"),
            ("E00121234567A10042927", "Working"),
        ]
        .iter()
        .map(|(serial, state)| RawDeviceRecord::from_value(&inverter(serial, state)).unwrap())
        .collect();

        let batch = assemble(&records);
        assert_eq!(
            vec!["10041974", "08088935", "10042927"],
            batch.reported_inverters().collect::<Vec<_>>()
        );
        assert_eq!(
            vec!["08088935"],
            batch.faulted_inverters().collect::<Vec<_>>()
        );
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn strict_mode_collects_unclassifiable_devices() {
        let mut battery = inverter("BMS0001", "Working");
        battery["DEVICE_TYPE"] = json!("ESS BMS");

        let devices = vec![battery, inverter("E00121234567A08088935", "Working")];
        let lenient = assemble_values(ClassifyMode::Lenient, &devices);
        let strict = assemble_values(ClassifyMode::Strict, &devices);

        assert_eq!(2, lenient.points.len());
        assert_eq!(1, strict.points.len());
        assert_eq!(
            DeviceError::UnclassifiableDevice {
                device_type: "ESS BMS".to_string()
            },
            strict.errors[0].error
        );
    }
}
