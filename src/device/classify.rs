use super::{DeviceError, RawDeviceRecord};
use crate::model::DeviceCategory;

pub const SUPERVISOR_TYPE: &str = "PVS";
pub const POWER_METER_TYPE: &str = "Power Meter";
pub const INVERTER_TYPE: &str = "Inverter";

/// CT sensor rating (`CAL0`) of the meter on the production circuit.
pub const PRODUCTION_CT: &str = "50";
/// CT sensor rating (`CAL0`) of the meter on the consumption circuit.
pub const CONSUMPTION_CT: &str = "100";

pub const WORKING_STATE: &str = "Working";

/// How to treat device records that are not a supervisor, a recognized meter, or an
/// inverter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifyMode {
    /// Everything that is not a supervisor or recognized meter is an inverter.
    #[default]
    Lenient,
    /// Only `Inverter` devices reach the inverter branch; anything else is rejected.
    Strict,
}

impl ClassifyMode {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            ClassifyMode::Strict
        } else {
            ClassifyMode::Lenient
        }
    }
}

pub fn classify(record: &RawDeviceRecord) -> Result<DeviceCategory, DeviceError> {
    classify_with(ClassifyMode::Lenient, record)
}

pub fn classify_with(
    mode: ClassifyMode,
    record: &RawDeviceRecord,
) -> Result<DeviceCategory, DeviceError> {
    let device_type = record.text("DEVICE_TYPE")?;

    match device_type.as_str() {
        SUPERVISOR_TYPE => return Ok(DeviceCategory::Supervisor),
        POWER_METER_TYPE => {
            let cal0 = record.text("CAL0")?;
            match cal0.as_str() {
                PRODUCTION_CT => return Ok(DeviceCategory::ProductionMeter),
                CONSUMPTION_CT => return Ok(DeviceCategory::ConsumptionMeter),
                _ if mode == ClassifyMode::Strict => {
                    return Err(DeviceError::UnclassifiableDevice {
                        device_type: format!("{} (CAL0 {})", device_type, cal0),
                    });
                }
                /* unrecognized CT rating: falls through to the inverter branch */
                _ => {}
            }
        }
        INVERTER_TYPE => {}
        _ if mode == ClassifyMode::Strict => {
            return Err(DeviceError::UnclassifiableDevice { device_type });
        }
        _ => {}
    }

    if record.text("STATEDESCR")? == WORKING_STATE {
        Ok(DeviceCategory::WorkingInverter)
    } else {
        Ok(DeviceCategory::FaultedInverter)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RawDeviceRecord {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn supervisor_ignores_other_fields() {
        let pvs = record(&[("DEVICE_TYPE", "PVS"), ("CAL0", "100"), ("STATEDESCR", "Error")]);
        assert_eq!(Ok(DeviceCategory::Supervisor), classify(&pvs));

        let bare = record(&[("DEVICE_TYPE", "PVS")]);
        assert_eq!(Ok(DeviceCategory::Supervisor), classify(&bare));
    }

    #[test]
    fn meters_split_on_ct_rating() {
        let production = record(&[("DEVICE_TYPE", "Power Meter"), ("CAL0", "50")]);
        let consumption = record(&[("DEVICE_TYPE", "Power Meter"), ("CAL0", "100")]);
        assert_eq!(Ok(DeviceCategory::ProductionMeter), classify(&production));
        assert_eq!(Ok(DeviceCategory::ConsumptionMeter), classify(&consumption));
    }

    #[test]
    fn numeric_ct_rating_matches() {
        let mut meter = record(&[("DEVICE_TYPE", "Power Meter")]);
        meter.insert("CAL0", 50.0);
        assert_eq!(Ok(DeviceCategory::ProductionMeter), classify(&meter));
    }

    #[test]
    fn meter_with_other_ct_rating_falls_through_to_inverter() {
        let meter = record(&[
            ("DEVICE_TYPE", "Power Meter"),
            ("CAL0", "200"),
            ("STATEDESCR", "Working"),
        ]);
        assert_eq!(Ok(DeviceCategory::WorkingInverter), classify(&meter));

        let without_state = record(&[("DEVICE_TYPE", "Power Meter"), ("CAL0", "200")]);
        assert_eq!(
            Err(DeviceError::MissingField("STATEDESCR")),
            classify(&without_state)
        );
    }

    #[test]
    fn meter_without_ct_rating_is_missing_field() {
        let meter = record(&[("DEVICE_TYPE", "Power Meter"), ("STATEDESCR", "Working")]);
        assert_eq!(Err(DeviceError::MissingField("CAL0")), classify(&meter));
    }

    #[test]
    fn inverter_state() {
        let working = record(&[("DEVICE_TYPE", "Inverter"), ("STATEDESCR", "Working")]);
        let error = record(&[("DEVICE_TYPE", "Inverter"), ("STATEDESCR", "Error")]);
        let lowercase = record(&[("DEVICE_TYPE", "Inverter"), ("STATEDESCR", "working")]);
        assert_eq!(Ok(DeviceCategory::WorkingInverter), classify(&working));
        assert_eq!(Ok(DeviceCategory::FaultedInverter), classify(&error));
        assert_eq!(Ok(DeviceCategory::FaultedInverter), classify(&lowercase));
    }

    #[test]
    fn unknown_type_is_treated_as_inverter() {
        let battery = record(&[("DEVICE_TYPE", "ESS BMS"), ("STATEDESCR", "Working")]);
        assert_eq!(Ok(DeviceCategory::WorkingInverter), classify(&battery));
    }

    #[test]
    fn missing_device_type() {
        let anonymous = record(&[("STATEDESCR", "Working")]);
        assert_eq!(
            Err(DeviceError::MissingField("DEVICE_TYPE")),
            classify(&anonymous)
        );
    }

    #[test]
    fn strict_mode_rejects_unknown_types() {
        let battery = record(&[("DEVICE_TYPE", "ESS BMS"), ("STATEDESCR", "Working")]);
        assert_eq!(
            Err(DeviceError::UnclassifiableDevice {
                device_type: "ESS BMS".to_string()
            }),
            classify_with(ClassifyMode::Strict, &battery)
        );

        let meter = record(&[
            ("DEVICE_TYPE", "Power Meter"),
            ("CAL0", "200"),
            ("STATEDESCR", "Working"),
        ]);
        assert!(matches!(
            classify_with(ClassifyMode::Strict, &meter),
            Err(DeviceError::UnclassifiableDevice { .. })
        ));

        let inverter = record(&[("DEVICE_TYPE", "Inverter"), ("STATEDESCR", "Working")]);
        assert_eq!(
            Ok(DeviceCategory::WorkingInverter),
            classify_with(ClassifyMode::Strict, &inverter)
        );
    }
}
