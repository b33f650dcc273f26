use super::{DeviceError, RawDeviceRecord, RawValue};
use crate::model::{DeviceCategory, FieldValue, NormalizedPoint};

/// `(point name, gateway name)` pairs.
type Mapping = &'static [(&'static str, &'static str)];

const SUPERVISOR_TAGS: Mapping = &[
    ("serial", "SERIAL"),
    ("model", "MODEL"),
    ("hwver", "HWVER"),
    ("swver", "SWVER"),
    ("device_type", "DEVICE_TYPE"),
];

const SUPERVISOR_FIELDS: Mapping = &[
    /* seconds since boot */
    ("dl_uptime", "dl_uptime"),
    /* 1-minute load average */
    ("dl_cpu_load", "dl_cpu_load"),
    /* KiB */
    ("dl_mem_used", "dl_mem_used"),
    /* KiB */
    ("dl_flash_avail", "dl_flash_avail"),
];

const METER_TAGS: Mapping = &[
    ("serial", "SERIAL"),
    ("model", "MODEL"),
    ("desc", "DESCR"),
    ("device_type", "DEVICE_TYPE"),
    ("swver", "SWVER"),
    ("type", "TYPE"),
];

const METER_FIELDS: Mapping = &[
    ("total_net_energy_kwh", "net_ltea_3phsum_kwh"),
    ("p_3phsum_kw", "p_3phsum_kw"),
    ("q_3phsum_kvar", "q_3phsum_kvar"),
    ("s_3phsum_kva", "s_3phsum_kva"),
    ("tot_pf_rto", "tot_pf_rto"),
    ("freq_hz", "freq_hz"),
];

const INVERTER_TAGS: Mapping = &[
    ("serial", "SERIAL"),
    ("type", "TYPE"),
    ("state", "STATE"),
    ("model", "MODEL"),
    ("desc", "DESCR"),
    ("device_type", "DEVICE_TYPE"),
    ("swver", "SWVER"),
    ("mod_sn", "MOD_SN"),
];

pub const INVERTER_FIELDS: Mapping = &[
    ("freq_hz", "freq_hz"),
    /* AC side */
    ("i_3phsum_a", "i_3phsum_a"),
    /* DC side */
    ("i_mppt1_a", "i_mppt1_a"),
    ("ltea_3phsum_kwh", "ltea_3phsum_kwh"),
    ("p_3phsum_kw", "p_3phsum_kw"),
    ("p_mpptsum_kw", "p_mpptsum_kw"),
    ("t_htsnk_degc", "t_htsnk_degc"),
    ("v_mppt1_v", "v_mppt1_v"),
    ("vln_3phavg_v", "vln_3phavg_v"),
];

const READING_TIMES: Mapping = &[("datatime", "DATATIME"), ("curtime", "CURTIME")];
const CT_SCALE: Mapping = &[("ct_scl_fctr", "ct_scl_fctr")];
const STATE_DESCRIPTION: Mapping = &[("statedescr", "STATEDESCR")];
/* faulted inverters report no `datatime` */
const FAULTED_TIMES: Mapping = &[("curtime", "CURTIME")];

/// Last eight characters of an inverter serial, or the whole serial if it is shorter.
pub fn serial_short(serial: &str) -> &str {
    let len = serial.chars().count();
    match serial.char_indices().nth(len.saturating_sub(8)) {
        Some((start, _)) => &serial[start..],
        None => serial,
    }
}

fn tags(
    point: &mut NormalizedPoint,
    record: &RawDeviceRecord,
    mapping: Mapping,
) -> Result<(), DeviceError> {
    for &(name, source) in mapping {
        point.tags.insert(name, record.text(source)?);
    }
    Ok(())
}

fn numeric_fields(
    point: &mut NormalizedPoint,
    record: &RawDeviceRecord,
    mapping: Mapping,
) -> Result<(), DeviceError> {
    for &(name, source) in mapping {
        point
            .fields
            .insert(name, FieldValue::Float(record.number(source)?));
    }
    Ok(())
}

fn passthrough_fields(
    point: &mut NormalizedPoint,
    record: &RawDeviceRecord,
    mapping: Mapping,
) -> Result<(), DeviceError> {
    for &(name, source) in mapping {
        let value = match record.require(source)? {
            RawValue::Text(s) => FieldValue::Text(s.to_owned()),
            RawValue::Number(n) => FieldValue::Float(*n),
        };
        point.fields.insert(name, value);
    }
    Ok(())
}

fn inverter_tags(point: &mut NormalizedPoint, record: &RawDeviceRecord) -> Result<(), DeviceError> {
    tags(point, record, INVERTER_TAGS)?;
    let short = serial_short(&point.tags["serial"]).to_string();
    point.tags.insert("serial_short", short);
    Ok(())
}

/// Map `record` into a point according to its `category`.
///
/// Fails on the first required field that is absent or not numeric. A faulted inverter
/// gets every measurement set to `0.0` instead of being read from the record.
pub fn transform(
    category: DeviceCategory,
    record: &RawDeviceRecord,
) -> Result<NormalizedPoint, DeviceError> {
    let mut point = NormalizedPoint::new(category.measurement());

    match category {
        DeviceCategory::Supervisor => {
            tags(&mut point, record, SUPERVISOR_TAGS)?;
            numeric_fields(&mut point, record, SUPERVISOR_FIELDS)?;
            passthrough_fields(&mut point, record, READING_TIMES)?;
        }
        DeviceCategory::ProductionMeter | DeviceCategory::ConsumptionMeter => {
            tags(&mut point, record, METER_TAGS)?;
            passthrough_fields(&mut point, record, CT_SCALE)?;
            numeric_fields(&mut point, record, METER_FIELDS)?;
            passthrough_fields(&mut point, record, READING_TIMES)?;
        }
        DeviceCategory::WorkingInverter => {
            inverter_tags(&mut point, record)?;
            numeric_fields(&mut point, record, INVERTER_FIELDS)?;
            passthrough_fields(&mut point, record, READING_TIMES)?;
            passthrough_fields(&mut point, record, STATE_DESCRIPTION)?;
        }
        DeviceCategory::FaultedInverter => {
            inverter_tags(&mut point, record)?;
            for &(name, _) in INVERTER_FIELDS {
                point.fields.insert(name, FieldValue::Float(0.0));
            }
            passthrough_fields(&mut point, record, FAULTED_TIMES)?;
            passthrough_fields(&mut point, record, STATE_DESCRIPTION)?;
        }
    }

    Ok(point)
}
