use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    // Keyed by the C.D.E part, which is what mode A/B/C meters usually send.
    static ref DESCRIPTIONS: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();

        // Energy values
        map.insert("1.8.0", "Active energy + (total)");
        map.insert("1.8.1", "Active energy + (tariff 1)");
        map.insert("1.8.2", "Active energy + (tariff 2)");
        map.insert("2.8.0", "Active energy - (total)");
        map.insert("2.8.1", "Active energy - (tariff 1)");
        map.insert("2.8.2", "Active energy - (tariff 2)");
        map.insert("15.8.0", "Absolute active energy total");
        map.insert("3.8.0", "Reactive energy + (total)");
        map.insert("4.8.0", "Reactive energy - (total)");

        // Power values
        map.insert("1.7.0", "Active power + (total)");
        map.insert("2.7.0", "Active power - (total)");
        map.insert("15.7.0", "Absolute active instantaneous power");
        map.insert("16.7.0", "Sum active instantaneous power");
        map.insert("21.7.0", "Active power + (L1)");
        map.insert("41.7.0", "Active power + (L2)");
        map.insert("61.7.0", "Active power + (L3)");
        map.insert("3.7.0", "Reactive power + (total)");
        map.insert("4.7.0", "Reactive power - (total)");

        // Voltage and current
        map.insert("32.7.0", "Voltage (L1)");
        map.insert("52.7.0", "Voltage (L2)");
        map.insert("72.7.0", "Voltage (L3)");
        map.insert("31.7.0", "Current (L1)");
        map.insert("51.7.0", "Current (L2)");
        map.insert("71.7.0", "Current (L3)");

        map.insert("13.7.0", "Power factor");
        map.insert("14.7.0", "Supply frequency");

        // Identification and housekeeping
        map.insert("0.0.0", "Device address");
        map.insert("0.9.1", "Meter time");
        map.insert("0.9.2", "Meter date");
        map.insert("C.1", "Serial number");
        map.insert("C.1.0", "Serial number");
        map.insert("F.F", "Error register");
        map.insert("F.F.0", "Error register");

        map
    };
}

/// Strips the `A-B:` medium/channel prefix and the `*F` storage suffix,
/// `1-0:1.8.1*255` becomes `1.8.1`.
pub fn short_code(address: &str) -> &str {
    let code = address.trim();
    let code = match code.split_once(':') {
        Some((_, rest)) => rest,
        None => code,
    };
    match code.split_once('*') {
        Some((cde, _)) => cde,
        None => code,
    }
}

pub fn get_obis_description(address: &str) -> Option<&'static str> {
    DESCRIPTIONS.get(short_code(address)).copied()
}
