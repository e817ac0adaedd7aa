use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::metering_62056::{DataMessage, IdentificationMessage};
use crate::obis_utils;

/// One data set reported by the meter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    /// OBIS style address, e.g. `1.8.1`
    pub address: String,
    pub value: String,
    /// May be empty
    pub unit: String,
    /// Plain name of well known OBIS addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Reading {
    pub fn new(address: impl Into<String>, value: impl Into<String>, unit: impl Into<String>) -> Self {
        let address = address.into();
        let description = obis_utils::get_obis_description(&address).map(str::to_string);
        Reading { address, value: value.into(), unit: unit.into(), description }
    }
}

/// A complete readout of one meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Measurement {
    /// Time the readout was started, not the meter clock
    pub timestamp: DateTime<Utc>,
    pub manufacturer_id: String,
    pub identification: String,
    /// In the order the meter sent them
    pub readings: Vec<Reading>,
}

impl Measurement {
    pub fn from_telegram(
        timestamp: DateTime<Utc>,
        id: IdentificationMessage,
        data: DataMessage,
    ) -> Self {
        Measurement {
            timestamp,
            manufacturer_id: id.manufacturer_id,
            identification: id.identification,
            readings: data.data_sets,
        }
    }

    /// Cache key. The fixed width timestamp comes first so the textual order
    /// of keys is the chronological order of measurements.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.manufacturer_id,
            self.identification
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering_62056::BaudRateId;
    use chrono::TimeZone;

    fn measurement_at(secs: i64, nanos: u32) -> Measurement {
        Measurement {
            timestamp: Utc.timestamp_opt(secs, nanos).unwrap(),
            manufacturer_id: "ESY".to_string(),
            identification: "Q3D".to_string(),
            readings: vec![],
        }
    }

    #[test]
    fn test_from_telegram() {
        let id = IdentificationMessage {
            manufacturer_id: "MAN".to_string(),
            baud_id: BaudRateId::from_byte(b'A').unwrap(),
            identification: "id".to_string(),
        };
        let data = DataMessage {
            data_sets: vec![
                Reading::new("1.8.1", "1", "kWh"),
                Reading::new("1.8.2", "2", "kWh"),
            ],
            bcc: 0,
            trailing_bcc: 0,
        };
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let m = Measurement::from_telegram(ts, id, data);
        assert_eq!(m.manufacturer_id, "MAN");
        assert_eq!(m.identification, "id");
        assert_eq!(m.timestamp, ts);
        assert_eq!(m.readings[0].address, "1.8.1");
        assert_eq!(m.readings[1].address, "1.8.2");
    }

    #[test]
    fn test_key_layout() {
        let m = measurement_at(0, 5);
        assert_eq!(m.key(), "1970-01-01T00:00:00.000000005Z|ESY|Q3D");
    }

    #[test]
    fn test_key_order_follows_time() {
        let keys: Vec<String> = [(9, 0), (10, 0), (10, 1), (100, 999_999_999), (1_000, 0)]
            .iter()
            .map(|(s, n)| measurement_at(*s, *n).key())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_json_round_trip() {
        let mut m = measurement_at(1_700_000_000, 123);
        m.readings = vec![
            Reading::new("2.8.0", "0003.1", "kWh"),
            Reading::new("C.1", "", ""),
        ];
        let json = serde_json::to_string(&m).unwrap();
        let back: Measurement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_reading_description() {
        let r = Reading::new("1.8.1", "1", "kWh");
        assert_eq!(r.description.as_deref(), Some("Active energy + (tariff 1)"));
        assert_eq!(Reading::new("99.99.99", "1", "").description, None);
    }

    #[test]
    fn test_reading_json_carries_description() {
        let json = serde_json::to_value(Reading::new("1-0:2.8.0", "7", "kWh")).unwrap();
        assert_eq!(json["description"], "Active energy - (total)");

        let json = serde_json::to_value(Reading::new("C.99", "x", "")).unwrap();
        assert!(json.get("description").is_none());
    }
}
