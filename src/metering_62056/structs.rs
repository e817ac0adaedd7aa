use crate::models::Reading;

/// Baud rate code sent by the meter in its identification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudRateId(u8);

impl BaudRateId {
    /// Accepts only codes from the mode A/B/C table.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'0' | b'A'..=b'F' | b'1'..=b'6' => Some(Self(b)),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        self.0
    }

    pub fn baud_rate(&self) -> u32 {
        match self.0 {
            b'0' => 300,
            b'A' | b'1' => 600,
            b'B' | b'2' => 1200,
            b'C' | b'3' => 2400,
            b'D' | b'4' => 4800,
            b'E' | b'5' => 9600,
            b'F' | b'6' => 19200,
            // from_byte rejects everything else
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationMessage {
    pub manufacturer_id: String,
    pub baud_id: BaudRateId,
    pub identification: String,
}

impl std::fmt::Display for IdentificationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "manufacturer: {}, baud id: {}, identification: {}",
            self.manufacturer_id,
            self.baud_id.as_byte() as char,
            self.identification
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    pub data_sets: Vec<Reading>,
    /// Checksum accumulated over the bytes after STX up to and including ETX.
    pub bcc: u8,
    /// Checksum byte sent by the meter after ETX. Reported only, never enforced.
    pub trailing_bcc: u8,
}

impl DataMessage {
    pub fn checksum_matches(&self) -> bool {
        self.bcc == self.trailing_bcc
    }
}
