use thiserror::Error;

pub mod bcc;
pub mod parser;
pub mod reader;
pub mod structs;
pub mod utils;

pub use bcc::Bcc;
pub use parser::TelegramParser;
pub use reader::TelegramReader;
pub use structs::{BaudRateId, DataMessage, IdentificationMessage};
pub use utils::{serialize_request, write_request};

pub const CR: u8 = 0x0D;
pub const LF: u8 = 0x0A;
pub const FRONT_BOUNDARY_CHAR: u8 = b'(';
pub const REAR_BOUNDARY_CHAR: u8 = b')';
pub const UNIT_SEPARATOR: u8 = b'*';
pub const START_CHAR: u8 = b'/';
pub const REQUEST_COMMAND_CHAR: u8 = b'?';
pub const END_CHAR: u8 = b'!';
pub const STX_CHAR: u8 = 0x02;
pub const ETX_CHAR: u8 = 0x03;
pub const SEQ_DEL_CHAR: u8 = b'\\';
/// Marker following the sequence delimiter in an enhanced identification.
pub const ENHANCED_ID_CHAR: u8 = b'W';

pub const MAX_ADDRESS_LEN: usize = 16;
pub const MAX_VALUE_LEN: usize = 32;
pub const MAX_UNIT_LEN: usize = 16;
pub const MAX_IDENTIFICATION_LEN: usize = 16;
pub const MANUFACTURER_ID_LEN: usize = 3;

/// Bytes that frame a data set and may never appear inside a field.
pub fn is_reserved(b: u8) -> bool {
    matches!(
        b,
        FRONT_BOUNDARY_CHAR | REAR_BOUNDARY_CHAR | UNIT_SEPARATOR | START_CHAR | END_CHAR
    )
}

#[derive(Error, Debug)]
pub enum Iec62056ParseError {
    #[error("Invalid telegram format")]
    InvalidFormat,
    #[error("End CR found")]
    CrFound,
    #[error("Empty data line found")]
    EmptyDataLine,
    #[error("Unexpected end of stream while waiting for STX")]
    UnexpectedEof,
    #[error("Address field longer than 16 bytes")]
    AddressTooLong,
    #[error("Value field longer than 32 bytes")]
    ValueTooLong,
    #[error("Unit field longer than 16 bytes")]
    UnitTooLong,
    #[error("Identification field longer than 16 bytes")]
    IdentificationTooLong,
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}
