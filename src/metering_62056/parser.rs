use super::reader::TelegramReader;
use super::structs::{BaudRateId, DataMessage, IdentificationMessage};
use super::utils::printable;
use super::*;
use crate::models::Reading;
use log::{debug, trace};
use tokio::io::AsyncBufRead;

fn field_to_string(v: &[u8]) -> String {
    v.iter().map(|b| *b as char).collect()
}

/// Decoder for one mode A/B/C readout.
///
/// Data sets look like `Address(Value*Unit)`, `Address(Value)` or `Address()`.
/// A data line holds one or more data sets followed by CR LF, a data block one
/// or more data lines. The data message is
/// `STX <data block> ! CR LF ETX <BCC>`.
///
/// Every `parse_data_message` call starts with its own checksum; nothing is
/// carried between telegrams except the bytes left in the reader.
pub struct TelegramParser<R> {
    reader: TelegramReader<R>,
}

impl<R: AsyncBufRead + Unpin> TelegramParser<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: TelegramReader::new(inner),
        }
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Next byte, end of stream is a format error.
    async fn next_byte(&mut self) -> Result<u8, Iec62056ParseError> {
        self.reader
            .read_byte()
            .await?
            .ok_or(Iec62056ParseError::InvalidFormat)
    }

    pub async fn parse_identification_message(
        &mut self,
    ) -> Result<IdentificationMessage, Iec62056ParseError> {
        if self.next_byte().await? != START_CHAR {
            return Err(Iec62056ParseError::InvalidFormat);
        }

        let mut man = [0u8; MANUFACTURER_ID_LEN];
        for b in man.iter_mut() {
            *b = self.next_byte().await?;
        }

        let baud_id = BaudRateId::from_byte(self.next_byte().await?)
            .ok_or(Iec62056ParseError::InvalidFormat)?;

        // \W marks an enhanced identification, neither byte belongs to it
        if self.reader.peek_byte().await? == Some(SEQ_DEL_CHAR) {
            self.reader.consume_peeked();
            if self.next_byte().await? != ENHANCED_ID_CHAR {
                return Err(Iec62056ParseError::InvalidFormat);
            }
        }

        let mut v: Vec<u8> = Vec::with_capacity(MAX_IDENTIFICATION_LEN);
        loop {
            let b = self.next_byte().await?;
            if b == CR {
                break;
            }
            v.push(b);
            if v.len() > MAX_IDENTIFICATION_LEN {
                return Err(Iec62056ParseError::IdentificationTooLong);
            }
        }

        if self.next_byte().await? != LF {
            return Err(Iec62056ParseError::InvalidFormat);
        }

        let msg = IdentificationMessage {
            manufacturer_id: field_to_string(&man),
            baud_id,
            identification: field_to_string(&v),
        };
        trace!("Identification raw: {}", printable(&v));
        debug!("Parsed identification message: {msg}");
        Ok(msg)
    }

    pub async fn parse_data_message(&mut self) -> Result<DataMessage, Iec62056ParseError> {
        trace!("Scanning for STX");
        loop {
            match self.reader.read_byte().await? {
                Some(STX_CHAR) => break,
                Some(_) => continue,
                None => return Err(Iec62056ParseError::UnexpectedEof),
            }
        }

        let mut bcc = Bcc::new();
        let data_sets = self.parse_data_block(&mut bcc).await?;
        let trailing_bcc = self.parse_data_message_end(&mut bcc).await?;

        let msg = DataMessage {
            data_sets,
            bcc: bcc.value(),
            trailing_bcc,
        };
        if !msg.checksum_matches() {
            debug!(
                "Checksum differs, computed {:#04x}, received {:#04x}",
                msg.bcc, msg.trailing_bcc
            );
        }
        Ok(msg)
    }

    /// `! CR LF ETX BCC`. Returns the BCC byte as received.
    pub(crate) async fn parse_data_message_end(
        &mut self,
        bcc: &mut Bcc,
    ) -> Result<u8, Iec62056ParseError> {
        trace!("Parsing data message end");
        for expected in [END_CHAR, CR, LF, ETX_CHAR] {
            let b = self.next_byte().await?;
            if b != expected {
                debug!(
                    "Data message end: expected {}, found {}",
                    printable(&[expected]),
                    printable(&[b])
                );
                return Err(Iec62056ParseError::InvalidFormat);
            }
            bcc.digest(b);
        }
        self.next_byte().await
    }

    /// Parses data lines until one fails. The failure ends the block unless no
    /// line was read at all.
    pub(crate) async fn parse_data_block(
        &mut self,
        bcc: &mut Bcc,
    ) -> Result<Vec<Reading>, Iec62056ParseError> {
        trace!("Parsing data block");
        let mut res: Vec<Reading> = Vec::new();
        loop {
            match self.parse_data_line(bcc).await {
                Ok(sets) => res.extend(sets),
                Err(Iec62056ParseError::Io(e)) => return Err(Iec62056ParseError::Io(e)),
                Err(e) => {
                    if res.is_empty() {
                        return Err(Iec62056ParseError::EmptyDataLine);
                    }
                    debug!("Data block ended after {} data sets: {e}", res.len());
                    return Ok(res);
                }
            }
        }
    }

    pub(crate) async fn parse_data_line(
        &mut self,
        bcc: &mut Bcc,
    ) -> Result<Vec<Reading>, Iec62056ParseError> {
        trace!("Parsing data line");
        let mut res: Vec<Reading> = Vec::new();
        loop {
            res.push(self.parse_data_set(bcc).await?);

            match self.reader.peek_byte().await? {
                Some(CR) => {
                    self.reader.consume_peeked();
                    bcc.digest(CR);
                    if self.reader.read_byte().await? != Some(LF) {
                        return Err(Iec62056ParseError::InvalidFormat);
                    }
                    bcc.digest(LF);
                    return Ok(res);
                }
                // last line closed by the message end, left for the end parser
                Some(END_CHAR) => return Ok(res),
                _ => continue,
            }
        }
    }

    pub(crate) async fn parse_data_set(
        &mut self,
        bcc: &mut Bcc,
    ) -> Result<Reading, Iec62056ParseError> {
        let mut v: Vec<u8> = Vec::with_capacity(MAX_VALUE_LEN);

        trace!("Scanning for address");
        loop {
            let b = self
                .reader
                .peek_byte()
                .await?
                .ok_or(Iec62056ParseError::InvalidFormat)?;
            match b {
                CR | LF => return Err(Iec62056ParseError::CrFound),
                FRONT_BOUNDARY_CHAR => {
                    self.reader.consume_peeked();
                    bcc.digest(b);
                    break;
                }
                _ if is_reserved(b) => return Err(Iec62056ParseError::InvalidFormat),
                _ => {
                    self.reader.consume_peeked();
                    bcc.digest(b);
                    v.push(b);
                    if v.len() > MAX_ADDRESS_LEN {
                        return Err(Iec62056ParseError::AddressTooLong);
                    }
                }
            }
        }
        let address = field_to_string(&v);
        v.clear();

        trace!("Scanning for value");
        let terminator = loop {
            let b = self.next_byte().await?;
            bcc.digest(b);
            match b {
                REAR_BOUNDARY_CHAR | UNIT_SEPARATOR => break b,
                _ if is_reserved(b) => return Err(Iec62056ParseError::InvalidFormat),
                _ => {
                    v.push(b);
                    if v.len() > MAX_VALUE_LEN {
                        return Err(Iec62056ParseError::ValueTooLong);
                    }
                }
            }
        };
        let value = field_to_string(&v);
        v.clear();

        if terminator == REAR_BOUNDARY_CHAR {
            return Ok(Reading::new(address, value, String::new()));
        }

        trace!("Scanning for unit");
        loop {
            let b = self.next_byte().await?;
            bcc.digest(b);
            match b {
                REAR_BOUNDARY_CHAR => break,
                _ if is_reserved(b) => return Err(Iec62056ParseError::InvalidFormat),
                _ => {
                    v.push(b);
                    if v.len() > MAX_UNIT_LEN {
                        return Err(Iec62056ParseError::UnitTooLong);
                    }
                }
            }
        }

        Ok(Reading::new(address, value, field_to_string(&v)))
    }
}

/// Reads the identification message followed by the data message.
pub async fn read_telegram<R: AsyncBufRead + Unpin>(
    parser: &mut TelegramParser<R>,
) -> Result<(IdentificationMessage, DataMessage), Iec62056ParseError> {
    let id = parser.parse_identification_message().await?;
    let data = parser.parse_data_message().await?;
    Ok((id, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_SET_VALUE_UNIT: &str = "1.1.1.1(12*kWh)";
    const VALID_DATA_LINE: &str = "1.1.1.1(12*kWh)1.1.1.1(12*kWh)\r\n";

    fn parser(input: &[u8]) -> TelegramParser<&[u8]> {
        TelegramParser::new(input)
    }

    fn reading(address: &str, value: &str, unit: &str) -> Reading {
        Reading::new(address, value, unit)
    }

    fn valid_data_message() -> Vec<u8> {
        let mut msg = vec![STX_CHAR];
        msg.extend_from_slice(VALID_DATA_LINE.as_bytes());
        msg.extend_from_slice(VALID_DATA_LINE.as_bytes());
        msg.extend_from_slice(b"!\r\n");
        msg.push(ETX_CHAR);
        msg.push(0);
        msg
    }

    #[tokio::test]
    async fn test_parse_data_set_value_unit() {
        let mut bcc = Bcc::new();
        let ds = parser(DATA_SET_VALUE_UNIT.as_bytes())
            .parse_data_set(&mut bcc)
            .await
            .unwrap();
        assert_eq!(ds, reading("1.1.1.1", "12", "kWh"));

        let mut expected = Bcc::new();
        expected.digest_many(DATA_SET_VALUE_UNIT.as_bytes());
        assert_eq!(bcc, expected);
    }

    #[tokio::test]
    async fn test_parse_data_set_no_value_no_unit() {
        let mut bcc = Bcc::new();
        let ds = parser(b"1.1.1.1()").parse_data_set(&mut bcc).await.unwrap();
        assert_eq!(ds, reading("1.1.1.1", "", ""));
    }

    #[tokio::test]
    async fn test_parse_data_set_value_no_unit() {
        let mut bcc = Bcc::new();
        let ds = parser(b"1.1.1.1(12)").parse_data_set(&mut bcc).await.unwrap();
        assert_eq!(ds, reading("1.1.1.1", "12", ""));
    }

    #[tokio::test]
    async fn test_parse_data_set_leaves_cr() {
        let mut bcc = Bcc::new();
        let mut p = parser(b"1.1.1.1(12*kWh)\r\n");
        let ds = p.parse_data_set(&mut bcc).await.unwrap();
        assert_eq!(ds.unit, "kWh");
        assert_eq!(p.reader.read_byte().await.unwrap(), Some(CR));
    }

    #[tokio::test]
    async fn test_parse_data_set_empty_input() {
        let mut bcc = Bcc::new();
        let res = parser(b"").parse_data_set(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_parse_data_set_missing_rear_boundary() {
        let mut bcc = Bcc::new();
        let res = parser(b"1.1.1.1(").parse_data_set(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_parse_data_set_cr_in_address() {
        let mut bcc = Bcc::new();
        let mut p = parser(b"\r\n");
        let res = p.parse_data_set(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::CrFound)));
        // the CR is still there for the caller
        assert_eq!(p.reader.peek_byte().await.unwrap(), Some(CR));
    }

    #[tokio::test]
    async fn test_parse_data_set_reserved_in_address() {
        for input in [&b"1.1*1(2)"[..], b"1/1(2)", b"1)1(2)", b"!"] {
            let mut bcc = Bcc::new();
            let res = parser(input).parse_data_set(&mut bcc).await;
            assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
        }
    }

    #[tokio::test]
    async fn test_parse_data_set_reserved_in_value_and_unit() {
        let mut bcc = Bcc::new();
        let res = parser(b"1.8.1(1(2)").parse_data_set(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));

        let mut bcc = Bcc::new();
        let res = parser(b"1.8.1(12*k*Wh)").parse_data_set(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_address_length_limit() {
        let mut bcc = Bcc::new();
        let ds = parser(b"1234567890123456(1)")
            .parse_data_set(&mut bcc)
            .await
            .unwrap();
        assert_eq!(ds.address, "1234567890123456");

        let mut bcc = Bcc::new();
        let res = parser(b"12345678901234567(1)").parse_data_set(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::AddressTooLong)));
    }

    #[tokio::test]
    async fn test_value_length_limit() {
        let mut bcc = Bcc::new();
        let ds = parser(b"1.1.1.1(12345678901234567890123456789012)")
            .parse_data_set(&mut bcc)
            .await
            .unwrap();
        assert_eq!(ds.value, "12345678901234567890123456789012");
        assert_eq!(ds.unit, "");

        let mut bcc = Bcc::new();
        let res = parser(b"1.1.1.1(123456789012345678901234567890123)")
            .parse_data_set(&mut bcc)
            .await;
        assert!(matches!(res, Err(Iec62056ParseError::ValueTooLong)));
    }

    #[tokio::test]
    async fn test_unit_length_limit() {
        let mut bcc = Bcc::new();
        let ds = parser(b"1.1.1.1(12345678901234567890123456789012*1234567890123456)")
            .parse_data_set(&mut bcc)
            .await
            .unwrap();
        assert_eq!(ds.unit, "1234567890123456");

        let mut bcc = Bcc::new();
        let res = parser(b"1.1.1.1(12345678901234567890123456789012*12345678901234567)")
            .parse_data_set(&mut bcc)
            .await;
        assert!(matches!(res, Err(Iec62056ParseError::UnitTooLong)));
    }

    #[tokio::test]
    async fn test_data_line() {
        let mut bcc = Bcc::new();
        let sets = parser(VALID_DATA_LINE.as_bytes())
            .parse_data_line(&mut bcc)
            .await
            .unwrap();
        assert_eq!(sets.len(), 2);
    }

    #[tokio::test]
    async fn test_data_line_cr_without_lf() {
        let mut bcc = Bcc::new();
        let res = parser(b"1.1.1.1(12*kWh)\r1.1.1.1(12*kWh)")
            .parse_data_line(&mut bcc)
            .await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_data_block_leaves_end_char() {
        let input = format!("{VALID_DATA_LINE}{VALID_DATA_LINE}!");
        let mut bcc = Bcc::new();
        let mut p = parser(input.as_bytes());
        let sets = p.parse_data_block(&mut bcc).await.unwrap();
        assert_eq!(sets.len(), 4);
        assert_eq!(p.reader.read_byte().await.unwrap(), Some(END_CHAR));
    }

    #[tokio::test]
    async fn test_data_block_without_end() {
        let input = format!("{VALID_DATA_LINE}{VALID_DATA_LINE}");
        let mut bcc = Bcc::new();
        let sets = parser(input.as_bytes())
            .parse_data_block(&mut bcc)
            .await
            .unwrap();
        assert_eq!(sets.len(), 4);
    }

    #[tokio::test]
    async fn test_data_block_empty() {
        let mut bcc = Bcc::new();
        let res = parser(b"!\r\n").parse_data_block(&mut bcc).await;
        assert!(matches!(res, Err(Iec62056ParseError::EmptyDataLine)));
    }

    #[tokio::test]
    async fn test_data_message() {
        let msg = valid_data_message();
        let dm = parser(&msg).parse_data_message().await.unwrap();
        assert_eq!(dm.data_sets.len(), 4);

        // everything after STX up to and including ETX
        let mut expected = Bcc::new();
        expected.digest_many(&msg[1..msg.len() - 1]);
        assert_eq!(dm.bcc, expected.value());
        assert_eq!(dm.trailing_bcc, 0);
    }

    #[tokio::test]
    async fn test_data_message_skips_noise_before_stx() {
        let mut msg = b"noise\r\n".to_vec();
        msg.extend(valid_data_message());
        let dm = parser(&msg).parse_data_message().await.unwrap();
        assert_eq!(dm.data_sets.len(), 4);
    }

    #[tokio::test]
    async fn test_data_message_no_stx() {
        let res = parser(b"1.1.1.1(12*kWh)\r\n!\r\n").parse_data_message().await;
        assert!(matches!(res, Err(Iec62056ParseError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_data_message_bad_end() {
        let mut msg = vec![STX_CHAR];
        msg.extend_from_slice(VALID_DATA_LINE.as_bytes());
        msg.extend_from_slice(b"!\n\r");
        msg.push(ETX_CHAR);
        msg.push(0);
        let res = parser(&msg).parse_data_message().await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_data_message_missing_bcc() {
        let mut msg = vec![STX_CHAR];
        msg.extend_from_slice(VALID_DATA_LINE.as_bytes());
        msg.extend_from_slice(b"!\r\n");
        msg.push(ETX_CHAR);
        let res = parser(&msg).parse_data_message().await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    // The trailing checksum is reported, not enforced: a wrong BCC still parses.
    #[tokio::test]
    async fn test_data_message_wrong_bcc_is_accepted() {
        let mut msg = valid_data_message();
        let last = msg.len() - 1;
        msg[last] = 0x55;
        let dm = parser(&msg).parse_data_message().await.unwrap();
        assert_eq!(dm.trailing_bcc, 0x55);
        assert!(!dm.checksum_matches());
        assert_eq!(dm.data_sets.len(), 4);
    }

    #[tokio::test]
    async fn test_identification_message() {
        let p = &mut parser(b"/MANAidentification\r\n");
        let im = p.parse_identification_message().await.unwrap();
        assert_eq!(im.manufacturer_id, "MAN");
        assert_eq!(im.baud_id.as_byte(), b'A');
        assert_eq!(im.baud_id.baud_rate(), 600);
        assert_eq!(im.identification, "identification");
    }

    #[tokio::test]
    async fn test_identification_message_enhanced() {
        let im = parser(b"/MANA\\Widentification\r\n")
            .parse_identification_message()
            .await
            .unwrap();
        assert_eq!(im.manufacturer_id, "MAN");
        assert_eq!(im.identification, "identification");
    }

    #[tokio::test]
    async fn test_identification_message_bad_sequence_delimiter() {
        let res = parser(b"/MANA\\Xidentification\r\n")
            .parse_identification_message()
            .await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_identification_message_bad_start() {
        let res = parser(b"MANAid\r\n").parse_identification_message().await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_identification_message_bad_baud_id() {
        let res = parser(b"/asdasdMANAidentification\r\n")
            .parse_identification_message()
            .await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_identification_message_missing_lf() {
        let res = parser(b"/MANAid\r\r").parse_identification_message().await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_identification_message_truncated() {
        let res = parser(b"/MA").parse_identification_message().await;
        assert!(matches!(res, Err(Iec62056ParseError::InvalidFormat)));
    }

    #[tokio::test]
    async fn test_identification_lengths() {
        for len in 0..=16usize {
            let id = "X".repeat(len);
            let input = format!("/ESY5{id}\r\n");
            let im = parser(input.as_bytes())
                .parse_identification_message()
                .await
                .unwrap();
            assert_eq!(im.identification, id);
            assert_eq!(im.manufacturer_id, "ESY");
        }
        for len in [17usize, 18, 40] {
            let input = format!("/ESY5{}\r\n", "X".repeat(len));
            let res = parser(input.as_bytes()).parse_identification_message().await;
            assert!(
                matches!(res, Err(Iec62056ParseError::IdentificationTooLong)),
                "length {len}"
            );
        }
    }

    #[tokio::test]
    async fn test_full_telegram() {
        let mut input = b"/MANAid\r\n".to_vec();
        input.push(STX_CHAR);
        input.extend_from_slice(b"1.1.1.1(12*kWh)");
        input.extend_from_slice(b"!\r\n");
        input.push(ETX_CHAR);
        input.push(0x00);

        let mut p = parser(&input);
        let (im, dm) = read_telegram(&mut p).await.unwrap();
        assert_eq!(im.manufacturer_id, "MAN");
        assert_eq!(im.identification, "id");
        assert_eq!(dm.data_sets, vec![reading("1.1.1.1", "12", "kWh")]);
        assert!(p.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_checksum_is_fresh_per_message() {
        let mut input = valid_data_message();
        input.extend(valid_data_message());
        let mut p = parser(&input);
        let first = p.parse_data_message().await.unwrap();
        let second = p.parse_data_message().await.unwrap();
        assert_eq!(first.bcc, second.bcc);
    }
}
