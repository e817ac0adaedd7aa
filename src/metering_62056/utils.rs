use super::{CR, END_CHAR, LF, REQUEST_COMMAND_CHAR, START_CHAR};
use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Builds the request command `/?<address>!CR LF`.
/// An empty device address is the broadcast read request.
pub fn serialize_request(device_address: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(device_address.len() + 5);
    msg.push(START_CHAR);
    msg.push(REQUEST_COMMAND_CHAR);
    msg.extend_from_slice(device_address.as_bytes());
    msg.push(END_CHAR);
    msg.push(CR);
    msg.push(LF);
    msg
}

pub async fn write_request<W>(w: &mut W, device_address: &str) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let msg = serialize_request(device_address);
    debug!("Sending request {:?}", String::from_utf8_lossy(&msg));
    w.write_all(&msg).await?;
    w.flush().await?;
    Ok(msg.len())
}

/// Renders raw telegram bytes with control characters spelled out, for logs.
pub fn printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for b in bytes {
        match *b {
            super::STX_CHAR => out.push_str("<STX>"),
            super::ETX_CHAR => out.push_str("<ETX>"),
            CR => out.push_str("<CR>"),
            LF => out.push_str("<LF>"),
            0x20..=0x7E => out.push(*b as char),
            other => out.push_str(&format!("<{:02X}>", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_request() {
        let msg = serialize_request("");
        assert_eq!(msg, b"/?!\r\n".to_vec());
        assert_eq!(msg.len(), 5);
    }

    #[test]
    fn test_addressed_request() {
        assert_eq!(serialize_request("12345678"), b"/?12345678!\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_write_request() {
        let mut out: Vec<u8> = Vec::new();
        let n = write_request(&mut out, "").await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(out, b"/?!\r\n".to_vec());
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable(b"\x02A(1)\r\n!\x03\x7f"), "<STX>A(1)<CR><LF>!<ETX><7F>");
    }
}
