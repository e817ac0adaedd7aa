use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Byte source for the telegram parser.
///
/// Wraps a buffered async reader so the parser can look at the next byte
/// without taking it. A byte that was only peeked stays in the buffer for the
/// next state, which is how the data block hands its terminating byte to the
/// end-of-message parser.
pub struct TelegramReader<R> {
    inner: R,
}

impl<R: AsyncBufRead + Unpin> TelegramReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the next byte without consuming it, `None` at end of stream.
    pub async fn peek_byte(&mut self) -> std::io::Result<Option<u8>> {
        let buf = self.inner.fill_buf().await?;
        Ok(buf.first().copied())
    }

    /// Consumes and returns the next byte, `None` at end of stream.
    pub async fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let b = self.peek_byte().await?;
        if b.is_some() {
            self.inner.consume(1);
        }
        Ok(b)
    }

    /// Drops a byte previously returned by `peek_byte`.
    pub fn consume_peeked(&mut self) {
        self.inner.consume(1);
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
