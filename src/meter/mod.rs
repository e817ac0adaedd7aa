use chrono::Utc;
use log::{debug, error, info, warn};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::cache::{MeasurementRepo, RepoError};
use crate::config::MeterConfig;
use crate::metering_62056::parser::read_telegram;
use crate::metering_62056::{write_request, Iec62056ParseError, TelegramParser};
use crate::models::Measurement;

#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Timeout reading from meter after {0:?}")]
    Timeout(Duration),
    #[error("Telegram error: {0}")]
    Parse(#[from] Iec62056ParseError),
    #[error("Meter link error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storing measurement failed: {0}")]
    Repo(#[from] RepoError),
}

/// Something that can hand out a fresh byte stream to the meter.
///
/// Every read attempt opens its own stream and drops it afterwards, dropping
/// must release the underlying port.
pub trait MeterLink: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn open(&self) -> impl Future<Output = std::io::Result<Self::Stream>> + Send;
}

/// Optical probe or RS485 adapter on a local serial port, 7E1.
pub struct SerialLink {
    pub port_name: String,
    pub baud_rate: u32,
}

impl SerialLink {
    pub fn new(port_name: &str, baud_rate: u32) -> Self {
        SerialLink { port_name: port_name.to_string(), baud_rate }
    }
}

impl MeterLink for SerialLink {
    type Stream = SerialStream;

    fn open(&self) -> impl Future<Output = std::io::Result<SerialStream>> + Send {
        async move {
            debug!("Opening {} at {} baud", self.port_name, self.baud_rate);
            let port = tokio_serial::new(&self.port_name, self.baud_rate)
                .data_bits(DataBits::Seven)
                .parity(Parity::Even)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .open_native_async()?;
            Ok(port)
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Empty for the broadcast request
    pub device_address: String,
    pub timeout: Duration,
    /// Additional attempts after the first one
    pub retries: u32,
    /// Pause between opening the link and sending the request
    pub settle_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            device_address: String::new(),
            timeout: Duration::from_secs(60),
            retries: 1,
            settle_delay: Duration::from_millis(500),
        }
    }
}

impl From<&MeterConfig> for SessionSettings {
    fn from(c: &MeterConfig) -> Self {
        SessionSettings {
            device_address: c.device_address.clone(),
            timeout: c.timeout(),
            retries: c.retries,
            settle_delay: c.settle_delay(),
        }
    }
}

/// Request/response readout of one meter.
pub struct MeterSession<L> {
    link: Mutex<L>,
    settings: SessionSettings,
}

impl<L: MeterLink> MeterSession<L> {
    pub fn new(link: L, settings: SessionSettings) -> Self {
        MeterSession { link: Mutex::new(link), settings }
    }

    /// Reads one measurement and stores it in `repo`.
    ///
    /// The link stays locked for the whole call, retries included, so two
    /// callers never talk to the meter at the same time.
    pub async fn read_measurement(&self, repo: &dyn MeasurementRepo) -> Result<Measurement, MeterError> {
        let link = self.link.lock().await;
        let attempts = self.settings.retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.read_once(&*link, repo).await {
                Ok(m) => return Ok(m),
                Err(e) if attempt < attempts => {
                    warn!("Meter read attempt {attempt}/{attempts} failed: {e}, retrying");
                }
                Err(e) => {
                    error!("Meter read failed after {attempt} attempt(s): {e}");
                    return Err(e);
                }
            }
        }
    }

    async fn read_once(&self, link: &L, repo: &dyn MeasurementRepo) -> Result<Measurement, MeterError> {
        let mut stream = link.open().await?;
        tokio::time::sleep(self.settings.settle_delay).await;

        write_request(&mut stream, &self.settings.device_address).await?;

        let started = Utc::now();
        let mut parser = TelegramParser::new(BufReader::new(&mut stream));
        let (id, data) = match tokio::time::timeout(self.settings.timeout, read_telegram(&mut parser)).await {
            Ok(telegram) => telegram?,
            Err(_) => {
                warn!("No complete telegram within {:?}", self.settings.timeout);
                return Err(MeterError::Timeout(self.settings.timeout));
            }
        };
        drop(parser);
        drop(stream);

        debug!("Meter {} offers {} baud", id, id.baud_id.baud_rate());
        if !data.checksum_matches() {
            warn!("Telegram checksum {:02X} does not match trailer {:02X}, keeping it anyway", data.bcc, data.trailing_bcc);
        }

        let m = Measurement::from_telegram(started, id, data);
        repo.put(&m)?;
        info!("Stored measurement of {}{} with {} readings", m.manufacturer_id, m.identification, m.readings.len());
        Ok(m)
    }
}
