//! Sensor transport.
//!
//! The sensor writes one JSON record per line. [`LineSource`] splits any
//! async byte stream into lines with a bounded per-read timeout, so the
//! monitor loop never blocks indefinitely on a quiet sensor, and a
//! bounded line length, so a line that never terminates cannot grow
//! without limit. [`open_sensor`] opens the production transports: a
//! serial port at a configured baud rate, a replay file, or a TCP
//! serial bridge.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// Timeout for establishing a TCP bridge connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest accepted line, in bytes. Sensor records are a few hundred.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

const TCP_SCHEME: &str = "tcp://";
const FILE_SCHEME: &str = "file://";

/// Result of one successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRead {
    /// One line, without its terminator.
    Line(String),
    /// No complete line arrived within the read timeout.
    Idle,
    /// End of stream. No further lines will arrive.
    Closed,
}

/// I/O failure while reading a record.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Sensor sent invalid UTF-8: {0}")]
    InvalidUtf8(#[source] io::Error),

    #[error("Sensor line exceeded {max} bytes and was discarded")]
    LineTooLong { max: usize },

    #[error("Sensor read failed: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::InvalidData {
            Self::InvalidUtf8(e)
        } else {
            Self::Io(e)
        }
    }
}

/// The sensor transport could not be acquired at startup.
#[derive(Debug, thiserror::Error)]
pub enum SourceOpenError {
    #[error("Failed to open sensor at {address}: {source}")]
    Open {
        address: SensorAddress,
        #[source]
        source: io::Error,
    },

    #[error("Timed out connecting to sensor bridge at {address} after {}s", .timeout.as_secs())]
    ConnectTimedOut {
        address: SensorAddress,
        timeout: Duration,
    },
}

/// A source of raw sensor lines.
pub trait SampleSource: Send {
    /// Read the next line, waiting at most the source's read timeout.
    fn next_line(&mut self) -> impl Future<Output = Result<SourceRead, TransportError>> + Send;

    /// Release the transport. Reads after this report [`SourceRead::Closed`].
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Where the sensor is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorAddress {
    /// Serial port: a device node such as `/dev/ttyUSB0`, or `COM3`.
    Serial(PathBuf),
    /// Recorded sensor output, read once to the end.
    File(PathBuf),
    /// `host:port` of a serial-over-TCP bridge.
    Tcp(String),
}

impl SensorAddress {
    /// `tcp://host:port` selects a bridge, `file://path` a replay file,
    /// anything else is a serial port. Returns `None` for an empty path
    /// or a bridge address without a port.
    pub fn parse(address: &str) -> Option<Self> {
        let address = address.trim();
        if let Some(host_port) = address.strip_prefix(TCP_SCHEME) {
            return match host_port.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Some(Self::Tcp(host_port.to_string()))
                }
                _ => None,
            };
        }
        match address.strip_prefix(FILE_SCHEME) {
            Some("") => None,
            Some(path) => Some(Self::File(PathBuf::from(path))),
            None if address.is_empty() => None,
            None => Some(Self::Serial(PathBuf::from(address))),
        }
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(path) => write!(f, "{}", path.display()),
            Self::File(path) => write!(f, "{FILE_SCHEME}{}", path.display()),
            Self::Tcp(host_port) => write!(f, "{TCP_SCHEME}{host_port}"),
        }
    }
}

/// Line reader over an async byte stream.
pub struct LineSource<R> {
    lines: Option<FramedRead<R, LinesCodec>>,
    read_timeout: Duration,
    name: String,
    /// The last read returned a decode error. The framed reader then
    /// yields one `None` before it resumes reading.
    resuming: bool,
}

/// The transport returned by [`open_sensor`].
pub type SensorSource = LineSource<Box<dyn AsyncRead + Unpin + Send>>;

impl<R> LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, read_timeout: Duration, name: impl Into<String>) -> Self {
        Self::with_max_line_length(reader, read_timeout, DEFAULT_MAX_LINE_LENGTH, name)
    }

    /// Lines longer than `max_line_length` bytes are dropped and reported
    /// as [`TransportError::LineTooLong`]. Reading resumes at the next line.
    pub fn with_max_line_length(
        reader: R,
        read_timeout: Duration,
        max_line_length: usize,
        name: impl Into<String>,
    ) -> Self {
        Self {
            lines: Some(FramedRead::new(
                reader,
                LinesCodec::new_with_max_length(max_line_length),
            )),
            read_timeout,
            name: name.into(),
            resuming: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.lines.is_none()
    }
}

impl<R> fmt::Debug for LineSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSource")
            .field("name", &self.name)
            .field("read_timeout", &self.read_timeout)
            .field("closed", &self.lines.is_none())
            .finish()
    }
}

impl<R> SampleSource for LineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_line(&mut self) -> Result<SourceRead, TransportError> {
        let Some(lines) = self.lines.as_mut() else {
            return Ok(SourceRead::Closed);
        };

        // The framed reader keeps a partial line buffered across a timeout.
        let deadline = tokio::time::Instant::now() + self.read_timeout;
        loop {
            match tokio::time::timeout_at(deadline, lines.next()).await {
                Err(_) => return Ok(SourceRead::Idle),
                Ok(Some(Ok(line))) => {
                    self.resuming = false;
                    return Ok(SourceRead::Line(line));
                }
                Ok(Some(Err(e))) => {
                    self.resuming = true;
                    return Err(match e {
                        LinesCodecError::MaxLineLengthExceeded => TransportError::LineTooLong {
                            max: lines.decoder().max_length(),
                        },
                        LinesCodecError::Io(e) => e.into(),
                    });
                }
                Ok(None) if self.resuming => self.resuming = false,
                Ok(None) => return Ok(SourceRead::Closed),
            }
        }
    }

    async fn close(&mut self) {
        if self.lines.take().is_some() {
            tracing::info!(sensor = %self.name, "Sensor transport released");
        }
    }
}

/// Open the sensor transport and wait `settle` before the first read.
///
/// Serial ports are opened at `baud_rate`, 8 data bits, no parity, one
/// stop bit, in raw mode. The baud rate is ignored for other transports.
pub async fn open_sensor(
    address: &SensorAddress,
    baud_rate: u32,
    read_timeout: Duration,
    settle: Duration,
) -> Result<SensorSource, SourceOpenError> {
    let open_failed = |source: io::Error| SourceOpenError::Open {
        address: address.clone(),
        source,
    };

    let stream: Box<dyn AsyncRead + Unpin + Send> = match address {
        SensorAddress::Serial(path) => {
            let port = tokio_serial::new(path.to_string_lossy(), baud_rate)
                .timeout(read_timeout)
                .open_native_async()
                .map_err(|e| open_failed(e.into()))?;
            Box::new(port)
        }
        SensorAddress::File(path) => {
            let file = tokio::fs::File::open(path).await.map_err(open_failed)?;
            Box::new(file)
        }
        SensorAddress::Tcp(host_port) => {
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(host_port.as_str()))
                .await
                .map_err(|_| SourceOpenError::ConnectTimedOut {
                    address: address.clone(),
                    timeout: CONNECT_TIMEOUT,
                })?
                .map_err(open_failed)?;
            Box::new(stream)
        }
    };

    tracing::info!(
        sensor = %address,
        baud_rate,
        settle_ms = settle.as_millis() as u64,
        "Sensor transport opened",
    );

    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }

    Ok(LineSource::new(stream, read_timeout, address.to_string()))
}
