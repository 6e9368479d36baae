use std::collections::VecDeque;
use std::io::{self, Read};
use std::time::Duration;

use tracing::{debug, info};

use crate::core::Sample;
use crate::error::{FeedError, FeedResult};
use crate::source::codec::{LineFramer, MAX_LINE_LEN, parse_line};
use crate::source::{SourceAdapter, SourceHandle, TransportKind};

const READ_CHUNK: usize = 1024;

/// Opens the byte stream behind a serial adapter.
///
/// Receives the per-read timeout the port should be configured with.
pub type SerialOpener = Box<dyn FnMut(Duration) -> io::Result<Box<dyn Read + Send>> + Send>;

/// Newline-framed serial line reader.
pub struct SerialAdapter {
    id: String,
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
    opener: SerialOpener,
    reader: Option<Box<dyn Read + Send>>,
    framer: LineFramer,
    pending_errors: VecDeque<FeedError>,
}

impl SerialAdapter {
    /// Builds an adapter around a custom opener, e.g. a pseudo terminal or
    /// an in-memory stream in tests.
    pub fn with_opener(id: &str, port: &str, baud_rate: u32, opener: SerialOpener) -> Self {
        Self {
            id: id.to_owned(),
            port: port.to_owned(),
            baud_rate,
            read_timeout: Duration::from_millis(100),
            opener,
            reader: None,
            framer: LineFramer::new(MAX_LINE_LEN),
            pending_errors: VecDeque::new(),
        }
    }

    /// Opens a real port through the `serialport` crate.
    #[cfg(feature = "serial")]
    pub fn open_port(id: &str, port: &str, baud_rate: u32, read_timeout: Duration) -> Self {
        let path = port.to_owned();
        let opener: SerialOpener = Box::new(move |timeout| {
            let port = serialport::new(path.as_str(), baud_rate)
                .timeout(timeout)
                .open()
                .map_err(io::Error::from)?;
            Ok(Box::new(PortReader(port)) as Box<dyn Read + Send>)
        });
        Self::with_opener(id, port, baud_rate, opener).with_read_timeout(read_timeout)
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    #[must_use]
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn lost(&mut self, reason: impl Into<String>) -> FeedError {
        self.reader = None;
        self.framer.reset();
        FeedError::connection(&self.id, reason)
    }

    fn decode_chunk(&mut self, bytes: &[u8]) -> FeedResult<Vec<Sample>> {
        let mut samples = Vec::new();
        for line in self.framer.push(bytes) {
            match line.and_then(|line| parse_line(&line)) {
                Ok(parsed) => samples.extend(parsed),
                Err(err) => self.pending_errors.push_back(err),
            }
        }
        if samples.is_empty() {
            if let Some(err) = self.pending_errors.pop_front() {
                return Err(err);
            }
        }
        Ok(samples)
    }
}

impl SourceAdapter for SerialAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn connect(&mut self) -> FeedResult<SourceHandle> {
        if self.reader.is_none() {
            let reader = (self.opener)(self.read_timeout).map_err(|e| {
                FeedError::connection(&self.id, format!("failed to open {}: {e}", self.port))
            })?;
            self.reader = Some(reader);
            self.framer.reset();
            self.pending_errors.clear();
            info!(
                source = %self.id,
                port = %self.port,
                baud_rate = self.baud_rate,
                "serial port opened"
            );
        }
        Ok(SourceHandle {
            source_id: self.id.clone(),
            kind: TransportKind::Serial,
            endpoint: format!("{}@{}", self.port, self.baud_rate),
        })
    }

    /// Reads one chunk; malformed lines queue up and are reported one per call.
    fn read(&mut self, _timeout: Duration) -> FeedResult<Vec<Sample>> {
        if let Some(err) = self.pending_errors.pop_front() {
            return Err(err);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(FeedError::connection(&self.id, "port is not open"));
        };

        let mut chunk = [0_u8; READ_CHUNK];
        match reader.read(&mut chunk) {
            Ok(0) => Err(self.lost("port closed")),
            Ok(read) => self.decode_chunk(&chunk[..read]),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Vec::new())
            }
            Err(err) => Err(self.lost(format!("read failed: {err}"))),
        }
    }

    fn disconnect(&mut self) {
        if self.reader.take().is_some() {
            debug!(source = %self.id, port = %self.port, "serial port closed");
        }
        self.framer.reset();
        self.pending_errors.clear();
    }

    fn is_connected(&self) -> bool {
        self.reader.is_some()
    }
}

#[cfg(feature = "serial")]
struct PortReader(Box<dyn serialport::SerialPort>);

#[cfg(feature = "serial")]
impl Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}
