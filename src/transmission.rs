//! Body transmission strategies
//!
//! An [`EntityResponse`](crate::EntityResponse) never touches entity storage
//! directly; it asks a [`TransmissionStrategy`] to copy either the whole
//! entity or a sub-range into the response writer. Every strategy funnels
//! through [`copy_buffered`], a fixed-size read/write loop that checks a
//! [`TransmitControl`] deadline and cancel flag between chunks.

use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Copy-loop buffer size used when no configuration is supplied
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Copies entity bytes into a response body
pub trait TransmissionStrategy {
    /// Total number of bytes this strategy can transmit
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the whole entity
    fn transmit_all(&mut self, out: &mut dyn Write) -> Result<u64> {
        let len = self.len();
        self.transmit_range(out, 0, len)
    }

    /// Copy `length` bytes starting at `offset`
    fn transmit_range(&mut self, out: &mut dyn Write, offset: u64, length: u64) -> Result<u64>;

    /// Signal the end of one transmission (one part of a multipart body)
    fn complete(&mut self, out: &mut dyn Write) -> Result<()> {
        out.flush()?;
        Ok(())
    }
}

/// Deadline and cancellation for one body transmission
#[derive(Debug, Clone, Default)]
pub struct TransmitControl {
    deadline: Option<Instant>,
    cancelled: Option<Arc<AtomicBool>>,
}

impl TransmitControl {
    /// No deadline, no cancellation
    pub fn unbounded() -> Self {
        TransmitControl::default()
    }

    /// Deadline `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        TransmitControl {
            deadline: Some(deadline),
            cancelled: None,
        }
    }

    /// Abort the transmission once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the transmission was cancelled or ran past its deadline
    pub fn check(&self) -> Result<()> {
        if let Some(flag) = &self.cancelled {
            if flag.load(Ordering::Acquire) {
                return Err(DeliveryError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(DeliveryError::Timeout(format!(
                    "deadline passed {:?} ago",
                    now - deadline
                )));
            }
        }
        Ok(())
    }
}

/// Buffer size and control shared by every strategy
#[derive(Debug, Clone)]
pub struct TransmitSettings {
    pub buffer_size: usize,
    pub control: TransmitControl,
}

impl Default for TransmitSettings {
    fn default() -> Self {
        TransmitSettings {
            buffer_size: DEFAULT_BUFFER_SIZE,
            control: TransmitControl::unbounded(),
        }
    }
}

impl TransmitSettings {
    /// Settings for one response; the configured timeout starts now
    pub fn from_config(config: &DeliveryConfig) -> Self {
        let control = match config.transmit_timeout() {
            Some(timeout) => TransmitControl::with_timeout(timeout),
            None => TransmitControl::unbounded(),
        };
        TransmitSettings {
            buffer_size: config.buffer_size,
            control,
        }
    }

    pub fn with_control(mut self, control: TransmitControl) -> Self {
        self.control = control;
        self
    }
}

/// Copy exactly `length` bytes from `reader` to `writer`
///
/// Reads at most `buffer_size` bytes at a time, writes them, and repeats
/// until nothing remains. Running out of input early is an error.
pub fn copy_buffered<R, W>(
    reader: &mut R,
    writer: &mut W,
    length: u64,
    buffer_size: usize,
    control: &TransmitControl,
) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut remaining = length;

    while remaining > 0 {
        if let Err(e) = control.check() {
            warn!(
                "Transmission stopped with {} of {} bytes remaining: {}",
                remaining, length, e
            );
            return Err(e);
        }

        let want = remaining.min(buffer.len() as u64) as usize;
        let read = reader.read(&mut buffer[..want])?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended with {} of {} bytes remaining", remaining, length),
            )
            .into());
        }
        writer.write_all(&buffer[..read])?;
        remaining -= read as u64;
    }

    Ok(length)
}

fn check_bounds(offset: u64, length: u64, total: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "range offset={} length={} outside entity of {} bytes",
                offset, length, total
            ),
        )
        .into()),
    }
}

/// Transmits an in-memory entity
pub struct BytesTransmission {
    data: Bytes,
    settings: TransmitSettings,
}

impl BytesTransmission {
    pub fn new(data: impl Into<Bytes>) -> Self {
        BytesTransmission {
            data: data.into(),
            settings: TransmitSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: TransmitSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl TransmissionStrategy for BytesTransmission {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn transmit_range(&mut self, out: &mut dyn Write, offset: u64, length: u64) -> Result<u64> {
        check_bounds(offset, length, self.len())?;
        debug!("Transmitting {} bytes from memory at offset {}", length, offset);

        let start = offset as usize;
        let mut slice = &self.data[start..start + length as usize];
        copy_buffered(
            &mut slice,
            out,
            length,
            self.settings.buffer_size,
            &self.settings.control,
        )
    }
}

/// Transmits from any seekable reader
///
/// The reader is positioned with an absolute seek before every transmission,
/// so ranges may be requested in any order.
pub struct StreamTransmission<R> {
    reader: R,
    length: u64,
    settings: TransmitSettings,
}

impl<R: Read + Seek> StreamTransmission<R> {
    /// Wrap a reader, measuring its length by seeking to the end
    pub fn new(mut reader: R) -> Result<Self> {
        let length = reader.seek(SeekFrom::End(0))?;
        Ok(StreamTransmission {
            reader,
            length,
            settings: TransmitSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: TransmitSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> TransmissionStrategy for StreamTransmission<R> {
    fn len(&self) -> u64 {
        self.length
    }

    fn transmit_range(&mut self, out: &mut dyn Write, offset: u64, length: u64) -> Result<u64> {
        check_bounds(offset, length, self.length)?;
        debug!("Transmitting {} bytes from stream at offset {}", length, offset);

        self.reader.seek(SeekFrom::Start(offset))?;
        copy_buffered(
            &mut self.reader,
            out,
            length,
            self.settings.buffer_size,
            &self.settings.control,
        )
    }
}

/// File-backed transmission
pub type FileTransmission = StreamTransmission<File>;

impl StreamTransmission<File> {
    /// Open `path` through `opener` and wrap it for transmission
    pub fn open(path: &Path, opener: &dyn FileOpener) -> Result<Self> {
        let file = opener.open(path)?;
        Self::new(file)
    }
}

/// Opens entity files
///
/// Implementations may retry transient failures; the delivery core only
/// looks at the final outcome.
pub trait FileOpener {
    fn open(&self, path: &Path) -> io::Result<File>;
}

/// Opens files read-only, retrying transient failures with a fixed delay
#[derive(Debug, Clone)]
pub struct RetryingOpener {
    /// Total attempts, including the first
    pub attempts: usize,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryingOpener {
    pub fn new(attempts: usize, delay: Duration) -> Self {
        RetryingOpener { attempts, delay }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.file_open_retries, config.file_open_retry_delay())
    }

    // Lock and sharing conflicts surface as these kinds; missing files do not
    // get better by waiting.
    fn is_transient(error: &io::Error) -> bool {
        matches!(
            error.kind(),
            io::ErrorKind::PermissionDenied
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::Interrupted
        )
    }
}

impl Default for RetryingOpener {
    fn default() -> Self {
        RetryingOpener::from_config(&DeliveryConfig::default())
    }
}

impl FileOpener for RetryingOpener {
    fn open(&self, path: &Path) -> io::Result<File> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match File::open(path) {
                Ok(file) => return Ok(file),
                Err(e) if attempt < attempts && Self::is_transient(&e) => {
                    debug!(
                        "Open of {} failed (attempt {}/{}): {}, retrying in {:?}",
                        path.display(),
                        attempt,
                        attempts,
                        e,
                        self.delay
                    );
                    thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path.display(), e);
                    return Err(e);
                }
            }
        }
    }
}

/// Where an entity's bytes live, for callers choosing a strategy
#[derive(Debug, Clone)]
pub enum EntitySource {
    Memory(Bytes),
    File(PathBuf),
}

impl EntitySource {
    /// Build the strategy that fits this source under `config`
    ///
    /// Files at or above `mmap_threshold` are memory-mapped; smaller files are
    /// read through the buffered loop.
    pub fn into_strategy(
        self,
        config: &DeliveryConfig,
        opener: &dyn FileOpener,
    ) -> Result<Box<dyn TransmissionStrategy>> {
        let settings = TransmitSettings::from_config(config);
        match self {
            EntitySource::Memory(data) => {
                Ok(Box::new(BytesTransmission::new(data).with_settings(settings)))
            }
            EntitySource::File(path) => {
                let file = opener.open(&path)?;
                let size = file.metadata()?.len();
                if size > 0 && size >= config.mmap_threshold {
                    debug!("Using mmap transmission for {} ({} bytes)", path.display(), size);
                    let strategy = crate::zero_copy::MmapTransmission::new(&file)?;
                    Ok(Box::new(strategy.with_settings(settings)))
                } else {
                    Ok(Box::new(StreamTransmission::new(file)?.with_settings(settings)))
                }
            }
        }
    }
}
