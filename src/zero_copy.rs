//! Memory-mapped transmission
//!
//! Maps the entity file once and serves every range straight out of the
//! page cache, avoiding a read syscall per buffer. Writes still go through
//! the buffered copy loop so deadlines and cancellation keep working.

use crate::error::Result;
use crate::transmission::{copy_buffered, TransmissionStrategy, TransmitSettings};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{self, Write};
use tracing::debug;

/// Transmission strategy backed by a read-only memory map
pub struct MmapTransmission {
    // Zero-length files cannot be mapped
    map: Option<Mmap>,
    settings: TransmitSettings,
}

impl MmapTransmission {
    /// Map `file` for reading
    ///
    /// The file must not be truncated while the map is alive; entity files
    /// are treated as immutable for the duration of a response.
    pub fn new(file: &File) -> Result<Self> {
        let size = file.metadata()?.len();
        let map = if size == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only and entities are not modified
            // while a response is being served.
            Some(unsafe { MmapOptions::new().map(file)? })
        };
        debug!("Mapped entity file: {} bytes", size);

        Ok(MmapTransmission {
            map,
            settings: TransmitSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: TransmitSettings) -> Self {
        self.settings = settings;
        self
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl TransmissionStrategy for MmapTransmission {
    fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    fn transmit_range(&mut self, out: &mut dyn Write, offset: u64, length: u64) -> Result<u64> {
        let data = self.bytes();
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= data.len() as u64)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "range offset={} length={} outside mapping of {} bytes",
                        offset,
                        length,
                        data.len()
                    ),
                )
            })?;

        debug!("Transmitting {} bytes from mmap at offset {}", length, offset);
        let mut slice = &data[offset as usize..end as usize];
        copy_buffered(
            &mut slice,
            out,
            length,
            self.settings.buffer_size,
            &self.settings.control,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_transmit_range() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Hello, mmap world!").unwrap();
        temp_file.flush().unwrap();

        let mut strategy = MmapTransmission::new(temp_file.as_file()).unwrap();
        assert_eq!(strategy.len(), 18);

        let mut out = Vec::new();
        strategy.transmit_range(&mut out, 7, 4).unwrap();
        assert_eq!(out, b"mmap");

        out.clear();
        strategy.transmit_all(&mut out).unwrap();
        assert_eq!(out, b"Hello, mmap world!");
    }

    #[test]
    fn test_mmap_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut strategy = MmapTransmission::new(temp_file.as_file()).unwrap();
        assert!(strategy.is_empty());

        let mut out = Vec::new();
        assert_eq!(strategy.transmit_all(&mut out).unwrap(), 0);
        assert!(strategy.transmit_range(&mut out, 0, 1).is_err());
    }
}
