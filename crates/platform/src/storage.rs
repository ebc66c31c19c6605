//! Storage abstractions: block devices and file creation
//!
//! Three seams live here:
//! - [`SdCard`]: the vendor SD-card block driver the adapters forward to.
//! - [`MassStorage`]: the per-LUN contract a USB Mass Storage class layer
//!   consumes (capacity, readiness, block read/write, inquiry data).
//! - [`FileStore`]: whole-file creation on a mounted volume (FatFs on target,
//!   `std::fs` on the host).

use crate::config::BLOCK_SIZE;

/// Length of the SCSI standard INQUIRY response, in bytes.
pub const INQUIRY_DATA_LEN: usize = 36;

/// Result of polling the card-detect line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardPresence {
    /// A card is seated in the slot.
    Present,
    /// The slot is empty.
    NotPresent,
}

/// SD-card block driver (SPI mode).
///
/// Sector size is fixed at 512 bytes. `count` arguments are in sectors and
/// buffers must hold at least `count * 512` bytes.
pub trait SdCard {
    /// Error type
    type Error: core::fmt::Debug;

    /// Run the card power-up and identification sequence.
    fn initialize(&mut self) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Poll the card-detect line.
    fn detect(&mut self) -> impl core::future::Future<Output = CardPresence>;

    /// Number of 512-byte sectors on the card, read live from the card.
    fn sector_count(&mut self) -> impl core::future::Future<Output = u32>;

    /// Read `count` sectors starting at `sector` into `buf`.
    fn read_disk(
        &mut self,
        buf: &mut [u8],
        sector: u32,
        count: u16,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Write `count` sectors starting at `sector` from `buf`.
    fn write_disk(
        &mut self,
        buf: &[u8],
        sector: u32,
        count: u16,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Clock one byte on the card's SPI bus and return the byte received.
    fn exchange_byte(
        &mut self,
        byte: u8,
    ) -> impl core::future::Future<Output = Result<u8, Self::Error>>;
}

/// Medium geometry reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacity {
    /// Bytes per logical block (always [`BLOCK_SIZE`] for SD media).
    pub block_size: u32,
    /// Number of logical blocks on the medium.
    pub block_count: u32,
}

impl Capacity {
    /// Geometry of an SD medium with `block_count` 512-byte blocks.
    pub const fn sd(block_count: u32) -> Self {
        Self {
            block_size: BLOCK_SIZE,
            block_count,
        }
    }

    /// Logical block address of the last block, or `None` for an empty medium.
    pub fn last_lba(&self) -> Option<u32> {
        self.block_count.checked_sub(1)
    }
}

/// Errors a [`MassStorage`] implementation reports to the class layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MscError {
    /// The medium is physically absent (or failed to come back after removal).
    #[error("medium not present")]
    MediumNotPresent,
    /// The underlying driver failed a block read.
    #[error("read fault")]
    ReadFault,
    /// The underlying driver failed a block write.
    #[error("write fault")]
    WriteFault,
    /// The data buffer is shorter than `block_count * block_size`.
    #[error("buffer shorter than the requested block range")]
    InvalidBuffer,
}

impl MscError {
    /// Host status code for the MSC class layer: `-1` absence, `5` I/O failure.
    pub const fn status_code(self) -> i8 {
        match self {
            Self::MediumNotPresent => -1,
            Self::ReadFault | Self::WriteFault | Self::InvalidBuffer => 5,
        }
    }
}

/// Collapse an operation result into the class layer's integer status (`0` on success).
pub fn status_code<T>(result: &Result<T, MscError>) -> i8 {
    match result {
        Ok(_) => 0,
        Err(e) => e.status_code(),
    }
}

/// Per-LUN block storage contract consumed by a USB Mass Storage class layer.
///
/// Implementations are registered with the class layer once at startup and
/// called for every host request addressed to a LUN in `0..=max_lun()`.
pub trait MassStorage {
    /// Prepare the medium. Called once when the class layer starts.
    fn init(&mut self, lun: u8) -> impl core::future::Future<Output = Result<(), MscError>>;

    /// Block size and block count of the medium.
    fn capacity(
        &mut self,
        lun: u8,
    ) -> impl core::future::Future<Output = Result<Capacity, MscError>>;

    /// Whether the medium can accept commands now.
    fn is_ready(&mut self, lun: u8) -> impl core::future::Future<Output = Result<(), MscError>>;

    /// Whether the medium rejects writes.
    fn is_write_protected(&self, lun: u8) -> bool;

    /// Read `block_count` blocks starting at `start_block` into `buf`.
    fn read(
        &mut self,
        lun: u8,
        buf: &mut [u8],
        start_block: u32,
        block_count: u16,
    ) -> impl core::future::Future<Output = Result<(), MscError>>;

    /// Write `block_count` blocks starting at `start_block` from `buf`.
    fn write(
        &mut self,
        lun: u8,
        buf: &[u8],
        start_block: u32,
        block_count: u16,
    ) -> impl core::future::Future<Output = Result<(), MscError>>;

    /// Highest valid LUN index (number of LUNs minus one).
    fn max_lun(&self) -> u8;

    /// Standard INQUIRY response for `lun`, returned verbatim to the host.
    fn inquiry_data(&self, lun: u8) -> &[u8; INQUIRY_DATA_LEN];
}

/// How [`FileStore::write_file`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteMode {
    /// Create the file, truncating it if it already exists.
    CreateAlways,
    /// Create the file, failing if it already exists.
    CreateNew,
}

/// Whole-file writer on a mounted volume.
pub trait FileStore {
    /// Error type
    type Error: core::fmt::Debug;

    /// Create `path` according to `mode`, write `data`, close it.
    ///
    /// Returns the number of bytes written.
    fn write_file(
        &mut self,
        path: &str,
        data: &[u8],
        mode: WriteMode,
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;
}
