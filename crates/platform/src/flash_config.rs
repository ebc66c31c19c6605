//! SPI DataFlash configuration.
//!
//! # Addressing
//!
//! DataFlash parts do not take a linear byte address on the wire. The 24-bit
//! address field carries a page number in its upper bits and a byte offset
//! within the page in its lower `page_address_shift` bits:
//!
//! ```text
//!  23                      shift            0
//! +--------------------------+----------------+
//! |        page number       |  byte offset   |
//! +--------------------------+----------------+
//! ```
//!
//! For the default 528-byte-page part (used with 512 data bytes per page) the
//! offset field is 10 bits wide, so page `p` starts at wire address `p << 10`.
//!
//! # Bus
//!
//! SPI mode 3 (clock idles high, capture on second edge), MSB first, 8-bit
//! frames, software chip select.

use crate::peripheral::{BitOrder, SpiConfig, SpiMode};

/// Data bytes per page; also the logical sector size used by sector I/O.
pub const PAGE_SIZE: usize = 512;

/// Largest value the 24-bit wire address field can hold.
const WIRE_ADDRESS_MASK: u32 = 0x00FF_FFFF;

/// DataFlash command opcodes.
pub mod opcode {
    /// Main memory page program through buffer 1 (`op, a2, a1, a0, data...`).
    pub const PAGE_PROGRAM: u8 = 0x82;
    /// Continuous array read (`op, a2, a1, a0, 4 dummy bytes, data...`).
    pub const CONTINUOUS_READ: u8 = 0xE8;
    /// Page erase (`op, a2, a1, a0`).
    pub const PAGE_ERASE: u8 = 0x81;
    /// Status register read; repeats the status byte while selected.
    pub const STATUS_READ: u8 = 0xD7;
    /// Manufacturer and device ID read (3 bytes).
    pub const READ_ID: u8 = 0x9F;

    /// Status register: device ready.
    pub const STATUS_READY: u8 = 0x80;
    /// Dummy bytes between the address and the first data byte of a continuous read.
    pub const READ_DUMMY_BYTES: usize = 4;
}

/// Error returned by [`DataFlashGeometry::new`] for an unusable layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GeometryError {
    /// The offset field cannot address every byte of a page.
    #[error("page offset field too narrow for 512-byte pages")]
    OffsetFieldTooNarrow,
    /// The highest page number does not fit the 24-bit wire address.
    #[error("page count does not fit the 24-bit address field")]
    TooManyPages,
    /// The device has no pages.
    #[error("page count is zero")]
    Empty,
}

/// Page layout of a DataFlash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataFlashGeometry {
    page_count: u32,
    page_address_shift: u8,
}

impl DataFlashGeometry {
    /// AT45DB321-class part: 8192 pages, 10-bit in-page offset field.
    pub const AT45DB321: Self = Self {
        page_count: 8192,
        page_address_shift: 10,
    };

    /// Validate a page layout.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] when the offset field is narrower than a
    /// page, the page number overflows 24 bits, or `page_count` is zero.
    pub fn new(page_count: u32, page_address_shift: u8) -> Result<Self, GeometryError> {
        if page_count == 0 {
            return Err(GeometryError::Empty);
        }
        if page_address_shift < 9 || page_address_shift > 23 {
            return Err(GeometryError::OffsetFieldTooNarrow);
        }
        let last_page = page_count.saturating_sub(1);
        if last_page > WIRE_ADDRESS_MASK >> page_address_shift {
            return Err(GeometryError::TooManyPages);
        }
        Ok(Self {
            page_count,
            page_address_shift,
        })
    }

    /// Number of pages on the device.
    pub const fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Width of the in-page offset field of the wire address.
    pub const fn page_address_shift(&self) -> u8 {
        self.page_address_shift
    }

    /// Usable capacity in bytes (`page_count * PAGE_SIZE`).
    pub fn capacity(&self) -> usize {
        (self.page_count as usize).saturating_mul(PAGE_SIZE)
    }

    /// Split a linear byte address into `(page, offset)`.
    ///
    /// Returns `None` when `address` lies beyond the device.
    #[allow(clippy::arithmetic_side_effects)] // PAGE_SIZE is a non-zero constant
    pub fn locate(&self, address: u32) -> Option<(u32, u16)> {
        let page_size = PAGE_SIZE as u32;
        let page = address / page_size;
        if page >= self.page_count {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)] // offset < PAGE_SIZE
        let offset = (address % page_size) as u16;
        Some((page, offset))
    }

    /// 24-bit wire address for a linear byte address.
    ///
    /// Returns `None` when `address` lies beyond the device.
    pub fn wire_address(&self, address: u32) -> Option<u32> {
        let (page, offset) = self.locate(address)?;
        Some((page << self.page_address_shift) | u32::from(offset))
    }

    /// Wire address of the first byte of `page`, or `None` beyond the device.
    pub fn page_wire_address(&self, page: u32) -> Option<u32> {
        (page < self.page_count).then(|| page << self.page_address_shift)
    }

    /// Inverse of [`wire_address`](Self::wire_address): linear address for a wire address.
    ///
    /// Returns `None` when the offset field exceeds the page or the page is
    /// beyond the device.
    #[allow(clippy::arithmetic_side_effects)] // bounds checked above each step
    pub fn linear_address(&self, wire: u32) -> Option<u32> {
        let wire = wire & WIRE_ADDRESS_MASK;
        let page = wire >> self.page_address_shift;
        let offset = wire & ((1u32 << self.page_address_shift) - 1);
        if page >= self.page_count || offset >= PAGE_SIZE as u32 {
            return None;
        }
        Some(page * PAGE_SIZE as u32 + offset)
    }
}

impl Default for DataFlashGeometry {
    fn default() -> Self {
        Self::AT45DB321
    }
}

/// SPI bus settings for the DataFlash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashSpiConfig {
    /// Bus clock, mode and bit order.
    pub spi: SpiConfig,
    /// Byte clocked out while reading (the device ignores MOSI then).
    pub dummy_byte: u8,
}

impl FlashSpiConfig {
    /// APB1 (36 MHz) / 4, mode 3, MSB first.
    pub const DEFAULT: Self = Self {
        spi: SpiConfig {
            frequency: 9_000_000,
            mode: SpiMode::Mode3,
            bit_order: BitOrder::MsbFirst,
        },
        dummy_byte: 0xA5,
    };
}

impl Default for FlashSpiConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
