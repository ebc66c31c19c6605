//! Application configuration and constants
//!
//! This module defines central configuration values used across the adapters.
//! Identity strings, geometry and file names should reference these constants
//! rather than hardcoding values.

/// Vendor identification reported in the SCSI INQUIRY response (8 bytes, space padded).
pub const INQUIRY_VENDOR: &[u8; 8] = b"STM     ";

/// Product identification reported in the SCSI INQUIRY response (16 bytes, space padded).
pub const INQUIRY_PRODUCT: &[u8; 16] = b"microSD Flash   ";

/// Product revision reported in the SCSI INQUIRY response (4 bytes).
pub const INQUIRY_REVISION: &[u8; 4] = b"1.00";

/// Logical block size exposed to the USB host, in bytes.
///
/// Fixed at 512: the SD driver reads and writes whole 512-byte sectors.
pub const BLOCK_SIZE: u32 = 512;

/// Number of logical units exposed by the mass-storage adapter.
pub const LUN_COUNT: u8 = 1;

/// Dummy byte clocked onto the SD SPI bus after a failed operation.
///
/// Eight extra clocks with MOSI high release a card left mid-response.
pub const BUS_RECOVERY_BYTE: u8 = 0xFF;

/// Path of the marker file written when the USB device resumes.
pub const RESUME_MARKER_PATH: &str = "0:/testusb.TXT";

/// Size of the marker file payload in bytes (text followed by zero padding).
pub const RESUME_MARKER_LEN: usize = 256;

/// Text placed at the start of the marker file payload.
pub const RESUME_MARKER_TEXT: &[u8] =
    b"Firmware Library Example: communication with an M25P64 SPI FLASHSTM32F10x SPI Firmware ";
