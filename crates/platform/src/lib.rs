//! Hardware Abstraction Layer (HAL) for the STM32 storage and audio adapters
//!
//! This crate provides trait-based abstractions for every collaborator the
//! firmware adapters talk to, enabling development and testing without
//! physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! USB MSC class / audio framework (middleware)
//!         ↓
//! Adapters (firmware crate: SD mass storage, DataFlash, audio out, USB events)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Vendor drivers (SD over SPI, codec playback layer, FatFs)
//! ```
//!
//! # Abstraction Levels
//!
//! ## High-Level Collaborators
//! - [`MassStorage`] - Block storage contract consumed by the MSC class layer
//! - [`SdCard`] - SD-card block driver
//! - [`AudioOutputDevice`] - Low-level audio playback layer
//! - [`UsbUserEvents`] - USB device user-event callbacks
//! - [`FileStore`] - File creation on a mounted volume
//!
//! ## Configuration
//! - [`config`] - Identity strings and fixed constants
//! - [`flash_config`] - DataFlash geometry and SPI bus settings
//! - [`audio_config`] - Audio-out sample-rate policy
//!
//! # Features
//!
//! - `std`: Enable standard library support (mocks, simulators, local files)
//! - `defmt`: Enable defmt logging derives
//!
//! # Example
//!
//! ```no_run
//! use platform::{MassStorage, MscError};
//!
//! async fn example<S: MassStorage>(storage: &mut S) -> Result<u32, MscError> {
//!     let capacity = storage.capacity(0).await?;
//!     Ok(capacity.block_count)
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod audio;
pub mod audio_config;
pub mod audio_types;
pub mod config;
pub mod flash_config;
pub mod peripheral;
pub mod storage;
pub mod usb;

#[cfg(any(test, feature = "std"))]
pub mod mocks;
#[cfg(any(test, feature = "std"))]
pub mod storage_local;

// Re-export main high-level traits
pub use audio::{AudioOutputDevice, PauseResume, PowerDown};
pub use storage::{
    Capacity, CardPresence, FileStore, MassStorage, MscError, SdCard, WriteMode,
    INQUIRY_DATA_LEN,
};
pub use usb::{UsbSpeed, UsbUserEvents};

// Re-export configuration types
pub use audio_config::AudioOutConfig;
pub use flash_config::{DataFlashGeometry, FlashSpiConfig};

// Re-export peripheral types
pub use peripheral::{BitOrder, SpiConfig, SpiMode};
