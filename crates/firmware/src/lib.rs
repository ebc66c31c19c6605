//! STM32 storage and audio adapters
//!
//! Glue between vendor middleware and board drivers for an STM32F10x-class
//! board: USB mass storage on an SD card, a raw SPI DataFlash driver, the
//! audio-out interface state machine and the USB user-event callbacks.
//!
//! # Architecture
//!
//! This firmware follows a layered architecture:
//!
//! ```text
//! USB MSC class / audio framework / USB device core
//!         ↓
//! Adapters (this crate: storage, flash, audio, usb)
//!         ↓
//! Platform HAL (platform crate - trait abstractions)
//!         ↓
//! Vendor drivers (SD over SPI, playback layer, FatFs, SPI peripheral)
//! ```
//!
//! # Features
//!
//! - `defmt` - Log through defmt (hardware builds)
//! - `std` - Enable standard library (host tools and testing)
//!
//! # Example
//!
//! ```no_run
//! use firmware::storage::{ScsiHandler, SdMassStorage};
//! use platform::mocks::MockSdCard;
//!
//! # async fn example() {
//! let mut scsi = ScsiHandler::new(SdMassStorage::new(MockSdCard::new(1024)));
//! let mut response = [0u8; 36];
//! let outcome = scsi.execute(0, &[0x12, 0, 0, 0, 36, 0], &mut response).await;
//! # let _ = outcome;
//! # }
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::unused_async)]
#![allow(async_fn_in_trait)] // single-threaded executor, Send bounds not needed

pub mod audio;
pub mod flash;
pub mod storage;
pub mod usb;

// Re-export key types
pub use audio::{AudioCommand, AudioError, AudioOut, AudioState, TransferCompleteSignal};
pub use flash::{DataFlash, FlashError};
pub use storage::{BusRecoveryPolicy, CommandStatus, ScsiHandler, SdMassStorage};
pub use usb::{NoopEvents, ResumeMarker};
