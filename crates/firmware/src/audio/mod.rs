//! Audio output
//!
//! - [`out`] - the audio-out interface state machine ([`AudioOut`])
//! - [`transfer`] - DMA transfer-complete signalling from interrupt context
//!
//! # Transfer-complete flow
//!
//! ```text
//! DMA ISR ── notify() ──► TransferCompleteSignal ──► AudioOut::service_transfer_complete
//!                                                        │
//!                                   device flag set? ────┴──► registered callback
//! ```

pub mod out;
pub mod transfer;

pub use out::{AudioCommand, AudioError, AudioOut, AudioState, TransferCompleteCallback};
pub use transfer::TransferCompleteSignal;
