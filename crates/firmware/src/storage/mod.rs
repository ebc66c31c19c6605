//! USB mass storage
//!
//! - [`sd_msc`] - the SD-card-backed LUN ([`SdMassStorage`])
//! - [`scsi`] - the SCSI command front end that drives a [`MassStorage`]
//!   implementation the way the USB MSC class layer does
//!
//! [`MassStorage`]: platform::MassStorage

pub mod scsi;
pub mod sd_msc;

pub use scsi::{CommandStatus, Outcome, ScsiHandler, Sense, SenseKey};
pub use sd_msc::{standard_inquiry, BusRecoveryPolicy, SdMassStorage, SD_INQUIRY_DATA};
