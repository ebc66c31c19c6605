//! USB device user events
//!
//! The callback contract ([`UsbUserEvents`]) lives in the platform crate so
//! the USB device core can depend on it without pulling in the handlers.

pub mod user_events;

pub use platform::usb::{UsbSpeed, UsbUserEvents};
pub use user_events::{marker_payload, NoopEvents, ResumeMarker};
