//! USB device user-event callbacks
//!
//! The USB device core calls one [`UsbUserEvents`] implementation on bus
//! state changes. Every hook defaults to a no-op so an application only
//! overrides the events it cares about.

/// Bus speed negotiated at reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbSpeed {
    /// 480 Mbit/s
    High,
    /// 12 Mbit/s
    Full,
    /// 1.5 Mbit/s
    Low,
}

impl UsbSpeed {
    /// Map the device core's raw speed code (0 = high, 1 = full, 2 = low).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::High),
            1 => Some(Self::Full),
            2 => Some(Self::Low),
            _ => None,
        }
    }
}

/// User hooks invoked by the USB device core.
///
/// Hooks return `()`: a failure inside a hook must not disturb enumeration,
/// so implementations log and swallow their own errors.
pub trait UsbUserEvents {
    /// Device library initialised.
    fn init(&mut self) -> impl core::future::Future<Output = ()> {
        async {}
    }

    /// Bus reset completed at `speed`.
    fn device_reset(&mut self, speed: UsbSpeed) -> impl core::future::Future<Output = ()> {
        let _ = speed;
        async {}
    }

    /// Host selected a configuration.
    fn device_configured(&mut self) -> impl core::future::Future<Output = ()> {
        async {}
    }

    /// Bus suspended.
    fn device_suspended(&mut self) -> impl core::future::Future<Output = ()> {
        async {}
    }

    /// Bus resumed from suspend.
    fn device_resumed(&mut self) -> impl core::future::Future<Output = ()> {
        async {}
    }
}
