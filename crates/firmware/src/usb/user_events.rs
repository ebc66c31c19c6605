//! USB device user-event handlers.

use platform::config::{RESUME_MARKER_LEN, RESUME_MARKER_PATH, RESUME_MARKER_TEXT};
use platform::storage::{FileStore, WriteMode};
use platform::usb::UsbUserEvents;

/// Handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl UsbUserEvents for NoopEvents {}

/// Marker payload: the fixed text, zero padded to [`RESUME_MARKER_LEN`].
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)] // bounded by both lengths
pub const fn marker_payload() -> [u8; RESUME_MARKER_LEN] {
    let mut payload = [0u8; RESUME_MARKER_LEN];
    let mut i = 0;
    while i < RESUME_MARKER_TEXT.len() && i < RESUME_MARKER_LEN {
        payload[i] = RESUME_MARKER_TEXT[i];
        i += 1;
    }
    payload
}

/// Writes a marker file to the mounted volume each time the bus resumes.
///
/// The file is created (or truncated) at [`RESUME_MARKER_PATH`] and holds
/// [`marker_payload`]. Failures never reach the USB core; they are logged
/// and counted.
pub struct ResumeMarker<S> {
    store: S,
    written: u32,
    failures: u32,
}

impl<S: FileStore> ResumeMarker<S> {
    /// Handler writing to `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            written: 0,
            failures: 0,
        }
    }

    /// Markers written completely.
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Marker writes that failed or came up short.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Borrow the file store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutably borrow the file store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Release the file store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: FileStore> UsbUserEvents for ResumeMarker<S> {
    async fn device_resumed(&mut self) {
        let payload = marker_payload();
        match self
            .store
            .write_file(RESUME_MARKER_PATH, &payload, WriteMode::CreateAlways)
            .await
        {
            Ok(n) if n == payload.len() => {
                self.written = self.written.saturating_add(1);
            }
            Ok(_n) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("usb: short marker write ({} of {} bytes)", _n, payload.len());
                self.failures = self.failures.saturating_add(1);
            }
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("usb: marker file write failed");
                self.failures = self.failures.saturating_add(1);
            }
        }
    }
}
