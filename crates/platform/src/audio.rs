//! Audio playback layer abstraction
//!
//! [`AudioOutputDevice`] is the low layer under the audio-out interface: it
//! owns the codec and the I²S/DMA stream. Every method reports failure through
//! `Self::Error`; the interface above maps any failure to its `Error` state.

use crate::audio_types::{SampleRateHz, VolumePercent};

/// Direction of a pause/resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PauseResume {
    /// Suspend the DMA stream, keeping the codec powered.
    Pause,
    /// Restart the DMA stream from the supplied buffer.
    Resume,
}

/// Codec power-down strategy used when stopping playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerDown {
    /// Mute and power down through codec registers; fast restart.
    Software,
    /// Cut codec power entirely; requires a full re-init.
    Hardware,
}

/// Low-level audio playback layer.
pub trait AudioOutputDevice {
    /// Error type
    type Error: core::fmt::Debug;

    /// Configure codec, clocks and DMA for `sample_rate` at `volume`.
    ///
    /// `options` is passed through untouched to the device.
    fn init(
        &mut self,
        volume: VolumePercent,
        sample_rate: SampleRateHz,
        options: u32,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Release codec, clocks and DMA.
    fn deinit(&mut self) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Start streaming `samples` 16-bit samples from `buf`.
    fn play(
        &mut self,
        buf: &[u8],
        samples: usize,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Pause the stream, or resume it from `buf` (`samples` 16-bit samples).
    fn pause_resume(
        &mut self,
        cmd: PauseResume,
        buf: &[u8],
        samples: usize,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Stop the stream and power the codec down.
    fn stop(
        &mut self,
        mode: PowerDown,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Set output volume.
    fn set_volume(
        &mut self,
        volume: VolumePercent,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Mute (`true`) or unmute (`false`) the output.
    fn set_mute(&mut self, mute: bool) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Retune the I²S clock tree to `sample_rate`.
    fn switch_sample_rate(
        &mut self,
        sample_rate: SampleRateHz,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Read and clear the DMA transfer-complete flag.
    ///
    /// Returns `true` when the completed transfer belongs to this stream and
    /// the upper layer should be notified.
    fn take_transfer_complete(&mut self) -> bool;
}
