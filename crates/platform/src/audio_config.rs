//! Audio-out interface configuration.
//!
//! The playback framework hands the interface a start-up sample rate, a
//! volume word and an opaque option word. [`AudioOutConfig`] bundles them
//! with validated types so the interface never sees a raw out-of-range value.
//!
//! # Sample-rate policy
//!
//! | Request             | Applied rate |
//! |---------------------|--------------|
//! | 8 000 – 96 000 Hz   | as requested |
//! | anything else       | 48 000 Hz    |

use crate::audio_types::{SampleRateHz, VolumePercent};

/// Start-up configuration for the audio-out interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioOutConfig {
    /// Start-up sample rate.
    pub sample_rate: SampleRateHz,
    /// Start-up volume.
    pub volume: VolumePercent,
    /// Opaque option word forwarded to the playback layer.
    pub options: u32,
}

impl AudioOutConfig {
    /// Build a configuration from the framework's raw words.
    ///
    /// Out-of-range rates fall back to [`SampleRateHz::DEFAULT`]; volumes
    /// above 100 clamp to 100.
    pub fn from_raw(freq_hz: u32, volume: u32, options: u32) -> Self {
        Self {
            sample_rate: SampleRateHz::or_default(freq_hz),
            volume: VolumePercent::saturating_from_u32(volume),
            options,
        }
    }
}

impl Default for AudioOutConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRateHz::DEFAULT,
            volume: VolumePercent::new(70),
            options: 0,
        }
    }
}
