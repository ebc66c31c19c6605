//! Audio domain newtypes for compile-time safety.
//!
//! These zero-cost abstractions prevent common errors:
//! - `VolumePercent`: clamps 0–100, prevents register overflow
//! - `SampleRateHz`: validates the 8000–96000 Hz range of the audio-out path

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("{value} is outside {min}..={max}")]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

// ── VolumePercent ────────────────────────────────────────────────────────────

/// Volume as a percentage, clamped to 0–100.
///
/// Wraps a `u8` with the invariant `0 <= value <= 100`.
/// Construct with [`VolumePercent::new`] (clamping) or
/// [`VolumePercent::try_new`] (fallible, strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct VolumePercent(u8);

impl VolumePercent {
    /// Create a `VolumePercent`, clamping values above 100 to 100.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Create a `VolumePercent`, returning an error if `value > 100`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `value > 100`.
    pub fn try_new(value: u8) -> Result<Self, OutOfRangeError> {
        if value > 100 {
            Err(OutOfRangeError {
                value: u32::from(value),
                min: 0,
                max: 100,
            })
        } else {
            Ok(Self(value))
        }
    }

    /// Clamp a wide volume word (as passed by the audio framework) to 0–100.
    #[must_use]
    pub fn saturating_from_u32(value: u32) -> Self {
        Self::new(u8::try_from(value).unwrap_or(u8::MAX))
    }

    /// Return the inner volume value (0–100).
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

// ── SampleRateHz ─────────────────────────────────────────────────────────────

/// Sample rate in Hz, validated to the range the audio-out path supports.
///
/// Valid range: 8000–96000 Hz. Requests outside the range are replaced by
/// [`SampleRateHz::DEFAULT`] via [`SampleRateHz::or_default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct SampleRateHz(u32);

impl SampleRateHz {
    /// Minimum supported sample rate: 8000 Hz (telephony).
    pub const MIN_HZ: u32 = 8_000;

    /// Maximum supported sample rate: 96000 Hz.
    pub const MAX_HZ: u32 = 96_000;

    /// Rate used when a request falls outside the supported range.
    pub const DEFAULT: Self = Self(48_000);

    /// Create a `SampleRateHz`, returning an error if out of 8000–96000 Hz.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `hz < 8000` or `hz > 96000`.
    pub fn new(hz: u32) -> Result<Self, OutOfRangeError> {
        if !(Self::MIN_HZ..=Self::MAX_HZ).contains(&hz) {
            Err(OutOfRangeError {
                value: hz,
                min: Self::MIN_HZ,
                max: Self::MAX_HZ,
            })
        } else {
            Ok(Self(hz))
        }
    }

    /// Validate `hz`, falling back to [`SampleRateHz::DEFAULT`] when out of range.
    #[must_use]
    pub fn or_default(hz: u32) -> Self {
        Self::new(hz).unwrap_or(Self::DEFAULT)
    }

    /// Return the sample rate in Hz.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}
