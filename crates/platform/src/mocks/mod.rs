//! Mock implementations for testing
//!
//! This module provides mock implementations of the platform traits for use
//! in unit and integration tests:
//!
//! - [`MockSdCard`] - sparse in-memory SD card with presence and fault control
//! - [`MockAudioDevice`] - call-recording playback layer with fault injection
//! - [`MemoryFileStore`] - in-memory volume
//! - [`SimulatedDataFlash`] - byte-level DataFlash behind SPI + chip select

#![cfg(any(test, feature = "std"))]
#![allow(clippy::arithmetic_side_effects)] // host-only bookkeeping counters
#![allow(clippy::indexing_slicing)] // simulator frames are bounds-checked by construction
#![allow(clippy::cast_possible_truncation)]

mod dataflash;

pub use dataflash::{
    SimulatedBusFault, SimulatedCs, SimulatedDataFlash, SimulatedSpi, DEFAULT_DEVICE_ID,
};

use std::collections::{BTreeMap, HashSet};
use std::string::String;
use std::vec::Vec;

use crate::audio::{AudioOutputDevice, PauseResume, PowerDown};
use crate::audio_types::{SampleRateHz, VolumePercent};
use crate::config::BLOCK_SIZE;
use crate::storage::{CardPresence, FileStore, SdCard, WriteMode};

// ── SD card ──────────────────────────────────────────────────────────────────

/// Failure reported by [`MockSdCard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSdError {
    /// Initialisation was configured to fail.
    InitFailed,
    /// A read was configured to fail.
    ReadFailed,
    /// A write was configured to fail.
    WriteFailed,
    /// The sector range runs past the card or the buffer.
    OutOfRange,
    /// The card is not in the slot.
    NotPresent,
}

/// In-memory SD card.
///
/// Sectors that were never written read back as zero.
#[derive(Debug, Default)]
pub struct MockSdCard {
    present: bool,
    sector_count: u32,
    fail_init: bool,
    fail_read: bool,
    fail_write: bool,
    sectors: BTreeMap<u32, [u8; BLOCK_SIZE as usize]>,
    exchanged: Vec<u8>,
    init_calls: usize,
    read_calls: usize,
    write_calls: usize,
    sector_count_calls: usize,
}

impl MockSdCard {
    /// Card present with `sector_count` sectors.
    pub fn new(sector_count: u32) -> Self {
        Self {
            present: true,
            sector_count,
            ..Self::default()
        }
    }

    /// Empty slot.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Insert or remove the card.
    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    /// Change the size the card reports.
    pub fn set_sector_count(&mut self, sector_count: u32) {
        self.sector_count = sector_count;
    }

    /// Make `initialize` fail.
    pub fn fail_init(&mut self, fail: bool) {
        self.fail_init = fail;
    }

    /// Make `read_disk` fail.
    pub fn fail_read(&mut self, fail: bool) {
        self.fail_read = fail;
    }

    /// Make `write_disk` fail.
    pub fn fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }

    /// Fill `sector` with `data` directly.
    pub fn load_sector(&mut self, sector: u32, data: &[u8; BLOCK_SIZE as usize]) {
        self.sectors.insert(sector, *data);
    }

    /// Contents of `sector` (zero if never written).
    pub fn sector(&self, sector: u32) -> [u8; BLOCK_SIZE as usize] {
        self.sectors.get(&sector).copied().unwrap_or([0; BLOCK_SIZE as usize])
    }

    /// Bytes clocked through [`SdCard::exchange_byte`], in order.
    pub fn exchanged(&self) -> &[u8] {
        &self.exchanged
    }

    /// Number of `initialize` calls.
    pub fn init_calls(&self) -> usize {
        self.init_calls
    }

    /// Number of `read_disk` calls.
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    /// Number of `write_disk` calls.
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    /// Number of `sector_count` calls.
    pub fn sector_count_calls(&self) -> usize {
        self.sector_count_calls
    }

    fn check_range(&self, len: usize, sector: u32, count: u16) -> Result<(), MockSdError> {
        let end = u64::from(sector) + u64::from(count);
        let needed = usize::from(count) * BLOCK_SIZE as usize;
        if end > u64::from(self.sector_count) || len < needed {
            return Err(MockSdError::OutOfRange);
        }
        Ok(())
    }
}

impl SdCard for MockSdCard {
    type Error = MockSdError;

    async fn initialize(&mut self) -> Result<(), Self::Error> {
        self.init_calls += 1;
        if !self.present {
            return Err(MockSdError::NotPresent);
        }
        if self.fail_init {
            return Err(MockSdError::InitFailed);
        }
        Ok(())
    }

    async fn detect(&mut self) -> CardPresence {
        if self.present {
            CardPresence::Present
        } else {
            CardPresence::NotPresent
        }
    }

    async fn sector_count(&mut self) -> u32 {
        self.sector_count_calls += 1;
        if self.present {
            self.sector_count
        } else {
            0
        }
    }

    async fn read_disk(&mut self, buf: &mut [u8], sector: u32, count: u16) -> Result<(), Self::Error> {
        self.read_calls += 1;
        if self.fail_read {
            return Err(MockSdError::ReadFailed);
        }
        self.check_range(buf.len(), sector, count)?;
        for (i, chunk) in buf.chunks_exact_mut(BLOCK_SIZE as usize).take(usize::from(count)).enumerate() {
            chunk.copy_from_slice(&self.sector(sector + i as u32));
        }
        Ok(())
    }

    async fn write_disk(&mut self, buf: &[u8], sector: u32, count: u16) -> Result<(), Self::Error> {
        self.write_calls += 1;
        if self.fail_write {
            return Err(MockSdError::WriteFailed);
        }
        self.check_range(buf.len(), sector, count)?;
        for (i, chunk) in buf.chunks_exact(BLOCK_SIZE as usize).take(usize::from(count)).enumerate() {
            let mut block = [0u8; BLOCK_SIZE as usize];
            block.copy_from_slice(chunk);
            self.sectors.insert(sector + i as u32, block);
        }
        Ok(())
    }

    async fn exchange_byte(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.exchanged.push(byte);
        Ok(0xFF)
    }
}

// ── Audio playback layer ─────────────────────────────────────────────────────

/// Playback-layer operation, used to select which call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioOp {
    /// `init`
    Init,
    /// `deinit`
    Deinit,
    /// `play`
    Play,
    /// `pause_resume`
    PauseResume,
    /// `stop`
    Stop,
    /// `set_volume`
    SetVolume,
    /// `set_mute`
    SetMute,
    /// `switch_sample_rate`
    SwitchSampleRate,
}

/// Call recorded by [`MockAudioDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCall {
    /// `init(volume, rate, options)`
    Init {
        /// Volume in percent
        volume: u8,
        /// Sample rate in Hz
        sample_rate: u32,
        /// Option word
        options: u32,
    },
    /// `deinit()`
    Deinit,
    /// `play(buf, samples)`
    Play {
        /// Buffer length in bytes
        len: usize,
        /// Sample count passed down
        samples: usize,
    },
    /// `pause_resume(cmd, buf, samples)`
    PauseResume {
        /// Direction
        cmd: PauseResume,
        /// Sample count passed down
        samples: usize,
    },
    /// `stop(mode)`
    Stop(PowerDown),
    /// `set_volume(percent)`
    SetVolume(u8),
    /// `set_mute(on)`
    SetMute(bool),
    /// `switch_sample_rate(hz)`
    SwitchSampleRate(u32),
}

/// Injected playback-layer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockAudioError(pub AudioOp);

/// Call-recording playback layer.
#[derive(Debug, Default)]
pub struct MockAudioDevice {
    calls: Vec<AudioCall>,
    failing: HashSet<AudioOp>,
    transfer_complete: bool,
}

impl MockAudioDevice {
    /// Device on which every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future `op` call fail.
    pub fn fail(&mut self, op: AudioOp) {
        self.failing.insert(op);
    }

    /// Let `op` succeed again.
    pub fn heal(&mut self, op: AudioOp) {
        self.failing.remove(&op);
    }

    /// Calls received so far.
    pub fn calls(&self) -> &[AudioCall] {
        &self.calls
    }

    /// Forget recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Latch the transfer-complete flag as the DMA interrupt would.
    pub fn raise_transfer_complete(&mut self) {
        self.transfer_complete = true;
    }

    fn record(&mut self, op: AudioOp, call: AudioCall) -> Result<(), MockAudioError> {
        self.calls.push(call);
        if self.failing.contains(&op) {
            Err(MockAudioError(op))
        } else {
            Ok(())
        }
    }
}

impl AudioOutputDevice for MockAudioDevice {
    type Error = MockAudioError;

    async fn init(
        &mut self,
        volume: VolumePercent,
        sample_rate: SampleRateHz,
        options: u32,
    ) -> Result<(), Self::Error> {
        self.record(
            AudioOp::Init,
            AudioCall::Init {
                volume: volume.get(),
                sample_rate: sample_rate.get(),
                options,
            },
        )
    }

    async fn deinit(&mut self) -> Result<(), Self::Error> {
        self.record(AudioOp::Deinit, AudioCall::Deinit)
    }

    async fn play(&mut self, buf: &[u8], samples: usize) -> Result<(), Self::Error> {
        self.record(
            AudioOp::Play,
            AudioCall::Play {
                len: buf.len(),
                samples,
            },
        )
    }

    async fn pause_resume(
        &mut self,
        cmd: PauseResume,
        _buf: &[u8],
        samples: usize,
    ) -> Result<(), Self::Error> {
        self.record(AudioOp::PauseResume, AudioCall::PauseResume { cmd, samples })
    }

    async fn stop(&mut self, mode: PowerDown) -> Result<(), Self::Error> {
        self.record(AudioOp::Stop, AudioCall::Stop(mode))
    }

    async fn set_volume(&mut self, volume: VolumePercent) -> Result<(), Self::Error> {
        self.record(AudioOp::SetVolume, AudioCall::SetVolume(volume.get()))
    }

    async fn set_mute(&mut self, mute: bool) -> Result<(), Self::Error> {
        self.record(AudioOp::SetMute, AudioCall::SetMute(mute))
    }

    async fn switch_sample_rate(&mut self, sample_rate: SampleRateHz) -> Result<(), Self::Error> {
        self.record(
            AudioOp::SwitchSampleRate,
            AudioCall::SwitchSampleRate(sample_rate.get()),
        )
    }

    fn take_transfer_complete(&mut self) -> bool {
        core::mem::take(&mut self.transfer_complete)
    }
}

// ── File store ───────────────────────────────────────────────────────────────

/// Failure reported by [`MemoryFileStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFileError {
    /// `CreateNew` on an existing path.
    AlreadyExists,
    /// The volume was configured to fail (unmounted, full, ...).
    Unavailable,
}

/// In-memory volume.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
    write_calls: usize,
}

impl MemoryFileStore {
    /// Empty, writable volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Contents of `path`, if it exists.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Number of `write_file` calls, successful or not.
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }
}

impl FileStore for MemoryFileStore {
    type Error = MemoryFileError;

    async fn write_file(&mut self, path: &str, data: &[u8], mode: WriteMode) -> Result<usize, Self::Error> {
        self.write_calls += 1;
        if self.unavailable {
            return Err(MemoryFileError::Unavailable);
        }
        if mode == WriteMode::CreateNew && self.files.contains_key(path) {
            return Err(MemoryFileError::AlreadyExists);
        }
        self.files.insert(path.into(), data.to_vec());
        Ok(data.len())
    }
}
