//! Audio-out interface state machine.
//!
//! [`AudioOut`] sits between the audio class framework and the playback
//! layer ([`AudioOutputDevice`]). Every command is gated on the current
//! [`AudioState`]:
//!
//! | Command | Allowed from                  | Next state |
//! |---------|-------------------------------|------------|
//! | Play    | Active, Stopped, Playing      | Playing    |
//! | Play    | Paused (resumes)              | Playing    |
//! | Pause   | Playing                       | Paused     |
//! | Stop    | Playing                       | Stopped    |
//!
//! Any command from `Inactive` or `Error` moves to `Error`. A playback-layer
//! failure moves to `Error`. Other disallowed commands fail without side
//! effects.

use platform::audio::{AudioOutputDevice, PauseResume, PowerDown};
use platform::audio_types::{SampleRateHz, VolumePercent};
use platform::AudioOutConfig;

use super::transfer::TransferCompleteSignal;

/// Interface state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioState {
    /// Not initialised.
    Inactive,
    /// Initialised, nothing played yet.
    Active,
    /// Streaming.
    Playing,
    /// Stream suspended.
    Paused,
    /// Stream stopped, codec powered down.
    Stopped,
    /// A command failed; only `deinit` recovers.
    Error,
}

/// Playback command from the class framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioCommand {
    /// Start streaming, or resume when paused.
    Play,
    /// Suspend streaming.
    Pause,
    /// Stop streaming.
    Stop,
}

/// Errors returned by [`AudioOut`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioError {
    /// The command is not allowed in the current state.
    #[error("command not allowed in the current state")]
    InvalidState,
    /// The playback layer reported a failure.
    #[error("playback layer failure")]
    Device,
}

/// Upper-layer hook run when a buffer transfer completes.
///
/// Receives the next buffer to stream; the interface always passes an empty
/// slice, leaving the framework to queue the next buffer itself.
pub type TransferCompleteCallback = fn(&[u8]);

/// Audio-out interface over a playback layer.
pub struct AudioOut<D> {
    device: D,
    state: AudioState,
    initialized: bool,
    options: u32,
    on_transfer_complete: Option<TransferCompleteCallback>,
}

impl<D: AudioOutputDevice> AudioOut<D> {
    /// Inactive interface over `device`.
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: AudioState::Inactive,
            initialized: false,
            options: 0,
            on_transfer_complete: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> AudioState {
        self.state
    }

    /// Option word passed to the last successful `init`.
    pub fn options(&self) -> u32 {
        self.options
    }

    /// Borrow the playback layer.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutably borrow the playback layer.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn enter(&mut self, state: AudioState) {
        #[cfg(feature = "defmt")]
        defmt::debug!("audio: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Map a playback-layer result, entering `Error` on failure.
    fn device_result<E>(&mut self, result: Result<(), E>) -> Result<(), AudioError> {
        result.map_err(|_| {
            self.enter(AudioState::Error);
            AudioError::Device
        })
    }

    /// Bring the playback layer up once and enter `Active`.
    ///
    /// A second call while initialised only resets the state to `Active`.
    pub async fn init(
        &mut self,
        sample_rate: SampleRateHz,
        volume: VolumePercent,
        options: u32,
    ) -> Result<(), AudioError> {
        if !self.initialized {
            let result = self.device.init(volume, sample_rate, options).await;
            self.device_result(result)?;
            self.initialized = true;
            self.options = options;
            #[cfg(feature = "defmt")]
            defmt::info!("audio: initialised at {} Hz", sample_rate.get());
        }
        self.enter(AudioState::Active);
        Ok(())
    }

    /// [`init`](Self::init) from a configuration record.
    pub async fn init_with(&mut self, config: AudioOutConfig) -> Result<(), AudioError> {
        self.init(config.sample_rate, config.volume, config.options).await
    }

    /// Release the playback layer and return to `Inactive`.
    pub async fn deinit(&mut self) -> Result<(), AudioError> {
        self.enter(AudioState::Inactive);
        self.initialized = false;
        // The interface is down either way.
        let _ = self.device.deinit().await;
        Ok(())
    }

    /// Run a playback command. `buf` holds 16-bit samples.
    pub async fn command(&mut self, cmd: AudioCommand, buf: &[u8]) -> Result<(), AudioError> {
        if matches!(self.state, AudioState::Inactive | AudioState::Error) {
            self.enter(AudioState::Error);
            return Err(AudioError::InvalidState);
        }
        let samples = buf.len() / 2;

        match (cmd, self.state) {
            (AudioCommand::Play, AudioState::Active | AudioState::Stopped | AudioState::Playing) => {
                if buf.is_empty() {
                    return Ok(());
                }
                let result = self.device.play(buf, samples).await;
                self.device_result(result)?;
                self.enter(AudioState::Playing);
                Ok(())
            }
            (AudioCommand::Play, AudioState::Paused) => {
                if buf.is_empty() {
                    return Ok(());
                }
                let result = self.device.pause_resume(PauseResume::Resume, buf, samples).await;
                self.device_result(result)?;
                self.enter(AudioState::Playing);
                Ok(())
            }
            (AudioCommand::Stop, AudioState::Playing) => {
                let result = self.device.stop(PowerDown::Software).await;
                self.device_result(result)?;
                self.enter(AudioState::Stopped);
                Ok(())
            }
            (AudioCommand::Pause, AudioState::Playing) => {
                let result = self.device.pause_resume(PauseResume::Pause, buf, samples).await;
                self.device_result(result)?;
                self.enter(AudioState::Paused);
                Ok(())
            }
            _ => Err(AudioError::InvalidState),
        }
    }

    /// Set the output volume.
    pub async fn set_volume(&mut self, volume: VolumePercent) -> Result<(), AudioError> {
        let result = self.device.set_volume(volume).await;
        self.device_result(result)
    }

    /// Mute or unmute the output.
    pub async fn set_mute(&mut self, mute: bool) -> Result<(), AudioError> {
        let result = self.device.set_mute(mute).await;
        self.device_result(result)
    }

    /// Switch the stream to `freq_hz`, falling back to 48 kHz when the
    /// request is outside 8–96 kHz. Returns the applied rate.
    pub async fn set_sample_rate(&mut self, freq_hz: u32) -> Result<SampleRateHz, AudioError> {
        let rate = SampleRateHz::or_default(freq_hz);
        let result = self.device.switch_sample_rate(rate).await;
        self.device_result(result)?;
        Ok(rate)
    }

    /// Register the upper-layer transfer-complete hook.
    pub fn set_transfer_complete_callback(&mut self, callback: TransferCompleteCallback) {
        self.on_transfer_complete = Some(callback);
    }

    /// Remove the transfer-complete hook.
    pub fn clear_transfer_complete_callback(&mut self) {
        self.on_transfer_complete = None;
    }

    /// Drain a pending transfer-complete notification.
    ///
    /// Returns `true` when the callback ran.
    pub fn service_transfer_complete(&mut self, signal: &TransferCompleteSignal) -> bool {
        if !signal.try_take() {
            return false;
        }
        self.dispatch_transfer_complete()
    }

    /// Wait for the next transfer-complete notification and handle it.
    ///
    /// Returns `true` when the callback ran.
    pub async fn wait_transfer_complete(&mut self, signal: &TransferCompleteSignal) -> bool {
        signal.wait().await;
        self.dispatch_transfer_complete()
    }

    fn dispatch_transfer_complete(&mut self) -> bool {
        if !self.device.take_transfer_complete() {
            return false;
        }
        match self.on_transfer_complete {
            Some(callback) => {
                callback(&[]);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use platform::mocks::{AudioCall, AudioOp, MockAudioDevice};

    const BUF: [u8; 8] = [0; 8];

    async fn active() -> AudioOut<MockAudioDevice> {
        let mut out = AudioOut::new(MockAudioDevice::new());
        out.init_with(AudioOutConfig::default()).await.unwrap();
        out.device_mut().clear_calls();
        out
    }

    async fn playing() -> AudioOut<MockAudioDevice> {
        let mut out = active().await;
        out.command(AudioCommand::Play, &BUF).await.unwrap();
        out.device_mut().clear_calls();
        out
    }

    #[tokio::test]
    async fn init_runs_device_init_once() {
        let mut out = AudioOut::new(MockAudioDevice::new());
        out.init(SampleRateHz::DEFAULT, VolumePercent::new(70), 7).await.unwrap();
        assert_eq!(out.state(), AudioState::Active);
        assert_eq!(out.options(), 7);
        out.init(SampleRateHz::DEFAULT, VolumePercent::new(70), 9).await.unwrap();
        assert_eq!(
            out.device().calls(),
            &[AudioCall::Init { volume: 70, sample_rate: 48_000, options: 7 }]
        );
    }

    #[tokio::test]
    async fn init_failure_enters_error() {
        let mut dev = MockAudioDevice::new();
        dev.fail(AudioOp::Init);
        let mut out = AudioOut::new(dev);
        assert_eq!(out.init_with(AudioOutConfig::default()).await, Err(AudioError::Device));
        assert_eq!(out.state(), AudioState::Error);
    }

    #[tokio::test]
    async fn command_before_init_enters_error() {
        let mut out = AudioOut::new(MockAudioDevice::new());
        assert_eq!(out.command(AudioCommand::Play, &BUF).await, Err(AudioError::InvalidState));
        assert_eq!(out.state(), AudioState::Error);
        assert!(out.device().calls().is_empty());
    }

    #[tokio::test]
    async fn play_passes_half_the_byte_count() {
        let mut out = active().await;
        out.command(AudioCommand::Play, &BUF).await.unwrap();
        assert_eq!(out.state(), AudioState::Playing);
        assert_eq!(out.device().calls(), &[AudioCall::Play { len: 8, samples: 4 }]);
    }

    #[tokio::test]
    async fn empty_play_is_a_no_op() {
        let mut out = active().await;
        out.command(AudioCommand::Play, &[]).await.unwrap();
        assert_eq!(out.state(), AudioState::Active);
        assert!(out.device().calls().is_empty());
    }

    #[tokio::test]
    async fn pause_then_play_resumes() {
        let mut out = playing().await;
        out.command(AudioCommand::Pause, &BUF).await.unwrap();
        assert_eq!(out.state(), AudioState::Paused);
        out.command(AudioCommand::Play, &BUF).await.unwrap();
        assert_eq!(out.state(), AudioState::Playing);
        assert_eq!(
            out.device().calls(),
            &[
                AudioCall::PauseResume { cmd: PauseResume::Pause, samples: 4 },
                AudioCall::PauseResume { cmd: PauseResume::Resume, samples: 4 },
            ]
        );
    }

    #[tokio::test]
    async fn stop_and_pause_require_playing() {
        let mut out = active().await;
        assert_eq!(out.command(AudioCommand::Stop, &BUF).await, Err(AudioError::InvalidState));
        assert_eq!(out.command(AudioCommand::Pause, &BUF).await, Err(AudioError::InvalidState));
        assert_eq!(out.state(), AudioState::Active);
        assert!(out.device().calls().is_empty());
    }

    #[tokio::test]
    async fn stop_uses_software_power_down() {
        let mut out = playing().await;
        out.command(AudioCommand::Stop, &[]).await.unwrap();
        assert_eq!(out.state(), AudioState::Stopped);
        assert_eq!(out.device().calls(), &[AudioCall::Stop(PowerDown::Software)]);
    }

    #[tokio::test]
    async fn failed_stop_enters_error_and_blocks_commands() {
        let mut out = playing().await;
        out.device_mut().fail(AudioOp::Stop);
        assert_eq!(out.command(AudioCommand::Stop, &[]).await, Err(AudioError::Device));
        assert_eq!(out.state(), AudioState::Error);
        assert_eq!(out.command(AudioCommand::Play, &BUF).await, Err(AudioError::InvalidState));

        out.deinit().await.unwrap();
        assert_eq!(out.state(), AudioState::Inactive);
    }

    #[tokio::test]
    async fn volume_and_mute_failures_enter_error() {
        let mut out = active().await;
        out.set_volume(VolumePercent::new(20)).await.unwrap();
        assert_eq!(out.state(), AudioState::Active);
        out.device_mut().fail(AudioOp::SetMute);
        assert_eq!(out.set_mute(true).await, Err(AudioError::Device));
        assert_eq!(out.state(), AudioState::Error);
    }

    #[tokio::test]
    async fn sample_rate_outside_range_falls_back() {
        let mut out = active().await;
        assert_eq!(out.set_sample_rate(44_100).await.unwrap().get(), 44_100);
        assert_eq!(out.set_sample_rate(192_000).await.unwrap().get(), 48_000);
        assert_eq!(out.set_sample_rate(0).await.unwrap().get(), 48_000);
        assert_eq!(
            out.device().calls(),
            &[
                AudioCall::SwitchSampleRate(44_100),
                AudioCall::SwitchSampleRate(48_000),
                AudioCall::SwitchSampleRate(48_000),
            ]
        );
    }

    static CALLBACKS: AtomicUsize = AtomicUsize::new(0);

    fn count_callback(buf: &[u8]) {
        assert!(buf.is_empty());
        CALLBACKS.fetch_add(1, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn transfer_complete_runs_callback_when_device_flag_set() {
        let signal = TransferCompleteSignal::new();
        let mut out = playing().await;
        out.set_transfer_complete_callback(count_callback);
        let before = CALLBACKS.load(Ordering::SeqCst);

        // Nothing pending.
        assert!(!out.service_transfer_complete(&signal));

        // Signal raised but the transfer was not ours.
        signal.notify();
        assert!(!out.service_transfer_complete(&signal));

        out.device_mut().raise_transfer_complete();
        signal.notify();
        assert!(out.wait_transfer_complete(&signal).await);
        assert_eq!(CALLBACKS.load(Ordering::SeqCst), before + 1);
    }
}
