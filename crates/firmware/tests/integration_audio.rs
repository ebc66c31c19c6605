//! Audio integration tests: interface state machine over the playback mock.
// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//!
//! Walks a full streaming session the way the audio class framework drives
//! it, with transfer-complete notifications raised from a static signal as
//! the DMA interrupt would.
//!
//! Run with: cargo test -p firmware --test integration_audio

use core::sync::atomic::{AtomicUsize, Ordering};

use firmware::audio::{AudioCommand, AudioError, AudioOut, AudioState, TransferCompleteSignal};
use platform::audio::{PauseResume, PowerDown};
use platform::mocks::{AudioCall, AudioOp, MockAudioDevice};
use platform::AudioOutConfig;

static XFER_DONE: TransferCompleteSignal = TransferCompleteSignal::new();
static NEXT_BUFFER_REQUESTS: AtomicUsize = AtomicUsize::new(0);

fn next_buffer(_buf: &[u8]) {
    NEXT_BUFFER_REQUESTS.fetch_add(1, Ordering::SeqCst);
}

/// Simulated DMA interrupt: the device latches its flag, the ISR notifies.
fn dma_isr(out: &mut AudioOut<MockAudioDevice>) {
    out.device_mut().raise_transfer_complete();
    XFER_DONE.notify();
}

#[tokio::test]
async fn test_streaming_session() {
    let mut out = AudioOut::new(MockAudioDevice::new());
    out.set_transfer_complete_callback(next_buffer);
    out.init_with(AudioOutConfig::from_raw(44_100, 80, 0)).await.unwrap();

    let frame = [0u8; 64];
    out.command(AudioCommand::Play, &frame).await.unwrap();
    assert_eq!(out.state(), AudioState::Playing);

    dma_isr(&mut out);
    assert!(out.service_transfer_complete(&XFER_DONE));
    assert!(!out.service_transfer_complete(&XFER_DONE));

    // Host sends the next frame while playing.
    out.command(AudioCommand::Play, &frame).await.unwrap();
    out.command(AudioCommand::Pause, &frame).await.unwrap();
    out.command(AudioCommand::Play, &frame).await.unwrap();
    out.command(AudioCommand::Stop, &[]).await.unwrap();
    assert_eq!(out.state(), AudioState::Stopped);

    // Restart after stop.
    out.command(AudioCommand::Play, &frame).await.unwrap();
    out.deinit().await.unwrap();
    assert_eq!(out.state(), AudioState::Inactive);

    assert_eq!(
        out.device().calls(),
        &[
            AudioCall::Init { volume: 80, sample_rate: 44_100, options: 0 },
            AudioCall::Play { len: 64, samples: 32 },
            AudioCall::Play { len: 64, samples: 32 },
            AudioCall::PauseResume { cmd: PauseResume::Pause, samples: 32 },
            AudioCall::PauseResume { cmd: PauseResume::Resume, samples: 32 },
            AudioCall::Stop(PowerDown::Software),
            AudioCall::Play { len: 64, samples: 32 },
            AudioCall::Deinit,
        ]
    );
    assert!(NEXT_BUFFER_REQUESTS.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_error_state_requires_deinit() {
    let mut dev = MockAudioDevice::new();
    dev.fail(AudioOp::PauseResume);
    let mut out = AudioOut::new(dev);
    out.init_with(AudioOutConfig::default()).await.unwrap();
    out.command(AudioCommand::Play, &[0u8; 4]).await.unwrap();

    assert_eq!(out.command(AudioCommand::Pause, &[0u8; 4]).await, Err(AudioError::Device));
    assert_eq!(out.state(), AudioState::Error);
    assert_eq!(out.command(AudioCommand::Stop, &[]).await, Err(AudioError::InvalidState));

    out.device_mut().heal(AudioOp::PauseResume);
    out.deinit().await.unwrap();
    out.init_with(AudioOutConfig::default()).await.unwrap();
    assert_eq!(out.state(), AudioState::Active);
    out.command(AudioCommand::Play, &[0u8; 4]).await.unwrap();
    assert_eq!(out.state(), AudioState::Playing);
}

#[tokio::test]
async fn test_reinit_after_deinit_calls_device_again() {
    let mut out = AudioOut::new(MockAudioDevice::new());
    out.init_with(AudioOutConfig::default()).await.unwrap();
    out.deinit().await.unwrap();
    out.init_with(AudioOutConfig::default()).await.unwrap();
    let inits = out
        .device()
        .calls()
        .iter()
        .filter(|c| matches!(c, AudioCall::Init { .. }))
        .count();
    assert_eq!(inits, 2);
}
