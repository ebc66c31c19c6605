//! Transfer-complete signalling between the DMA interrupt and the foreground.
//!
//! The interrupt handler only calls [`TransferCompleteSignal::notify`]; the
//! audio state machine is touched exclusively from the foreground, which
//! drains the signal through [`AudioOut`](super::AudioOut).

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Single-producer (ISR) / single-consumer (foreground) completion flag.
///
/// Notifications that arrive before the foreground drains the signal
/// coalesce into one.
pub struct TransferCompleteSignal {
    inner: Signal<CriticalSectionRawMutex, ()>,
}

impl TransferCompleteSignal {
    /// Unsignalled. `const` so it can live in a `static`.
    pub const fn new() -> Self {
        Self {
            inner: Signal::new(),
        }
    }

    /// Record a completed DMA transfer. Safe to call from interrupt context.
    pub fn notify(&self) {
        self.inner.signal(());
    }

    /// Consume a pending notification, if any.
    pub fn try_take(&self) -> bool {
        self.inner.try_take().is_some()
    }

    /// Whether a notification is pending, without consuming it.
    pub fn is_pending(&self) -> bool {
        self.inner.signaled()
    }

    /// Wait for and consume the next notification.
    pub async fn wait(&self) {
        self.inner.wait().await;
    }
}

impl Default for TransferCompleteSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_coalesce() {
        let signal = TransferCompleteSignal::new();
        assert!(!signal.try_take());
        signal.notify();
        signal.notify();
        assert!(signal.is_pending());
        assert!(signal.try_take());
        assert!(!signal.try_take());
    }

    #[tokio::test]
    async fn wait_returns_on_earlier_notify() {
        static SIGNAL: TransferCompleteSignal = TransferCompleteSignal::new();
        SIGNAL.notify();
        SIGNAL.wait().await;
        assert!(!SIGNAL.is_pending());
    }
}
