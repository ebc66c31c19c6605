//! SD-card-backed USB mass-storage LUN.
//!
//! [`SdMassStorage`] implements [`MassStorage`] for LUN 0 on top of an
//! [`SdCard`] driver. It keeps no geometry cache: every capacity query goes
//! to the card so a swapped card is reported correctly.
//!
//! # Bus recovery
//!
//! The SD driver shares its SPI bus with the card's power-up sequence. After
//! a failed initialisation or read the bus can be left mid-frame; clocking a
//! single `0xFF` byte releases it. Whether the same is done after a failed
//! write is configurable through [`BusRecoveryPolicy`].

use platform::config::{BLOCK_SIZE, BUS_RECOVERY_BYTE, INQUIRY_PRODUCT, INQUIRY_REVISION, INQUIRY_VENDOR, LUN_COUNT};
use platform::storage::{Capacity, CardPresence, MassStorage, MscError, SdCard, INQUIRY_DATA_LEN};

/// Build a SCSI standard INQUIRY response.
///
/// Layout: direct-access device, removable medium, SPC-2, response data
/// format 2, additional length `36 - 5`, then the identity strings.
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)] // const loops over fixed-size arrays
pub const fn standard_inquiry(
    vendor: &[u8; 8],
    product: &[u8; 16],
    revision: &[u8; 4],
) -> [u8; INQUIRY_DATA_LEN] {
    let mut data = [0u8; INQUIRY_DATA_LEN];
    data[0] = 0x00; // peripheral qualifier 0, direct-access block device
    data[1] = 0x80; // RMB: removable
    data[2] = 0x02; // SPC-2
    data[3] = 0x02; // response data format
    data[4] = (INQUIRY_DATA_LEN - 5) as u8;
    let mut i = 0;
    while i < 8 {
        data[8 + i] = vendor[i];
        i += 1;
    }
    i = 0;
    while i < 16 {
        data[16 + i] = product[i];
        i += 1;
    }
    i = 0;
    while i < 4 {
        data[32 + i] = revision[i];
        i += 1;
    }
    data
}

/// INQUIRY response reported for the SD-card LUN.
pub const SD_INQUIRY_DATA: [u8; INQUIRY_DATA_LEN] =
    standard_inquiry(INQUIRY_VENDOR, INQUIRY_PRODUCT, INQUIRY_REVISION);

/// When to clock the bus-recovery byte after a driver failure.
///
/// Initialisation and read failures always recover the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusRecoveryPolicy {
    /// Also recover after a failed block write.
    pub on_write_failure: bool,
}

/// USB mass-storage LUN backed by an SD card.
pub struct SdMassStorage<C> {
    card: C,
    policy: BusRecoveryPolicy,
    /// Set when the card was seen absent; the next access re-initialises it.
    reinit_pending: bool,
}

impl<C: SdCard> SdMassStorage<C> {
    /// Wrap `card` with the default recovery policy.
    pub fn new(card: C) -> Self {
        Self::with_policy(card, BusRecoveryPolicy::default())
    }

    /// Wrap `card` with an explicit recovery policy.
    pub fn with_policy(card: C, policy: BusRecoveryPolicy) -> Self {
        Self {
            card,
            policy,
            reinit_pending: false,
        }
    }

    /// Borrow the card driver.
    pub fn card(&self) -> &C {
        &self.card
    }

    /// Mutably borrow the card driver.
    pub fn card_mut(&mut self) -> &mut C {
        &mut self.card
    }

    /// Release the card driver.
    pub fn into_inner(self) -> C {
        self.card
    }

    /// Active recovery policy.
    pub fn policy(&self) -> BusRecoveryPolicy {
        self.policy
    }

    /// Whether the next `is_ready` will re-initialise the card.
    pub fn reinit_pending(&self) -> bool {
        self.reinit_pending
    }

    async fn present(&mut self) -> bool {
        self.card.detect().await == CardPresence::Present
    }

    async fn recover_bus(&mut self) {
        // The byte clocked back carries no information.
        if self.card.exchange_byte(BUS_RECOVERY_BYTE).await.is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("sd: bus recovery byte failed");
        }
    }

    fn check_buffer(len: usize, block_count: u16) -> Result<(), MscError> {
        let needed = usize::from(block_count)
            .checked_mul(BLOCK_SIZE as usize)
            .ok_or(MscError::InvalidBuffer)?;
        if len < needed {
            return Err(MscError::InvalidBuffer);
        }
        Ok(())
    }
}

impl<C: SdCard> MassStorage for SdMassStorage<C> {
    async fn init(&mut self, _lun: u8) -> Result<(), MscError> {
        if self.card.initialize().await.is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("sd: initialisation failed, errors will surface on first access");
            self.recover_bus().await;
        } else {
            #[cfg(feature = "defmt")]
            defmt::info!("sd: card initialised");
        }
        Ok(())
    }

    async fn capacity(&mut self, _lun: u8) -> Result<Capacity, MscError> {
        if !self.present().await {
            return Err(MscError::MediumNotPresent);
        }
        Ok(Capacity::sd(self.card.sector_count().await))
    }

    async fn is_ready(&mut self, _lun: u8) -> Result<(), MscError> {
        if !self.present().await {
            self.reinit_pending = true;
            return Err(MscError::MediumNotPresent);
        }
        if self.reinit_pending {
            self.reinit_pending = false;
            #[cfg(feature = "defmt")]
            defmt::debug!("sd: card reinserted, re-initialising");
            if self.card.initialize().await.is_err() {
                return Err(MscError::MediumNotPresent);
            }
        }
        Ok(())
    }

    fn is_write_protected(&self, _lun: u8) -> bool {
        false
    }

    async fn read(
        &mut self,
        _lun: u8,
        buf: &mut [u8],
        start_block: u32,
        block_count: u16,
    ) -> Result<(), MscError> {
        if !self.present().await {
            return Err(MscError::MediumNotPresent);
        }
        Self::check_buffer(buf.len(), block_count)?;
        if self.card.read_disk(buf, start_block, block_count).await.is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("sd: read of {} blocks at {} failed", block_count, start_block);
            self.recover_bus().await;
            return Err(MscError::ReadFault);
        }
        Ok(())
    }

    async fn write(
        &mut self,
        _lun: u8,
        buf: &[u8],
        start_block: u32,
        block_count: u16,
    ) -> Result<(), MscError> {
        if !self.present().await {
            return Err(MscError::MediumNotPresent);
        }
        Self::check_buffer(buf.len(), block_count)?;
        if self.card.write_disk(buf, start_block, block_count).await.is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("sd: write of {} blocks at {} failed", block_count, start_block);
            if self.policy.on_write_failure {
                self.recover_bus().await;
            }
            return Err(MscError::WriteFault);
        }
        Ok(())
    }

    #[allow(clippy::arithmetic_side_effects)] // LUN_COUNT is a non-zero constant
    fn max_lun(&self) -> u8 {
        LUN_COUNT - 1
    }

    fn inquiry_data(&self, _lun: u8) -> &[u8; INQUIRY_DATA_LEN] {
        &SD_INQUIRY_DATA
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use platform::mocks::MockSdCard;
    use platform::storage::status_code;

    const GOLDEN_INQUIRY: [u8; 36] = [
        0x00, 0x80, 0x02, 0x02, 31, 0x00, 0x00, 0x00, //
        b'S', b'T', b'M', b' ', b' ', b' ', b' ', b' ', //
        b'm', b'i', b'c', b'r', b'o', b'S', b'D', b' ', //
        b'F', b'l', b'a', b's', b'h', b' ', b' ', b' ', //
        b'1', b'.', b'0', b'0',
    ];

    #[test]
    fn inquiry_matches_golden_bytes() {
        let msc = SdMassStorage::new(MockSdCard::new(8));
        assert_eq!(msc.inquiry_data(0), &GOLDEN_INQUIRY);
    }

    #[test]
    fn single_lun_never_write_protected() {
        let msc = SdMassStorage::new(MockSdCard::new(8));
        assert_eq!(msc.max_lun(), 0);
        assert!(!msc.is_write_protected(0));
    }

    #[tokio::test]
    async fn init_failure_is_reported_as_success_after_recovery_byte() {
        let mut card = MockSdCard::new(8);
        card.fail_init(true);
        let mut msc = SdMassStorage::new(card);
        assert_eq!(msc.init(0).await, Ok(()));
        assert_eq!(msc.card().exchanged(), &[0xFF]);
    }

    #[tokio::test]
    async fn init_success_sends_no_recovery_byte() {
        let mut msc = SdMassStorage::new(MockSdCard::new(8));
        msc.init(0).await.unwrap();
        assert!(msc.card().exchanged().is_empty());
        assert_eq!(msc.card().init_calls(), 1);
    }

    #[tokio::test]
    async fn capacity_passes_driver_count_through() {
        for count in [0, 1, u32::MAX] {
            let mut msc = SdMassStorage::new(MockSdCard::new(count));
            let cap = msc.capacity(0).await.unwrap();
            assert_eq!(cap.block_size, 512);
            assert_eq!(cap.block_count, count);
        }
    }

    #[tokio::test]
    async fn capacity_is_queried_live() {
        let mut msc = SdMassStorage::new(MockSdCard::new(100));
        assert_eq!(msc.capacity(0).await.unwrap().block_count, 100);
        msc.card_mut().set_sector_count(200);
        assert_eq!(msc.capacity(0).await.unwrap().block_count, 200);
        assert_eq!(msc.card().sector_count_calls(), 2);
    }

    #[tokio::test]
    async fn capacity_without_card_is_not_present() {
        let mut msc = SdMassStorage::new(MockSdCard::absent());
        assert_eq!(msc.capacity(0).await, Err(MscError::MediumNotPresent));
    }

    #[tokio::test]
    async fn ready_latch_reinitialises_once_after_absence() {
        let mut msc = SdMassStorage::new(MockSdCard::new(8));
        assert_eq!(msc.is_ready(0).await, Ok(()));
        assert_eq!(msc.card().init_calls(), 0);

        msc.card_mut().set_present(false);
        assert_eq!(msc.is_ready(0).await, Err(MscError::MediumNotPresent));
        assert!(msc.reinit_pending());

        msc.card_mut().set_present(true);
        assert_eq!(msc.is_ready(0).await, Ok(()));
        assert_eq!(msc.card().init_calls(), 1);
        assert!(!msc.reinit_pending());

        assert_eq!(msc.is_ready(0).await, Ok(()));
        assert_eq!(msc.card().init_calls(), 1);
    }

    #[tokio::test]
    async fn failed_reinit_reports_not_present_and_clears_latch() {
        let mut msc = SdMassStorage::new(MockSdCard::new(8));
        msc.card_mut().set_present(false);
        let _ = msc.is_ready(0).await;
        msc.card_mut().set_present(true);
        msc.card_mut().fail_init(true);
        assert_eq!(msc.is_ready(0).await, Err(MscError::MediumNotPresent));
        assert_eq!(msc.is_ready(0).await, Ok(()));
        assert_eq!(msc.card().init_calls(), 1);
    }

    #[tokio::test]
    async fn absent_media_short_circuits_io() {
        let mut msc = SdMassStorage::new(MockSdCard::absent());
        let mut buf = [0u8; 512];
        assert_eq!(msc.read(0, &mut buf, 0, 1).await, Err(MscError::MediumNotPresent));
        assert_eq!(msc.write(0, &buf, 0, 1).await, Err(MscError::MediumNotPresent));
        assert_eq!(msc.card().read_calls(), 0);
        assert_eq!(msc.card().write_calls(), 0);
        assert!(msc.card().exchanged().is_empty());
    }

    #[tokio::test]
    async fn short_buffer_is_rejected_before_the_driver() {
        let mut msc = SdMassStorage::new(MockSdCard::new(8));
        let mut buf = [0u8; 1023];
        let result = msc.read(0, &mut buf, 0, 2).await;
        assert_eq!(result, Err(MscError::InvalidBuffer));
        assert_eq!(status_code(&result), 5);
        assert_eq!(msc.card().read_calls(), 0);
    }

    #[tokio::test]
    async fn read_failure_sends_recovery_byte() {
        let mut card = MockSdCard::new(8);
        card.fail_read(true);
        let mut msc = SdMassStorage::new(card);
        let mut buf = [0u8; 512];
        let result = msc.read(0, &mut buf, 0, 1).await;
        assert_eq!(result, Err(MscError::ReadFault));
        assert_eq!(status_code(&result), 5);
        assert_eq!(msc.card().exchanged(), &[0xFF]);
    }

    #[tokio::test]
    async fn write_failure_recovery_follows_policy() {
        let mut card = MockSdCard::new(8);
        card.fail_write(true);
        let mut msc = SdMassStorage::new(card);
        let buf = [0u8; 512];
        assert_eq!(msc.write(0, &buf, 0, 1).await, Err(MscError::WriteFault));
        assert!(msc.card().exchanged().is_empty());

        let mut card = MockSdCard::new(8);
        card.fail_write(true);
        let mut msc = SdMassStorage::with_policy(card, BusRecoveryPolicy { on_write_failure: true });
        assert_eq!(msc.write(0, &buf, 0, 1).await, Err(MscError::WriteFault));
        assert_eq!(msc.card().exchanged(), &[0xFF]);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let mut msc = SdMassStorage::new(MockSdCard::new(16));
        let data: Vec<u8> = (0..1536u32).map(|i| (i % 251) as u8).collect();
        msc.write(0, &data, 5, 3).await.unwrap();
        let mut back = vec![0u8; 1536];
        msc.read(0, &mut back, 5, 3).await.unwrap();
        assert_eq!(back, data);
    }
}
