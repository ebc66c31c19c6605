//! `embedded-storage-async` NOR-flash facade for [`DataFlash`].
//!
//! Page program (`0x82`) erases its page before programming, so a write that
//! covers only part of a page reads the page first and programs the merged
//! image. Erase granularity is one page.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::spi::SpiBus;
use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind};
use embedded_storage_async::nor_flash::{NorFlash, ReadNorFlash};
use platform::flash_config::PAGE_SIZE;

use super::{DataFlash, FlashError};

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::PageBoundary => NorFlashErrorKind::NotAligned,
            Self::AddressOutOfRange => NorFlashErrorKind::OutOfBounds,
            Self::Spi(_) | Self::ChipSelect(_) | Self::BufferTooSmall => NorFlashErrorKind::Other,
        }
    }
}

impl<SPI, CS> ErrorType for DataFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = FlashError;
}

impl<SPI, CS> ReadNorFlash for DataFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_buffer(bytes, offset).await
    }

    fn capacity(&self) -> usize {
        self.geometry().capacity()
    }
}

impl<SPI, CS> NorFlash for DataFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = PAGE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let page = PAGE_SIZE as u32;
        if from > to || from % page != 0 || to % page != 0 {
            return Err(FlashError::PageBoundary);
        }
        if to as usize > self.geometry().capacity() {
            return Err(FlashError::AddressOutOfRange);
        }
        for address in (from..to).step_by(PAGE_SIZE) {
            self.page_erase(address).await?;
        }
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let end = u64::from(offset).saturating_add(bytes.len() as u64);
        if end > self.geometry().capacity() as u64 {
            return Err(FlashError::AddressOutOfRange);
        }

        let mut address = offset;
        let mut rest = bytes;
        while !rest.is_empty() {
            let in_page = address as usize % PAGE_SIZE;
            let take = rest.len().min(PAGE_SIZE.saturating_sub(in_page));
            let (chunk, tail) = rest.split_at(take);

            if take == PAGE_SIZE {
                self.write_page(chunk, address).await?;
            } else {
                let page_start = address.saturating_sub(in_page as u32);
                let mut page = [0u8; PAGE_SIZE];
                self.read_buffer(&mut page, page_start).await?;
                if let Some(dst) = page.get_mut(in_page..in_page.saturating_add(take)) {
                    dst.copy_from_slice(chunk);
                }
                self.write_page(&page, page_start).await?;
            }

            address = address.saturating_add(take as u32);
            rest = tail;
        }
        Ok(())
    }
}
