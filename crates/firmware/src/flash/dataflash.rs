//! AT45DB-class SPI DataFlash driver.
//!
//! Communicates with the chip over an async [`SpiBus`] with a software chip
//! select. Every byte is exchanged on its own: one byte out, the byte clocked
//! back returned.
//!
//! # Transactions
//!
//! Each public operation is one full chip-select cycle:
//!
//! ```text
//! Idle -> CS low -> header + payload -> flush -> CS high -> [busy poll] -> Idle
//! ```
//!
//! Program and erase start an internal cycle on the rising CS edge, so they
//! finish with a status poll. If the bus fails mid-transaction CS is still
//! raised before the error is returned.

use embedded_hal::digital::{Error as _, OutputPin};
use embedded_hal::spi::Error as _;
use embedded_hal_async::spi::SpiBus;
use platform::flash_config::{opcode, DataFlashGeometry, FlashSpiConfig, PAGE_SIZE};

/// Errors returned by the DataFlash driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// SPI transfer failed.
    #[error("SPI bus error: {0}")]
    Spi(embedded_hal::spi::ErrorKind),
    /// Chip-select pin could not be driven.
    #[error("chip select error: {0}")]
    ChipSelect(embedded_hal::digital::ErrorKind),
    /// A page program would run past the end of its page.
    #[error("write crosses a page boundary")]
    PageBoundary,
    /// The address range runs past the end of the device.
    #[error("address beyond the device")]
    AddressOutOfRange,
    /// The buffer is shorter than the requested sector range.
    #[error("buffer shorter than the sector range")]
    BufferTooSmall,
}

/// SPI DataFlash on a dedicated bus and chip-select line.
pub struct DataFlash<SPI, CS> {
    spi: SPI,
    cs: CS,
    geometry: DataFlashGeometry,
    config: FlashSpiConfig,
}

impl<SPI, CS> DataFlash<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    /// AT45DB321-class part with the default bus settings.
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self::with_geometry(spi, cs, DataFlashGeometry::default(), FlashSpiConfig::default())
    }

    /// Part with an explicit page layout and bus settings.
    pub fn with_geometry(spi: SPI, cs: CS, geometry: DataFlashGeometry, config: FlashSpiConfig) -> Self {
        Self {
            spi,
            cs,
            geometry,
            config,
        }
    }

    /// Page layout.
    pub fn geometry(&self) -> DataFlashGeometry {
        self.geometry
    }

    /// Bus settings the board must apply before use.
    pub fn config(&self) -> FlashSpiConfig {
        self.config
    }

    /// Give the bus and pin back.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    // -----------------------------------------------------------------------
    // Low-level helpers
    // -----------------------------------------------------------------------

    /// Send `byte` and return the byte clocked back.
    async fn exchange(&mut self, byte: u8) -> Result<u8, FlashError> {
        let mut frame = [byte];
        self.spi
            .transfer_in_place(&mut frame)
            .await
            .map_err(|e| FlashError::Spi(e.kind()))?;
        Ok(frame[0])
    }

    fn select(&mut self) -> Result<(), FlashError> {
        self.cs.set_low().map_err(|e| FlashError::ChipSelect(e.kind()))
    }

    /// Drain the bus and raise CS. CS is raised even when the flush fails.
    async fn deselect(&mut self) -> Result<(), FlashError> {
        let flushed = self.spi.flush().await.map_err(|e| FlashError::Spi(e.kind()));
        self.cs
            .set_high()
            .map_err(|e| FlashError::ChipSelect(e.kind()))?;
        flushed
    }

    /// End a transaction, preferring the body's error over the deselect's.
    async fn finish<T>(&mut self, body: Result<T, FlashError>) -> Result<T, FlashError> {
        let end = self.deselect().await;
        let value = body?;
        end?;
        Ok(value)
    }

    /// Command byte followed by the 24-bit wire address, MSB first.
    async fn header(&mut self, op: u8, wire: u32) -> Result<(), FlashError> {
        let [_, a2, a1, a0] = wire.to_be_bytes();
        self.exchange(op).await?;
        self.exchange(a2).await?;
        self.exchange(a1).await?;
        self.exchange(a0).await?;
        Ok(())
    }

    fn wire(&self, address: u32) -> Result<u32, FlashError> {
        self.geometry
            .wire_address(address)
            .ok_or(FlashError::AddressOutOfRange)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Program `buf` into the page containing `address`, starting at its offset.
    ///
    /// The data must end within the page. Waits for the program cycle to
    /// finish before returning.
    pub async fn write_page(&mut self, buf: &[u8], address: u32) -> Result<(), FlashError> {
        let (_, offset) = self
            .geometry
            .locate(address)
            .ok_or(FlashError::AddressOutOfRange)?;
        if usize::from(offset).saturating_add(buf.len()) > PAGE_SIZE {
            return Err(FlashError::PageBoundary);
        }
        if buf.is_empty() {
            return Ok(());
        }
        let wire = self.wire(address)?;

        self.select()?;
        let body = self.program_body(wire, buf).await;
        self.finish(body).await?;
        self.wait_for_write_end().await
    }

    async fn program_body(&mut self, wire: u32, buf: &[u8]) -> Result<(), FlashError> {
        self.header(opcode::PAGE_PROGRAM, wire).await?;
        for &byte in buf {
            self.exchange(byte).await?;
        }
        Ok(())
    }

    /// Fill `buf` from consecutive bytes starting at `address`.
    ///
    /// Reads spanning pages are issued one transaction per page so the spare
    /// bytes at the end of each physical page are never returned.
    pub async fn read_buffer(&mut self, buf: &mut [u8], address: u32) -> Result<(), FlashError> {
        let end = u64::from(address).saturating_add(buf.len() as u64);
        if end > self.geometry.capacity() as u64 {
            return Err(FlashError::AddressOutOfRange);
        }
        let mut address = address;
        let mut rest = buf;
        while !rest.is_empty() {
            let (_, offset) = self
                .geometry
                .locate(address)
                .ok_or(FlashError::AddressOutOfRange)?;
            let take = rest.len().min(PAGE_SIZE.saturating_sub(usize::from(offset)));
            let (chunk, tail) = core::mem::take(&mut rest).split_at_mut(take);
            let wire = self.wire(address)?;

            self.select()?;
            let body = self.read_body(wire, chunk).await;
            self.finish(body).await?;

            // take <= PAGE_SIZE and end fits the device
            address = address.saturating_add(take as u32);
            rest = tail;
        }
        Ok(())
    }

    async fn read_body(&mut self, wire: u32, chunk: &mut [u8]) -> Result<(), FlashError> {
        self.header(opcode::CONTINUOUS_READ, wire).await?;
        for _ in 0..opcode::READ_DUMMY_BYTES {
            self.exchange(self.config.dummy_byte).await?;
        }
        for slot in chunk.iter_mut() {
            *slot = self.exchange(self.config.dummy_byte).await?;
        }
        Ok(())
    }

    /// Erase the page containing `address` to `0xFF`.
    pub async fn page_erase(&mut self, address: u32) -> Result<(), FlashError> {
        let (page, _) = self
            .geometry
            .locate(address)
            .ok_or(FlashError::AddressOutOfRange)?;
        let wire = self
            .geometry
            .page_wire_address(page)
            .ok_or(FlashError::AddressOutOfRange)?;

        self.select()?;
        let body = self.header(opcode::PAGE_ERASE, wire).await;
        self.finish(body).await?;
        self.wait_for_write_end().await
    }

    /// Read `count` 512-byte sectors starting at `sector` into `buf`.
    pub async fn sector_read(&mut self, buf: &mut [u8], sector: u32, count: u32) -> Result<(), FlashError> {
        let chunks = sector_chunks(buf.len(), count)?;
        self.check_sector_range(sector, count)?;
        for (i, chunk) in buf.chunks_exact_mut(PAGE_SIZE).take(chunks).enumerate() {
            let address = sector_address(sector, i)?;
            self.read_buffer(chunk, address).await?;
        }
        Ok(())
    }

    /// Write `count` 512-byte sectors starting at `sector` from `buf`.
    pub async fn sector_write(&mut self, buf: &[u8], sector: u32, count: u32) -> Result<(), FlashError> {
        let chunks = sector_chunks(buf.len(), count)?;
        self.check_sector_range(sector, count)?;
        for (i, chunk) in buf.chunks_exact(PAGE_SIZE).take(chunks).enumerate() {
            let address = sector_address(sector, i)?;
            self.write_page(chunk, address).await?;
        }
        Ok(())
    }

    /// Reject a sector run that does not fit the device, before any bus traffic.
    fn check_sector_range(&self, sector: u32, count: u32) -> Result<(), FlashError> {
        let end = sector
            .checked_add(count)
            .and_then(|end| usize::try_from(end).ok())
            .and_then(|end| end.checked_mul(PAGE_SIZE))
            .ok_or(FlashError::AddressOutOfRange)?;
        if end > self.geometry.capacity() {
            return Err(FlashError::AddressOutOfRange);
        }
        Ok(())
    }

    /// Manufacturer and device ID as `(b0 << 16) | (b1 << 8) | b2`.
    pub async fn read_id(&mut self) -> Result<u32, FlashError> {
        self.select()?;
        let body = self.read_id_body().await;
        self.finish(body).await
    }

    async fn read_id_body(&mut self) -> Result<u32, FlashError> {
        self.exchange(opcode::READ_ID).await?;
        let b0 = self.exchange(self.config.dummy_byte).await?;
        let b1 = self.exchange(self.config.dummy_byte).await?;
        let b2 = self.exchange(self.config.dummy_byte).await?;
        Ok(u32::from_be_bytes([0, b0, b1, b2]))
    }

    /// Poll the status register until the device reports ready.
    ///
    /// There is no timeout: a device that never becomes ready hangs here.
    pub async fn wait_for_write_end(&mut self) -> Result<(), FlashError> {
        self.select()?;
        let body = self.poll_ready().await;
        self.finish(body).await
    }

    async fn poll_ready(&mut self) -> Result<(), FlashError> {
        self.exchange(opcode::STATUS_READ).await?;
        loop {
            let status = self.exchange(self.config.dummy_byte).await?;
            if status & opcode::STATUS_READY != 0 {
                return Ok(());
            }
        }
    }
}

/// Number of whole sectors to transfer, checking the buffer holds them.
fn sector_chunks(len: usize, count: u32) -> Result<usize, FlashError> {
    let count = usize::try_from(count).map_err(|_| FlashError::BufferTooSmall)?;
    let needed = count.checked_mul(PAGE_SIZE).ok_or(FlashError::BufferTooSmall)?;
    if len < needed {
        return Err(FlashError::BufferTooSmall);
    }
    Ok(count)
}

fn sector_address(first: u32, index: usize) -> Result<u32, FlashError> {
    u32::try_from(index)
        .ok()
        .and_then(|i| first.checked_add(i))
        .and_then(|s| s.checked_mul(PAGE_SIZE as u32))
        .ok_or(FlashError::AddressOutOfRange)
}
