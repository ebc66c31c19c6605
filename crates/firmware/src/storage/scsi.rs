//! SCSI transparent command set front end.
//!
//! [`ScsiHandler`] owns one [`MassStorage`] implementation, registered at
//! construction, and executes the Bulk-Only Transport command blocks a USB
//! host sends to it. Data phases use a caller-provided buffer: the response
//! for data-in commands, the host payload for data-out commands.
//!
//! Failed commands queue fixed-format sense data which the host collects
//! with REQUEST SENSE, oldest first.

use heapless::Deque;
use platform::storage::{MassStorage, MscError};

/// Operation codes understood by the handler.
pub mod op {
    /// TEST UNIT READY
    pub const TEST_UNIT_READY: u8 = 0x00;
    /// REQUEST SENSE
    pub const REQUEST_SENSE: u8 = 0x03;
    /// INQUIRY
    pub const INQUIRY: u8 = 0x12;
    /// MODE SENSE(6)
    pub const MODE_SENSE_6: u8 = 0x1A;
    /// START STOP UNIT
    pub const START_STOP_UNIT: u8 = 0x1B;
    /// PREVENT ALLOW MEDIUM REMOVAL
    pub const PREVENT_ALLOW_MEDIUM_REMOVAL: u8 = 0x1E;
    /// READ FORMAT CAPACITIES
    pub const READ_FORMAT_CAPACITIES: u8 = 0x23;
    /// READ CAPACITY(10)
    pub const READ_CAPACITY_10: u8 = 0x25;
    /// READ(10)
    pub const READ_10: u8 = 0x28;
    /// WRITE(10)
    pub const WRITE_10: u8 = 0x2A;
    /// VERIFY(10)
    pub const VERIFY_10: u8 = 0x2F;
}

/// Fixed-format sense data length.
pub const SENSE_DATA_LEN: usize = 18;

/// Pending sense entries kept for REQUEST SENSE.
const SENSE_QUEUE_DEPTH: usize = 4;

/// SCSI sense key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SenseKey {
    /// No error pending.
    NoSense = 0x00,
    /// The medium cannot be accessed.
    NotReady = 0x02,
    /// Unrecovered medium error.
    MediumError = 0x03,
    /// Bad command or parameter.
    IllegalRequest = 0x05,
    /// The medium is write protected.
    DataProtect = 0x07,
}

/// Additional sense codes.
pub mod asc {
    /// Unrecovered read error (with MEDIUM ERROR).
    pub const UNRECOVERED_READ_ERROR: u8 = 0x11;
    /// Write error (with MEDIUM ERROR).
    pub const WRITE_FAULT: u8 = 0x0C;
    /// Invalid command operation code.
    pub const INVALID_COMMAND: u8 = 0x20;
    /// Logical block address out of range.
    pub const ADDRESS_OUT_OF_RANGE: u8 = 0x21;
    /// Invalid field in CDB.
    pub const INVALID_FIELD_IN_COMMAND: u8 = 0x24;
    /// Logical unit not supported.
    pub const LOGICAL_UNIT_NOT_SUPPORTED: u8 = 0x25;
    /// Write protected.
    pub const WRITE_PROTECTED: u8 = 0x27;
    /// Medium not present.
    pub const MEDIUM_NOT_PRESENT: u8 = 0x3A;
}

/// One sense entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sense {
    /// Sense key
    pub key: SenseKey,
    /// Additional sense code
    pub asc: u8,
    /// Additional sense code qualifier
    pub ascq: u8,
}

impl Sense {
    const fn new(key: SenseKey, asc: u8) -> Self {
        Self { key, asc, ascq: 0 }
    }

    /// Fixed-format (response code 0x70) encoding.
    #[allow(clippy::indexing_slicing)] // constant indices into a fixed array
    pub fn to_bytes(self) -> [u8; SENSE_DATA_LEN] {
        let mut b = [0u8; SENSE_DATA_LEN];
        b[0] = 0x70;
        b[2] = self.key as u8;
        b[7] = (SENSE_DATA_LEN - 8) as u8;
        b[12] = self.asc;
        b[13] = self.ascq;
        b
    }

    fn from_msc(err: MscError, write: bool) -> Self {
        match err {
            MscError::MediumNotPresent => Self::new(SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT),
            MscError::WriteFault => Self::new(SenseKey::MediumError, asc::WRITE_FAULT),
            MscError::ReadFault | MscError::InvalidBuffer if write => {
                Self::new(SenseKey::MediumError, asc::WRITE_FAULT)
            }
            MscError::ReadFault | MscError::InvalidBuffer => {
                Self::new(SenseKey::MediumError, asc::UNRECOVERED_READ_ERROR)
            }
        }
    }
}

/// Command completion status for the command status wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandStatus {
    /// Command completed.
    Passed,
    /// Command failed; sense data is queued.
    Failed,
    /// The data phase does not fit the supplied buffer.
    PhaseError,
}

/// Result of one command block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outcome {
    /// Completion status
    pub status: CommandStatus,
    /// Bytes produced (data-in) or consumed (data-out)
    pub data_len: usize,
}

impl Outcome {
    const fn passed(data_len: usize) -> Self {
        Self {
            status: CommandStatus::Passed,
            data_len,
        }
    }

    const FAILED: Self = Self {
        status: CommandStatus::Failed,
        data_len: 0,
    };

    const PHASE_ERROR: Self = Self {
        status: CommandStatus::PhaseError,
        data_len: 0,
    };
}

/// SCSI command executor over a registered storage implementation.
pub struct ScsiHandler<S> {
    storage: S,
    sense: Deque<Sense, SENSE_QUEUE_DEPTH>,
}

impl<S: MassStorage> ScsiHandler<S> {
    /// Register `storage` as the implementation for every LUN it reports.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            sense: Deque::new(),
        }
    }

    /// Initialise every LUN; called once when the class layer starts.
    pub async fn init(&mut self) -> Result<(), MscError> {
        for lun in 0..=self.storage.max_lun() {
            self.storage.init(lun).await?;
        }
        Ok(())
    }

    /// Borrow the registered storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutably borrow the registered storage.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Oldest pending sense entry, if any, without consuming it.
    pub fn pending_sense(&self) -> Option<Sense> {
        self.sense.front().copied()
    }

    fn fail(&mut self, sense: Sense) -> Outcome {
        #[cfg(feature = "defmt")]
        defmt::debug!("scsi: command failed, sense {}", sense);
        if self.sense.is_full() {
            self.sense.pop_front();
        }
        // Cannot fail: a slot was just freed.
        let _ = self.sense.push_back(sense);
        Outcome::FAILED
    }

    fn illegal(&mut self, code: u8) -> Outcome {
        self.fail(Sense::new(SenseKey::IllegalRequest, code))
    }

    /// Execute one command block for `lun`.
    ///
    /// `data` receives the data-in phase or holds the data-out phase.
    pub async fn execute(&mut self, lun: u8, cdb: &[u8], data: &mut [u8]) -> Outcome {
        let Some(&opcode) = cdb.first() else {
            return self.illegal(asc::INVALID_COMMAND);
        };
        if lun > self.storage.max_lun() {
            return self.illegal(asc::LOGICAL_UNIT_NOT_SUPPORTED);
        }

        match opcode {
            op::TEST_UNIT_READY => self.test_unit_ready(lun).await,
            op::REQUEST_SENSE => self.request_sense(cdb, data),
            op::INQUIRY => self.inquiry(lun, cdb, data),
            op::MODE_SENSE_6 => self.mode_sense(lun, cdb, data),
            op::START_STOP_UNIT | op::PREVENT_ALLOW_MEDIUM_REMOVAL => Outcome::passed(0),
            op::READ_FORMAT_CAPACITIES => self.read_format_capacities(lun, cdb, data).await,
            op::READ_CAPACITY_10 => self.read_capacity(lun, data).await,
            op::READ_10 => self.read10(lun, cdb, data).await,
            op::WRITE_10 => self.write10(lun, cdb, data).await,
            op::VERIFY_10 => self.verify10(lun, cdb).await,
            _ => self.illegal(asc::INVALID_COMMAND),
        }
    }

    async fn test_unit_ready(&mut self, lun: u8) -> Outcome {
        match self.storage.is_ready(lun).await {
            Ok(()) => Outcome::passed(0),
            Err(e) => self.fail(Sense::from_msc(e, false)),
        }
    }

    fn request_sense(&mut self, cdb: &[u8], data: &mut [u8]) -> Outcome {
        let alloc = usize::from(cdb.get(4).copied().unwrap_or(0));
        let sense = self
            .sense
            .pop_front()
            .unwrap_or(Sense::new(SenseKey::NoSense, 0));
        Outcome::passed(copy_out(data, &sense.to_bytes(), alloc))
    }

    fn inquiry(&mut self, lun: u8, cdb: &[u8], data: &mut [u8]) -> Outcome {
        let Some(alloc) = be_u16(cdb, 3) else {
            return self.illegal(asc::INVALID_FIELD_IN_COMMAND);
        };
        // Vital product data pages are not supported.
        if cdb.get(1).is_some_and(|b| b & 0x01 != 0) {
            return self.illegal(asc::INVALID_FIELD_IN_COMMAND);
        }
        let inquiry = *self.storage.inquiry_data(lun);
        Outcome::passed(copy_out(data, &inquiry, usize::from(alloc)))
    }

    fn mode_sense(&mut self, lun: u8, cdb: &[u8], data: &mut [u8]) -> Outcome {
        let alloc = usize::from(cdb.get(4).copied().unwrap_or(0));
        let wp = if self.storage.is_write_protected(lun) { 0x80 } else { 0x00 };
        // Header only: mode data length, medium type, device parameter, block descriptor length.
        let header = [0x03, 0x00, wp, 0x00];
        Outcome::passed(copy_out(data, &header, alloc))
    }

    async fn read_format_capacities(&mut self, lun: u8, cdb: &[u8], data: &mut [u8]) -> Outcome {
        let alloc = usize::from(be_u16(cdb, 7).unwrap_or(0));
        let cap = match self.storage.capacity(lun).await {
            Ok(cap) => cap,
            Err(e) => return self.fail(Sense::from_msc(e, false)),
        };
        let count = cap.block_count.to_be_bytes();
        let size = cap.block_size.to_be_bytes();
        let list = [
            0x00, 0x00, 0x00, 0x08, // capacity list header
            count[0], count[1], count[2], count[3],
            0x02, // formatted media
            size[1], size[2], size[3],
        ];
        Outcome::passed(copy_out(data, &list, alloc))
    }

    async fn read_capacity(&mut self, lun: u8, data: &mut [u8]) -> Outcome {
        let cap = match self.storage.capacity(lun).await {
            Ok(cap) => cap,
            Err(e) => return self.fail(Sense::from_msc(e, false)),
        };
        // An empty medium has no last block to report.
        let Some(last_lba) = cap.last_lba() else {
            return self.fail(Sense::new(SenseKey::NotReady, asc::MEDIUM_NOT_PRESENT));
        };
        let mut reply = [0u8; 8];
        let (lba, size) = reply.split_at_mut(4);
        lba.copy_from_slice(&last_lba.to_be_bytes());
        size.copy_from_slice(&cap.block_size.to_be_bytes());
        Outcome::passed(copy_out(data, &reply, reply.len()))
    }

    /// Ready and range checks shared by READ, WRITE and VERIFY.
    ///
    /// Returns the transfer length in bytes.
    async fn check_transfer(&mut self, lun: u8, cdb: &[u8]) -> Result<(u32, u16, usize), Outcome> {
        let (Some(lba), Some(blocks)) = (be_u32(cdb, 2), be_u16(cdb, 7)) else {
            return Err(self.illegal(asc::INVALID_FIELD_IN_COMMAND));
        };
        if let Err(e) = self.storage.is_ready(lun).await {
            return Err(self.fail(Sense::from_msc(e, false)));
        }
        let cap = match self.storage.capacity(lun).await {
            Ok(cap) => cap,
            Err(e) => return Err(self.fail(Sense::from_msc(e, false))),
        };
        if lba
            .checked_add(u32::from(blocks))
            .map_or(true, |end| end > cap.block_count)
        {
            return Err(self.illegal(asc::ADDRESS_OUT_OF_RANGE));
        }
        let bytes = usize::from(blocks)
            .checked_mul(cap.block_size as usize)
            .ok_or(Outcome::PHASE_ERROR)?;
        Ok((lba, blocks, bytes))
    }

    async fn read10(&mut self, lun: u8, cdb: &[u8], data: &mut [u8]) -> Outcome {
        let (lba, blocks, bytes) = match self.check_transfer(lun, cdb).await {
            Ok(t) => t,
            Err(outcome) => return outcome,
        };
        if blocks == 0 {
            return Outcome::passed(0);
        }
        let Some(buf) = data.get_mut(..bytes) else {
            return Outcome::PHASE_ERROR;
        };
        match self.storage.read(lun, buf, lba, blocks).await {
            Ok(()) => Outcome::passed(bytes),
            Err(e) => self.fail(Sense::from_msc(e, false)),
        }
    }

    async fn write10(&mut self, lun: u8, cdb: &[u8], data: &[u8]) -> Outcome {
        if self.storage.is_write_protected(lun) {
            return self.fail(Sense::new(SenseKey::DataProtect, asc::WRITE_PROTECTED));
        }
        let (lba, blocks, bytes) = match self.check_transfer(lun, cdb).await {
            Ok(t) => t,
            Err(outcome) => return outcome,
        };
        if blocks == 0 {
            return Outcome::passed(0);
        }
        let Some(buf) = data.get(..bytes) else {
            return Outcome::PHASE_ERROR;
        };
        match self.storage.write(lun, buf, lba, blocks).await {
            Ok(()) => Outcome::passed(bytes),
            Err(e) => self.fail(Sense::from_msc(e, true)),
        }
    }

    async fn verify10(&mut self, lun: u8, cdb: &[u8]) -> Outcome {
        // Byte-by-byte comparison against a data-out phase is not supported.
        if cdb.get(1).is_some_and(|b| b & 0x02 != 0) {
            return self.illegal(asc::INVALID_FIELD_IN_COMMAND);
        }
        match self.check_transfer(lun, cdb).await {
            Ok(_) => Outcome::passed(0),
            Err(outcome) => outcome,
        }
    }
}

/// Copy up to `alloc` bytes of `src` into `dst`; returns the count copied.
fn copy_out(dst: &mut [u8], src: &[u8], alloc: usize) -> usize {
    let n = src.len().min(alloc).min(dst.len());
    if let (Some(d), Some(s)) = (dst.get_mut(..n), src.get(..n)) {
        d.copy_from_slice(s);
    }
    n
}

fn be_u16(cdb: &[u8], at: usize) -> Option<u16> {
    let bytes = cdb.get(at..at.checked_add(2)?)?;
    Some(u16::from_be_bytes(bytes.try_into().ok()?))
}

fn be_u32(cdb: &[u8], at: usize) -> Option<u32> {
    let bytes = cdb.get(at..at.checked_add(4)?)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}
