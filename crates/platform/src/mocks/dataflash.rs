//! Byte-level DataFlash simulator.
//!
//! [`SimulatedDataFlash`] models an AT45DB-class part behind an SPI bus and a
//! chip-select pin. The two handles returned by [`SimulatedDataFlash::spi`]
//! and [`SimulatedDataFlash::cs`] share one device state, so a driver can own
//! them while the test keeps the simulator to inspect memory afterwards.
//!
//! Supported commands: page program (`0x82`), continuous read (`0xE8`), page
//! erase (`0x81`), status read (`0xD7`) and ID read (`0x9F`). Program and
//! erase take effect when chip select is released, like the real part.
//! Protocol misuse (bytes clocked while deselected, a command issued while
//! busy, an address outside the device) is counted rather than rejected.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::spi::{Error as SpiError, ErrorKind as SpiErrorKind};

use crate::flash_config::{opcode, DataFlashGeometry, PAGE_SIZE};

/// AT45DB321D: Atmel manufacturer code, family/density, sub-code.
pub const DEFAULT_DEVICE_ID: [u8; 3] = [0x1F, 0x27, 0x01];

/// Density bits reported alongside the ready flag in the status byte.
const STATUS_DENSITY: u8 = 0x34;

/// Bytes of `op + 3 address bytes`.
const HEADER_LEN: usize = 4;

/// Injected bus fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedBusFault;

impl SpiError for SimulatedBusFault {
    fn kind(&self) -> SpiErrorKind {
        SpiErrorKind::Other
    }
}

struct FlashState {
    geometry: DataFlashGeometry,
    memory: Vec<u8>,
    id: [u8; 3],
    selected: bool,
    frame: Vec<u8>,
    read_cursor: u32,
    busy_polls_per_op: u32,
    busy_remaining: u32,
    opcodes: Vec<u8>,
    violations: usize,
    selects: usize,
    flushes: usize,
    fault_after: Option<usize>,
}

impl FlashState {
    fn exchange(&mut self, byte: u8) -> Result<u8, SimulatedBusFault> {
        if let Some(remaining) = self.fault_after.as_mut() {
            if *remaining == 0 {
                return Err(SimulatedBusFault);
            }
            *remaining -= 1;
        }
        if !self.selected {
            self.violations += 1;
            return Ok(0xFF);
        }

        let index = self.frame.len();
        self.frame.push(byte);
        if index == 0 {
            if self.busy_remaining > 0 && byte != opcode::STATUS_READ {
                self.violations += 1;
            }
            self.opcodes.push(byte);
            return Ok(0xFF);
        }

        match self.frame[0] {
            opcode::READ_ID => Ok(self.id.get(index - 1).copied().unwrap_or(0x00)),
            opcode::STATUS_READ => {
                let ready = if self.busy_remaining > 0 {
                    self.busy_remaining -= 1;
                    0
                } else {
                    opcode::STATUS_READY
                };
                Ok(ready | STATUS_DENSITY)
            }
            opcode::CONTINUOUS_READ => {
                let data_start = HEADER_LEN + opcode::READ_DUMMY_BYTES;
                if index == HEADER_LEN - 1 {
                    match self.geometry.linear_address(self.frame_address()) {
                        Some(linear) => self.read_cursor = linear,
                        None => self.violations += 1,
                    }
                }
                if index < data_start {
                    return Ok(0xFF);
                }
                let out = self.memory[self.read_cursor as usize];
                self.read_cursor = (self.read_cursor + 1) % self.memory.len() as u32;
                Ok(out)
            }
            _ => Ok(0xFF),
        }
    }

    fn frame_address(&self) -> u32 {
        (u32::from(self.frame[1]) << 16) | (u32::from(self.frame[2]) << 8) | u32::from(self.frame[3])
    }

    fn deselect(&mut self) {
        if self.selected && self.frame.len() >= HEADER_LEN {
            match self.frame[0] {
                opcode::PAGE_PROGRAM => self.program(),
                opcode::PAGE_ERASE => self.erase(),
                _ => {}
            }
        }
        self.selected = false;
        self.frame.clear();
    }

    fn program(&mut self) {
        let Some(linear) = self.geometry.linear_address(self.frame_address()) else {
            self.violations += 1;
            return;
        };
        let page_start = linear as usize / PAGE_SIZE * PAGE_SIZE;
        let offset = linear as usize % PAGE_SIZE;
        // Program through buffer erases the page first.
        self.memory[page_start..page_start + PAGE_SIZE].fill(0xFF);
        for (i, byte) in self.frame[HEADER_LEN..].iter().enumerate() {
            // The page buffer wraps at its end.
            let at = page_start + (offset + i) % PAGE_SIZE;
            self.memory[at] = *byte;
        }
        self.busy_remaining = self.busy_polls_per_op;
    }

    fn erase(&mut self) {
        let shift = self.geometry.page_address_shift();
        let page = (self.frame_address() & 0x00FF_FFFF) >> shift;
        if page >= self.geometry.page_count() {
            self.violations += 1;
            return;
        }
        let start = page as usize * PAGE_SIZE;
        self.memory[start..start + PAGE_SIZE].fill(0xFF);
        self.busy_remaining = self.busy_polls_per_op;
    }
}

/// Shared-state DataFlash simulator.
#[derive(Clone)]
pub struct SimulatedDataFlash {
    state: Rc<RefCell<FlashState>>,
}

impl SimulatedDataFlash {
    /// Erased device (all `0xFF`) with the given geometry.
    pub fn new(geometry: DataFlashGeometry) -> Self {
        Self {
            state: Rc::new(RefCell::new(FlashState {
                geometry,
                memory: vec![0xFF; geometry.capacity()],
                id: DEFAULT_DEVICE_ID,
                selected: false,
                frame: Vec::new(),
                read_cursor: 0,
                busy_polls_per_op: 0,
                busy_remaining: 0,
                opcodes: Vec::new(),
                violations: 0,
                selects: 0,
                flushes: 0,
                fault_after: None,
            })),
        }
    }

    /// SPI bus handle.
    pub fn spi(&self) -> SimulatedSpi {
        SimulatedSpi {
            state: Rc::clone(&self.state),
        }
    }

    /// Chip-select pin handle (active low).
    pub fn cs(&self) -> SimulatedCs {
        SimulatedCs {
            state: Rc::clone(&self.state),
        }
    }

    /// Report `id` from the ID read command.
    pub fn set_device_id(&self, id: [u8; 3]) {
        self.state.borrow_mut().id = id;
    }

    /// Number of busy status reads after every program or erase.
    pub fn set_busy_polls(&self, polls: u32) {
        self.state.borrow_mut().busy_polls_per_op = polls;
    }

    /// Fail every bus byte after `bytes` more successful ones.
    pub fn fail_after(&self, bytes: usize) {
        self.state.borrow_mut().fault_after = Some(bytes);
    }

    /// Stop injecting bus faults.
    pub fn clear_fault(&self) {
        self.state.borrow_mut().fault_after = None;
    }

    /// Copy of `len` bytes of memory starting at linear `address`.
    pub fn read_memory(&self, address: usize, len: usize) -> Vec<u8> {
        self.state.borrow().memory[address..address + len].to_vec()
    }

    /// Overwrite memory at linear `address` without going through the bus.
    pub fn load_memory(&self, address: usize, data: &[u8]) {
        self.state.borrow_mut().memory[address..address + data.len()].copy_from_slice(data);
    }

    /// Opcodes seen so far, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.state.borrow().opcodes.clone()
    }

    /// Protocol violations seen so far.
    pub fn violations(&self) -> usize {
        self.state.borrow().violations
    }

    /// Whether chip select is currently asserted.
    pub fn is_selected(&self) -> bool {
        self.state.borrow().selected
    }

    /// Number of chip-select assertions.
    pub fn select_count(&self) -> usize {
        self.state.borrow().selects
    }

    /// Number of bus flushes.
    pub fn flush_count(&self) -> usize {
        self.state.borrow().flushes
    }

    /// Status reads still reporting busy.
    pub fn busy_remaining(&self) -> u32 {
        self.state.borrow().busy_remaining
    }
}

/// SPI side of a [`SimulatedDataFlash`].
pub struct SimulatedSpi {
    state: Rc<RefCell<FlashState>>,
}

impl SimulatedSpi {
    fn exchange(&mut self, byte: u8) -> Result<u8, SimulatedBusFault> {
        self.state.borrow_mut().exchange(byte)
    }
}

impl embedded_hal::spi::ErrorType for SimulatedSpi {
    type Error = SimulatedBusFault;
}

impl embedded_hal_async::spi::SpiBus<u8> for SimulatedSpi {
    async fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.exchange(0x00)?;
        }
        Ok(())
    }

    async fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for word in words {
            self.exchange(*word)?;
        }
        Ok(())
    }

    async fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        let len = read.len().max(write.len());
        for i in 0..len {
            let out = self.exchange(write.get(i).copied().unwrap_or(0x00))?;
            if let Some(slot) = read.get_mut(i) {
                *slot = out;
            }
        }
        Ok(())
    }

    async fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.exchange(*word)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().flushes += 1;
        Ok(())
    }
}

/// Chip-select side of a [`SimulatedDataFlash`].
pub struct SimulatedCs {
    state: Rc<RefCell<FlashState>>,
}

impl embedded_hal::digital::ErrorType for SimulatedCs {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for SimulatedCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if !state.selected {
            state.selected = true;
            state.selects += 1;
            state.frame.clear();
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.state.borrow_mut().deselect();
        Ok(())
    }
}
