//! Raw SPI DataFlash
//!
//! [`DataFlash`] gives page-granular program, read and erase primitives plus
//! 512-byte sector helpers. It also implements the `embedded-storage-async`
//! NOR-flash traits so generic storage code can sit on top of it.
//!
//! Command opcodes and the page geometry live in
//! [`platform::flash_config`].

mod dataflash;
mod nor;

pub use dataflash::{DataFlash, FlashError};
