//! Mass-storage integration tests: SCSI front end over the SD-card LUN.
// Integration test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
)]
//!
//! Drives `ScsiHandler` with the command sequence a host issues on
//! enumeration and during a card swap, checking what the host sees.
//!
//! Run with: cargo test -p firmware --test integration_storage

use firmware::storage::scsi::{asc, op};
use firmware::storage::{CommandStatus, ScsiHandler, SdMassStorage, SenseKey};
use platform::mocks::MockSdCard;
use platform::storage::{status_code, MassStorage, MscError};

type Handler = ScsiHandler<SdMassStorage<MockSdCard>>;

fn cdb10(opcode: u8, lba: u32, blocks: u16) -> [u8; 10] {
    let l = lba.to_be_bytes();
    let b = blocks.to_be_bytes();
    [opcode, 0, l[0], l[1], l[2], l[3], 0, b[0], b[1], 0]
}

async fn request_sense(scsi: &mut Handler) -> (u8, u8) {
    let mut buf = [0u8; 18];
    let out = scsi.execute(0, &[op::REQUEST_SENSE, 0, 0, 0, 18, 0], &mut buf).await;
    assert_eq!(out.status, CommandStatus::Passed);
    (buf[2], buf[12])
}

async fn unit_ready(scsi: &mut Handler) -> CommandStatus {
    scsi.execute(0, &[op::TEST_UNIT_READY, 0, 0, 0, 0, 0], &mut []).await.status
}

/// The enumeration sequence a host runs against a freshly plugged device.
#[tokio::test]
async fn test_host_enumeration_sequence() {
    let mut scsi = ScsiHandler::new(SdMassStorage::new(MockSdCard::new(2048)));
    scsi.init().await.expect("init never fails");

    let mut inquiry = [0u8; 36];
    let out = scsi.execute(0, &[op::INQUIRY, 0, 0, 0, 36, 0], &mut inquiry).await;
    assert_eq!(out.data_len, 36);
    assert_eq!(&inquiry[16..32], b"microSD Flash   ");
    assert_eq!(&inquiry[32..36], b"1.00");

    assert_eq!(unit_ready(&mut scsi).await, CommandStatus::Passed);

    let mut cap = [0u8; 8];
    scsi.execute(0, &cdb10(op::READ_CAPACITY_10, 0, 0), &mut cap).await;
    assert_eq!(u32::from_be_bytes(cap[..4].try_into().unwrap()), 2047);
    assert_eq!(u32::from_be_bytes(cap[4..].try_into().unwrap()), 512);

    let mut mbr = [0u8; 512];
    let out = scsi.execute(0, &cdb10(op::READ_10, 0, 1), &mut mbr).await;
    assert_eq!(out.status, CommandStatus::Passed);
    assert_eq!(out.data_len, 512);
}

/// Pulling the card and putting it back: the host sees NOT READY once,
/// then the card is re-initialised on the next TEST UNIT READY.
#[tokio::test]
async fn test_card_swap_reinitialises_once() {
    let mut scsi = ScsiHandler::new(SdMassStorage::new(MockSdCard::new(64)));
    scsi.init().await.unwrap();
    assert_eq!(scsi.storage().card().init_calls(), 1);

    scsi.storage_mut().card_mut().set_present(false);
    assert_eq!(unit_ready(&mut scsi).await, CommandStatus::Failed);
    assert_eq!(
        request_sense(&mut scsi).await,
        (SenseKey::NotReady as u8, asc::MEDIUM_NOT_PRESENT)
    );

    // Reads while absent never reach the card or its bus.
    let mut buf = [0u8; 512];
    let out = scsi.execute(0, &cdb10(op::READ_10, 0, 1), &mut buf).await;
    assert_eq!(out.status, CommandStatus::Failed);
    assert_eq!(scsi.storage().card().read_calls(), 0);
    assert!(scsi.storage().card().exchanged().is_empty());

    scsi.storage_mut().card_mut().set_present(true);
    scsi.storage_mut().card_mut().set_sector_count(128);
    assert_eq!(unit_ready(&mut scsi).await, CommandStatus::Passed);
    assert_eq!(unit_ready(&mut scsi).await, CommandStatus::Passed);
    assert_eq!(scsi.storage().card().init_calls(), 2);

    // The new card's size is visible immediately.
    let mut cap = [0u8; 8];
    scsi.execute(0, &cdb10(op::READ_CAPACITY_10, 0, 0), &mut cap).await;
    assert_eq!(u32::from_be_bytes(cap[..4].try_into().unwrap()), 127);
}

/// Multi-block write followed by read returns the same bytes.
#[tokio::test]
async fn test_multi_block_round_trip() {
    let mut scsi = ScsiHandler::new(SdMassStorage::new(MockSdCard::new(64)));
    let mut payload: Vec<u8> = (0..4 * 512u32).map(|i| (i * 31 % 256) as u8).collect();
    let out = scsi.execute(0, &cdb10(op::WRITE_10, 12, 4), &mut payload).await;
    assert_eq!(out.status, CommandStatus::Passed);

    let mut back = vec![0u8; payload.len()];
    let out = scsi.execute(0, &cdb10(op::READ_10, 12, 4), &mut back).await;
    assert_eq!(out.data_len, payload.len());
    assert_eq!(back, payload);
}

/// Driver failures surface as MEDIUM ERROR and the class status code 5.
#[tokio::test]
async fn test_driver_failure_reporting() {
    let mut card = MockSdCard::new(16);
    card.fail_read(true);
    let mut storage = SdMassStorage::new(card);

    let mut buf = [0u8; 512];
    let result = storage.read(0, &mut buf, 0, 1).await;
    assert_eq!(result, Err(MscError::ReadFault));
    assert_eq!(status_code(&result), 5);
    assert_eq!(storage.card().exchanged(), &[0xFF]);

    let mut scsi = ScsiHandler::new(storage);
    let out = scsi.execute(0, &cdb10(op::READ_10, 0, 1), &mut buf).await;
    assert_eq!(out.status, CommandStatus::Failed);
    assert_eq!(
        request_sense(&mut scsi).await,
        (SenseKey::MediumError as u8, asc::UNRECOVERED_READ_ERROR)
    );
}

/// Absent media maps to class status -1 for every data path.
#[tokio::test]
async fn test_absent_media_status_codes() {
    let mut storage = SdMassStorage::new(MockSdCard::absent());
    assert_eq!(status_code(&storage.capacity(0).await), -1);
    assert_eq!(status_code(&storage.is_ready(0).await), -1);
    let mut buf = [0u8; 512];
    assert_eq!(status_code(&storage.read(0, &mut buf, 0, 1).await), -1);
    assert_eq!(status_code(&storage.write(0, &buf, 0, 1).await), -1);
    assert_eq!(status_code(&storage.init(0).await), 0);
}
