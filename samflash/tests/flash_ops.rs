//! Wire level tests for the flash operations, run against a fake probe.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use samflash::flashing::{FlashError, FlashProgress, ProgressEvent, FLASH_ROW_SIZE};
use samflash::{ConfigError, Error, FakeProbe, FlashOptions, Permissions, Session};

fn attach(probe: &FakeProbe, options: FlashOptions, permissions: Permissions) -> Session {
    Session::attach(Box::new(probe.clone()), options, permissions).unwrap()
}

#[test]
fn identifies_each_supported_device() {
    for device in samflash::registry::devices() {
        // A nonzero revision field must not get in the way.
        let probe = FakeProbe::new(device.did | 0x200, device.flash_size);
        let session =
            Session::attach(Box::new(probe), FlashOptions::new(), Permissions::new()).unwrap();
        assert_eq!(session.device().name, device.name);
        assert_eq!(session.device().flash_size, device.flash_size);
    }
}

#[test]
fn rejects_unknown_devices() {
    let probe = FakeProbe::new(0x1234_5678, 512 * 1024);
    let error =
        Session::attach(Box::new(probe), FlashOptions::new(), Permissions::new()).unwrap_err();
    assert_eq!(
        error.to_string(),
        "unknown target device (DSU_DID = 0x12345678)"
    );
}

#[test]
fn attach_halts_the_core_and_resets() {
    let probe = FakeProbe::samd51j19a();
    let _session = attach(&probe, FlashOptions::new(), Permissions::new());
    let writes = probe.word_writes();
    assert_eq!(
        writes[..3],
        [
            (0xe000_edf0, 0xa05f_0003),
            (0xe000_edfc, 0x0000_0001),
            (0xe000_ed0c, 0x05fa_0004),
        ]
    );
}

#[test]
fn detach_releases_the_target() {
    let probe = FakeProbe::samd51j19a();
    let session = attach(&probe, FlashOptions::new(), Permissions::new());
    session.detach().unwrap();
    let writes = probe.word_writes();
    assert_eq!(
        writes[3..],
        [(0xe000_edfc, 0x0000_0000), (0xe000_ed0c, 0x05fa_0004)]
    );
}

#[test]
fn dropping_the_session_releases_the_target() {
    let probe = FakeProbe::samd51j19a();
    let session = attach(&probe, FlashOptions::new(), Permissions::new());
    drop(session);
    let writes = probe.word_writes();
    assert_eq!(
        writes[3..],
        [(0xe000_edfc, 0x0000_0000), (0xe000_ed0c, 0x05fa_0004)]
    );
}

#[test]
fn program_then_verify_round_trip() {
    let probe = FakeProbe::samd51j19a();
    let image: Vec<u8> = (0..20_000).map(|i| (i % 251) as u8).collect();
    let mut options = FlashOptions::new();
    options.image = Some(image.clone());

    let mut session = attach(&probe, options, Permissions::new());
    session.program(&FlashProgress::empty()).unwrap();
    session.verify(&FlashProgress::empty()).unwrap();

    let flash = probe.flash();
    assert_eq!(flash[..20_000], image[..]);
    // The last row is padded with the erased state.
    assert!(flash[20_000..24_576].iter().all(|&byte| byte == 0xff));
}

#[test]
fn read_then_reprogram_round_trip() {
    let pattern: Vec<u8> = (0..20_000).map(|i| (i * 7 % 256) as u8).collect();
    let source = FakeProbe::samd51j19a().with_flash_contents(FLASH_ROW_SIZE, &pattern);
    let mut options = FlashOptions::new();
    options.offset = FLASH_ROW_SIZE;
    options.read_size = pattern.len() as u32;

    let mut session = attach(&source, options, Permissions::new());
    let image = session.read(&FlashProgress::empty()).unwrap();
    assert_eq!(image, pattern);

    // The dump programs back into a second device without a difference.
    let target = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.offset = FLASH_ROW_SIZE;
    options.image = Some(image);

    let mut session = attach(&target, options, Permissions::new());
    session.program(&FlashProgress::empty()).unwrap();
    session.verify(&FlashProgress::empty()).unwrap();
    assert_eq!(target.flash(), source.flash());
}

#[test]
fn program_configures_the_nvm_controller() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.image = Some(vec![0x42; FLASH_ROW_SIZE as usize]);

    let mut session = attach(&probe, options, Permissions::new());
    session.program(&FlashProgress::empty()).unwrap();

    let writes = probe.word_writes();
    assert!(writes.contains(&(0x4100_4000, 0xc0c4)));
    // One address write per row plus one per page.
    let addr_writes = writes
        .iter()
        .filter(|(address, _)| *address == 0x4100_4014)
        .count();
    assert_eq!(addr_writes, 17);
}

#[test]
fn program_rejects_a_locked_device() {
    let probe = FakeProbe::samd51j19a().with_protection();
    let mut options = FlashOptions::new();
    options.image = Some(vec![0; 512]);

    let mut session = attach(&probe, options, Permissions::new());
    let error = session.program(&FlashProgress::empty()).unwrap_err();
    let Error::Flash(inner) = error else {
        panic!("expected a flash error, got {error:?}");
    };
    assert_eq!(
        inner.to_string(),
        "device is locked, perform a chip erase before programming"
    );
}

#[test]
fn program_needs_an_image() {
    let probe = FakeProbe::samd51j19a();
    let mut session = attach(&probe, FlashOptions::new(), Permissions::new());
    let error = session.program(&FlashProgress::empty()).unwrap_err();
    assert!(matches!(
        error,
        Error::Flash(FlashError::Config(ConfigError::MissingImage))
    ));
}

#[test]
fn program_emits_row_progress() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.image = Some(vec![0xaa; 2 * FLASH_ROW_SIZE as usize]);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let progress = FlashProgress::new(move |event| sink.borrow_mut().push(event));

    let mut session = attach(&probe, options, Permissions::new());
    session.program(&progress).unwrap();

    assert_eq!(
        events.borrow()[..],
        [
            ProgressEvent::StartedProgramming { length: 16384 },
            ProgressEvent::RowProgrammed { address: 0 },
            ProgressEvent::RowProgrammed { address: 8192 },
            ProgressEvent::FinishedProgramming,
        ]
    );
}

#[test]
fn erase_requires_permission() {
    let probe = FakeProbe::samd51j19a();
    let mut session = attach(&probe, FlashOptions::new(), Permissions::new());
    let error = session.erase_all(&FlashProgress::empty()).unwrap_err();
    assert!(matches!(error, Error::MissingPermissions(_)));
}

#[test]
fn lock_requires_permission() {
    let probe = FakeProbe::samd51j19a();
    let mut session = attach(&probe, FlashOptions::new(), Permissions::new());
    assert!(matches!(
        session.lock().unwrap_err(),
        Error::MissingPermissions(_)
    ));
}

#[test]
fn erase_unlocks_the_device_again() {
    let probe = FakeProbe::samd51j19a().with_protection();
    let mut options = FlashOptions::new();
    options.image = Some(vec![0x42; 512]);

    let mut session = attach(&probe, options, Permissions::new().allow_erase_all());
    session.erase_all(&FlashProgress::empty()).unwrap();
    assert!(!probe.protected());
    // The erase settles before the first status poll.
    assert_eq!(probe.sleeps(), vec![Duration::from_millis(100)]);

    session.program(&FlashProgress::empty()).unwrap();
    assert_eq!(probe.flash()[..512], [0x42; 512][..]);
}

#[test]
fn erase_polls_until_the_dsu_is_done() {
    let probe = FakeProbe::samd51j19a().with_erase_latency(3);
    let mut session = attach(&probe, FlashOptions::new(), Permissions::new().allow_erase_all());
    session.erase_all(&FlashProgress::empty()).unwrap();
    assert_eq!(probe.dsu_polls(), 4);
}

#[test]
fn lock_sets_the_security_bit() {
    let probe = FakeProbe::samd51j19a();
    let mut session = attach(&probe, FlashOptions::new(), Permissions::new().allow_lock());
    session.lock().unwrap();

    assert!(probe.security_bit());
    let writes = probe.word_writes();
    // The key goes through CTRLA, without a ready poll.
    assert!(writes.contains(&(0x4100_4000, 0xa516)));
    assert!(!writes.contains(&(0x4100_4004, 0xa516)));
    assert_eq!(probe.nvm_status_polls(), 0);
}

#[test]
fn verify_reports_the_first_mismatch() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.image = Some(vec![0x11; 2000]);

    let mut session = attach(&probe, options, Permissions::new());
    session.program(&FlashProgress::empty()).unwrap();
    probe.set_flash_byte(700, 0x99);
    probe.set_flash_byte(701, 0x98);

    let error = session.verify(&FlashProgress::empty()).unwrap_err();
    let Error::Flash(inner) = error else {
        panic!("expected a flash error, got {error:?}");
    };
    assert_eq!(
        inner.to_string(),
        "verification failed at address 0x000002bc: expected 0x11, read 0x99"
    );
}

#[test]
fn verify_ignores_flash_beyond_the_image() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.image = Some(vec![0x22; 300]);

    let mut session = attach(&probe, options, Permissions::new());
    session.program(&FlashProgress::empty()).unwrap();
    probe.set_flash_byte(400, 0x00);
    session.verify(&FlashProgress::empty()).unwrap();
}

#[test]
fn read_returns_the_flash_contents() {
    let pattern: Vec<u8> = (0..1200u32).map(|i| (i * 7 % 256) as u8).collect();
    let probe = FakeProbe::samd51j19a().with_flash_contents(0, &pattern);
    let mut options = FlashOptions::new();
    options.read_size = 1200;

    let mut session = attach(&probe, options, Permissions::new());
    let data = session.read(&FlashProgress::empty()).unwrap();
    assert_eq!(data, pattern);
    // Whole pages go over the wire, the tail is cut afterwards.
    assert_eq!(probe.block_reads(), vec![(0, 512), (512, 512), (1024, 512)]);
}

#[test]
fn reading_nothing_is_fine() {
    let probe = FakeProbe::samd51j19a();
    let mut session = attach(&probe, FlashOptions::new(), Permissions::new());
    let data = session.read(&FlashProgress::empty()).unwrap();
    assert!(data.is_empty());
    assert!(probe.block_reads().is_empty());
}

#[test]
fn offsets_must_be_row_aligned() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.offset = 100;
    let error = Session::attach(Box::new(probe), options, Permissions::new()).unwrap_err();
    assert!(matches!(
        error,
        Error::Config(ConfigError::UnalignedOffset { .. })
    ));
}

#[test]
fn the_image_must_fit_the_flash() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.offset = 63 * FLASH_ROW_SIZE;
    options.image = Some(vec![0; 2 * FLASH_ROW_SIZE as usize]);
    let error = Session::attach(Box::new(probe), options, Permissions::new()).unwrap_err();
    assert!(matches!(
        error,
        Error::Config(ConfigError::ImageOutOfBounds { .. })
    ));
}

#[test]
fn the_read_window_must_fit_the_flash() {
    let probe = FakeProbe::samd51j19a();
    let mut options = FlashOptions::new();
    options.read_size = 512 * 1024 + 1;
    let error = Session::attach(Box::new(probe), options, Permissions::new()).unwrap_err();
    assert!(matches!(
        error,
        Error::Config(ConfigError::ReadOutOfBounds { .. })
    ));
}
