//! End-to-end playback tests through the public controller API.
//!
//! Each test spins up the real display thread against a headless
//! presenter whose probe channel reports every uploaded frame. Frames
//! are tagged through their first byte so the tests can follow which
//! slot reached the surface on each tick. Staged commands travel the
//! same channel in order, so a grab issued after a stage always
//! observes the staged state.

use plm_core::{
    FrameLayout, HeadlessPresenter, NullDeviceLink, PackedFrame, PlaybackMode, PlmConfig,
    PlmController, PlmError, LUT_BREAKPOINTS,
};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};
use test_log::test;

/// Small geometry and a fast tick so sequences finish in milliseconds.
fn test_config(width: usize, height: usize, capacity: usize) -> PlmConfig {
    let mut config = PlmConfig::default();
    config.geometry.width = width;
    config.geometry.height = height;
    config.playback.capacity = capacity;
    config.playback.refresh_rate = 2000.0;
    config.playback.sequence_end_delay_ms = 0;
    config.gpu.prefer_gpu = false;
    config
}

/// A packed frame whose first byte identifies it on the probe.
fn marker_frame(width: usize, height: usize, tag: u8) -> PackedFrame {
    let mut frame = PackedFrame::new(2 * width, 2 * height);
    frame.as_bytes_mut()[0] = tag;
    frame
}

fn wait_for_tag(probe: &Receiver<Box<[u8]>>, tag: u8) {
    for _ in 0..10_000 {
        let frame = probe
            .recv_timeout(Duration::from_secs(2))
            .expect("probe stalled");
        if frame[0] == tag {
            return;
        }
    }
    panic!("tag {tag} never reached the surface");
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("timed out waiting for {what}");
}

/// Collapses consecutive repeats, leaving the order slots appeared in.
fn dedup(tags: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    for &tag in tags {
        if out.last() != Some(&tag) {
            out.push(tag);
        }
    }
    out
}

// =============================================================================
// Sequenced playback
// =============================================================================

#[test]
fn finite_sequence_presents_slots_in_order_then_idles() {
    let (probe_tx, probe_rx) = std::sync::mpsc::channel();
    let mut controller = PlmController::new(test_config(4, 4, 3)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0).with_probe(probe_tx)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    for (slot, tag) in [(0usize, 10u8), (1, 11), (2, 12)] {
        controller.set_frame_at(slot, marker_frame(4, 4, tag)).unwrap();
    }
    wait_for_tag(&probe_rx, 10);

    controller.start_sequence(3).unwrap();

    let mut tags = Vec::new();
    for _ in 0..10_000 {
        let frame = probe_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("probe stalled");
        tags.push(frame[0]);
        if frame[0] == 12 {
            break;
        }
    }
    let order = dedup(&tags);
    assert!(
        order.ends_with(&[10, 11, 12]),
        "slots reached the surface out of order: {order:?}"
    );
    // Each interior position is shown for exactly one tick.
    assert_eq!(tags.iter().filter(|&&t| t == 11).count(), 1);

    wait_until("sequence completion", || {
        controller.mode() == PlaybackMode::Idle && controller.buffer_index() == -1
    });
    assert!(!controller.camera_trigger());
    assert!(controller.t0_micros() > 0);

    controller.stop();
}

#[test]
fn continuous_mode_cycles_through_every_slot() {
    let (probe_tx, probe_rx) = std::sync::mpsc::channel();
    let mut controller = PlmController::new(test_config(4, 4, 3)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0).with_probe(probe_tx)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    for (slot, tag) in [(0usize, 10u8), (1, 11), (2, 12)] {
        controller.set_frame_at(slot, marker_frame(4, 4, tag)).unwrap();
    }
    wait_for_tag(&probe_rx, 10);

    controller.start_continuous().unwrap();
    wait_until("continuous mode", || {
        controller.mode() == PlaybackMode::Continuous
    });
    assert!(controller.camera_trigger());

    let mut tags = Vec::new();
    for _ in 0..10_000 {
        let frame = probe_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("probe stalled");
        tags.push(frame[0]);
        if dedup(&tags).windows(4).any(|w| w == [10, 11, 12, 10]) {
            break;
        }
    }
    let order = dedup(&tags);
    assert!(
        order.windows(4).any(|w| w == [10, 11, 12, 10]),
        "no full wraparound cycle in {order:?}"
    );
    wait_until("tick counter growth", || controller.buffer_index() >= 3);

    controller.stop_sequence().unwrap();
    wait_until("return to idle", || {
        controller.mode() == PlaybackMode::Idle && !controller.camera_trigger()
    });

    controller.stop();
}

#[test]
fn hold_frame_pins_the_surface_to_one_slot() {
    let (probe_tx, probe_rx) = std::sync::mpsc::channel();
    let mut controller = PlmController::new(test_config(4, 4, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0).with_probe(probe_tx)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    for slot in 0..4usize {
        controller
            .set_frame_at(slot, marker_frame(4, 4, 10 + slot as u8))
            .unwrap();
    }
    controller.hold_frame(2).unwrap();
    wait_for_tag(&probe_rx, 12);

    for _ in 0..5 {
        let frame = probe_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("probe stalled");
        assert_eq!(frame[0], 12);
    }
    assert_eq!(controller.current_position(), 2);
    assert_eq!(controller.mode(), PlaybackMode::Idle);

    controller.stop();
}

#[test]
fn pause_freezes_presentation_until_resume() {
    let (probe_tx, probe_rx) = std::sync::mpsc::channel();
    let mut controller = PlmController::new(test_config(4, 4, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0).with_probe(probe_tx)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    probe_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("no frames before pause");

    controller.pause().unwrap();
    assert!(controller.is_paused());
    // Let the in-flight tick land, then require silence.
    thread::sleep(Duration::from_millis(50));
    while probe_rx.try_recv().is_ok() {}
    assert!(
        probe_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "paused loop kept presenting"
    );

    controller.resume().unwrap();
    probe_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("no frames after resume");

    controller.stop();
}

// =============================================================================
// Staging and readback
// =============================================================================

#[test]
fn grab_returns_the_staged_frame() {
    let mut controller = PlmController::new(test_config(4, 4, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    controller.set_frame_at(1, marker_frame(4, 4, 42)).unwrap();
    let frame = controller.grab_frame(1).unwrap();
    assert_eq!(frame.width(), 8);
    assert_eq!(frame.height(), 8);
    assert_eq!(frame.as_bytes()[0], 42);

    // Slots never written still hold the blank white fill.
    let blank = controller.grab_frame(3).unwrap();
    assert!(blank.as_bytes().iter().all(|&b| b == 255));

    controller.stop();
}

#[test]
fn rgb_inserts_expand_to_rgba_with_zero_alpha() {
    let mut controller = PlmController::new(test_config(4, 4, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    // One 8x8 output frame, three bytes per pixel.
    let rgb: Vec<u8> = (0..8 * 8 * 3).map(|i| (i % 251) as u8).collect();
    controller
        .insert_frames(&rgb, 1, 0, FrameLayout::Rgb)
        .unwrap();

    let frame = controller.grab_frame(0).unwrap();
    for (i, pixel) in frame.as_bytes().chunks_exact(4).enumerate() {
        assert_eq!(&pixel[..3], &rgb[3 * i..3 * i + 3]);
        assert_eq!(pixel[3], 0);
    }

    controller.stop();
}

#[test]
fn rgba_inserts_fill_consecutive_slots() {
    let mut controller = PlmController::new(test_config(2, 2, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    let frame_bytes = 4 * 4 * 4;
    let mut batch = vec![0u8; 2 * frame_bytes];
    batch[0] = 21;
    batch[frame_bytes] = 22;
    controller
        .insert_frames(&batch, 2, 1, FrameLayout::Rgba)
        .unwrap();

    assert_eq!(controller.grab_frame(1).unwrap().as_bytes()[0], 21);
    assert_eq!(controller.grab_frame(2).unwrap().as_bytes()[0], 22);

    controller.stop();
}

#[test]
fn restart_discards_the_previous_store() {
    let mut controller = PlmController::new(test_config(4, 4, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();
    controller.set_frame_at(1, marker_frame(4, 4, 42)).unwrap();
    assert_eq!(controller.grab_frame(1).unwrap().as_bytes()[0], 42);

    controller.stop();
    assert!(!controller.is_running());

    controller
        .reset(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();
    let blank = controller.grab_frame(1).unwrap();
    assert!(blank.as_bytes().iter().all(|&b| b == 255));

    controller.stop();
}

// =============================================================================
// Guards
// =============================================================================

#[test]
fn staging_guards_reject_out_of_range_requests() {
    let mut controller = PlmController::new(test_config(4, 4, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    assert!(matches!(
        controller.insert_frames(&[], 2, 3, FrameLayout::Rgba),
        Err(PlmError::CapacityExceeded {
            offset: 3,
            count: 2,
            capacity: 4,
        })
    ));
    assert!(matches!(
        controller.insert_frames(&[0u8; 7], 1, 0, FrameLayout::Rgba),
        Err(PlmError::FrameSizeMismatch { .. })
    ));
    assert!(matches!(
        controller.set_frame_at(4, marker_frame(4, 4, 1)),
        Err(PlmError::IndexOutOfRange {
            index: 4,
            capacity: 4,
        })
    ));
    assert!(matches!(
        controller.set_frame_at(0, PackedFrame::new(3, 3)),
        Err(PlmError::GeometryMismatch { .. })
    ));
    assert!(matches!(
        controller.start_sequence(5),
        Err(PlmError::SequenceTooLong {
            length: 5,
            capacity: 4,
        })
    ));
    assert!(matches!(
        controller.set_frame_sequence(&[0; 5]),
        Err(PlmError::SequenceTooLong { .. })
    ));
    assert!(matches!(
        controller.hold_frame(4),
        Err(PlmError::IndexOutOfRange { .. })
    ));
    assert!(matches!(
        controller.grab_frame(4),
        Err(PlmError::IndexOutOfRange { .. })
    ));

    controller.stop();
}

#[test]
fn staging_requires_a_running_engine() {
    let controller = PlmController::new(test_config(2, 2, 4)).unwrap();
    assert!(!controller.is_running());
    assert!(matches!(
        controller.set_frame_at(0, marker_frame(2, 2, 1)),
        Err(PlmError::NotRunning)
    ));
    assert!(matches!(controller.pause(), Err(PlmError::NotRunning)));
    assert!(matches!(controller.grab_frame(0), Err(PlmError::NotRunning)));
    assert!(matches!(controller.device_open(), Err(PlmError::NotRunning)));
}

// =============================================================================
// Device commands and calibration
// =============================================================================

#[test]
fn device_commands_round_trip_through_the_display_thread() {
    let mut controller = PlmController::new(test_config(2, 2, 4)).unwrap();
    controller
        .start(
            Box::new(HeadlessPresenter::new(2000.0)),
            Box::<NullDeviceLink>::default(),
        )
        .unwrap();

    assert_eq!(controller.device_open().unwrap(), 0);
    assert!(controller.device_is_connected().unwrap());
    assert_eq!(controller.device_configure(1, 0).unwrap(), 0);
    assert_eq!(controller.device_play().unwrap(), 0);
    assert_eq!(controller.device_stop().unwrap(), 0);
    assert_eq!(controller.device_close().unwrap(), 0);
    assert!(!controller.device_is_connected().unwrap());

    controller.stop();
}

#[test]
fn replacing_the_lookup_table_changes_packing() {
    let mut controller = PlmController::new(test_config(2, 2, 4)).unwrap();

    let values = [0.5f32; 4];
    let stack = plm_core::PhaseStack::new(&values, 1, 2, 2).unwrap();
    let factory = controller.pack(&stack).unwrap();

    let mut uniform = [0.0f32; LUT_BREAKPOINTS];
    for (i, p) in uniform.iter_mut().enumerate() {
        *p = i as f32 / 16.0;
    }
    controller.set_lookup_table(uniform).unwrap();
    let recalibrated = controller.pack(&stack).unwrap();

    assert_ne!(factory.as_bytes(), recalibrated.as_bytes());
}
