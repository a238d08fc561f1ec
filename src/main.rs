//! Demo driver: packs a handful of blazed gratings, plays them once as
//! a triggered sequence against the headless presenter, and reports
//! the sequencer's observables along the way.

use anyhow::Context;
use log::{info, warn};
use plm_core::{
    HeadlessPresenter, NullDeviceLink, PhaseStack, PlaybackMode, PlmConfig, PlmController,
};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Phase planes packed into each demo frame.
const DEMO_PLANES: usize = 24;
/// Slots filled and played by the demo sequence.
const DEMO_FRAMES: usize = 4;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            PlmConfig::load(&path)?
        }
        None => {
            info!("no configuration file given, using defaults");
            PlmConfig::default()
        }
    };

    let width = config.geometry.width;
    let height = config.geometry.height;
    let refresh = config.playback.refresh_rate;

    let mut controller = PlmController::new(config).context("failed to build the controller")?;
    info!("packing backend: {}", controller.packing_backend());

    controller
        .start(
            Box::new(HeadlessPresenter::new(refresh)),
            Box::<NullDeviceLink>::default(),
        )
        .context("failed to start the display loop")?;

    // One stack of blazed gratings per slot, steeper each time.
    let samples_per_plane = width * height;
    let mut values = vec![0.0f32; DEMO_PLANES * samples_per_plane];
    for slot in 0..DEMO_FRAMES {
        let period = (slot + 2) as f32;
        for plane in 0..DEMO_PLANES {
            let base = plane * samples_per_plane;
            for y in 0..height {
                for x in 0..width {
                    let ramp = (x as f32 + plane as f32) / period;
                    values[base + y * width + x] = ramp.fract();
                }
            }
        }
        let stack = PhaseStack::new(&values, DEMO_PLANES, width, height)?;
        controller
            .pack_and_insert(&stack, slot)
            .with_context(|| format!("failed to pack slot {slot}"))?;
    }
    info!("packed {DEMO_FRAMES} frames of {DEMO_PLANES} planes each");

    controller
        .start_sequence(DEMO_FRAMES)
        .context("failed to arm the sequence")?;

    let tick = Duration::from_secs_f64(1.0 / refresh);
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut saw_playing = false;
    loop {
        thread::sleep(tick);
        let mode = controller.mode();
        if mode == PlaybackMode::Playing {
            saw_playing = true;
            info!(
                "playing: position {}, buffer {}, trigger {}",
                controller.current_position(),
                controller.buffer_index(),
                controller.camera_trigger()
            );
        }
        if saw_playing && mode == PlaybackMode::Idle {
            info!(
                "sequence finished, t0 was {}us, {} frames presented",
                controller.t0_micros(),
                controller.frames_presented()
            );
            break;
        }
        if Instant::now() > deadline {
            warn!("sequence did not finish before the deadline");
            break;
        }
    }

    controller.stop();
    Ok(())
}
