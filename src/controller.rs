//! Engine context and the display thread it owns.
//!
//! `PlmController` is the single entry point for host applications. It
//! validates every request on the caller's thread, then stages state
//! changes over a channel that the display thread drains once per tick,
//! so playback never observes a half-applied update.
//!
//! Ownership is deliberately one-sided: the display thread owns the
//! frame store, the playback order, and the sequencer outright. The
//! controller keeps only the packer, the calibration tables, and a set
//! of shared atomics mirroring the sequencer's observable state.

use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::codes::{CodeTable, CODE_BITS};
use crate::config::PlmConfig;
use crate::device::DeviceLink;
use crate::display::Presenter;
use crate::error::PlmError;
use crate::frame::{FrameLayout, PackedFrame, PhaseStack};
use crate::packer::HologramPacker;
use crate::quantize::{QuantizationTable, LEVELS, LUT_BREAKPOINTS};
use crate::sequencer::{PlaybackMode, PlaybackOrder, PlaybackSequencer};
use crate::store::FrameStore;

/// Wall-clock microseconds since the Unix epoch. A clock set before the
/// epoch reads as zero rather than failing the tick.
fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Sequencer state mirrored into atomics so host threads can poll
/// playback without a round trip to the display thread.
#[derive(Default)]
struct SharedSignals {
    running: AtomicBool,
    paused: AtomicBool,
    mode: AtomicU8,
    camera_trigger: AtomicBool,
    buffer_index: AtomicI64,
    frames_in_sequence: AtomicI64,
    current_position: AtomicUsize,
    t0_micros: AtomicI64,
    frames_presented: AtomicU64,
}

impl SharedSignals {
    fn reset(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.mode.store(PlaybackMode::Idle as u8, Ordering::Relaxed);
        self.camera_trigger.store(false, Ordering::Relaxed);
        self.buffer_index.store(-1, Ordering::Relaxed);
        self.frames_in_sequence.store(-1, Ordering::Relaxed);
        self.current_position.store(0, Ordering::Relaxed);
        self.t0_micros.store(0, Ordering::Relaxed);
        self.frames_presented.store(0, Ordering::Relaxed);
    }

    fn publish(&self, seq: &PlaybackSequencer, position: usize) {
        self.mode.store(seq.mode() as u8, Ordering::Relaxed);
        self.camera_trigger
            .store(seq.camera_trigger(), Ordering::Relaxed);
        self.buffer_index.store(seq.buffer_index(), Ordering::Relaxed);
        self.frames_in_sequence
            .store(seq.frames_in_sequence(), Ordering::Relaxed);
        self.current_position.store(position, Ordering::Relaxed);
        self.t0_micros.store(seq.t0_micros(), Ordering::Relaxed);
    }
}

/// Commands staged by the controller and applied between ticks.
enum ControlMsg {
    Insert {
        bytes: Box<[u8]>,
        count: usize,
        offset: usize,
        layout: FrameLayout,
    },
    SetAt {
        index: usize,
        frame: PackedFrame,
    },
    StartSequence {
        frames: usize,
    },
    StartContinuous,
    StopSequence,
    SetOrder {
        entries: Box<[u64]>,
    },
    HoldFrame {
        slot: usize,
    },
    Grab {
        index: usize,
        reply: SyncSender<Result<PackedFrame, PlmError>>,
    },
    Device {
        op: DeviceOp,
        reply: SyncSender<i32>,
    },
}

/// Hardware commands forwarded to the display thread's `DeviceLink`.
enum DeviceOp {
    Open,
    Close,
    IsConnected,
    Play,
    Stop,
    Configure { play_mode: i32, connector: i32 },
}

/// Everything the display thread owns. Built on the controller thread,
/// moved wholesale into the spawned thread, and dropped when the loop
/// exits.
struct DisplayLoop {
    store: FrameStore,
    order: PlaybackOrder,
    sequencer: PlaybackSequencer,
    presenter: Box<dyn Presenter + Send>,
    device: Box<dyn DeviceLink + Send>,
    rx: Receiver<ControlMsg>,
    shared: Arc<SharedSignals>,
    pause_interval: Duration,
    end_delay: Duration,
}

impl DisplayLoop {
    fn run(mut self) {
        info!(
            "display loop started ({} slots of {} bytes)",
            self.store.capacity(),
            self.store.frame_bytes()
        );
        while self.shared.running.load(Ordering::Relaxed) {
            if !self.drain_control() {
                break;
            }
            if self.shared.paused.load(Ordering::Relaxed) {
                thread::sleep(self.pause_interval);
                continue;
            }
            let report = self.sequencer.tick(now_micros());
            if report.started {
                let status = self.device.play();
                if status < 0 {
                    warn!("device play failed with status {status}");
                }
            }
            let slot = self.order.resolve(report.position, self.store.capacity());
            match self.store.get(slot) {
                Ok(frame) => {
                    if let Err(e) = self.presenter.upload_frame(frame) {
                        error!("frame upload failed: {e:#}");
                    }
                }
                Err(e) => warn!("skipping upload for slot {slot}: {e}"),
            }
            if let Err(e) = self.presenter.present() {
                error!("present failed: {e:#}");
            }
            self.shared.frames_presented.fetch_add(1, Ordering::Relaxed);
            self.shared.publish(&self.sequencer, report.position);
            if report.ended {
                let status = self.device.stop();
                if status < 0 {
                    warn!("device stop failed with status {status}");
                }
                thread::sleep(self.end_delay);
            }
        }
        if self.device.is_connected() {
            self.device.close();
        }
        info!("display loop stopped");
    }

    /// Applies every pending command. Returns false once the controller
    /// side of the channel is gone.
    fn drain_control(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => self.apply(msg),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => {
                    info!("control channel closed, stopping display loop");
                    return false;
                }
            }
        }
    }

    fn apply(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Insert {
                bytes,
                count,
                offset,
                layout,
            } => {
                if let Err(e) = self.store.insert(&bytes, count, offset, layout) {
                    error!("staged insert rejected: {e}");
                }
            }
            ControlMsg::SetAt { index, frame } => {
                if let Err(e) = self.store.set_at(index, &frame) {
                    error!("staged frame rejected: {e}");
                }
            }
            ControlMsg::StartSequence { frames } => {
                if let Err(e) = self.sequencer.start_sequence(frames) {
                    error!("sequence start rejected: {e}");
                }
            }
            ControlMsg::StartContinuous => {
                self.sequencer.start_continuous(now_micros());
                let status = self.device.play();
                if status < 0 {
                    warn!("device play failed with status {status}");
                }
            }
            ControlMsg::StopSequence => {
                if self.sequencer.stop() {
                    let status = self.device.stop();
                    if status < 0 {
                        warn!("device stop failed with status {status}");
                    }
                }
            }
            ControlMsg::SetOrder { entries } => {
                if let Err(e) = self.order.set_prefix(&entries) {
                    error!("playback order rejected: {e}");
                }
            }
            ControlMsg::HoldFrame { slot } => {
                self.order.fill(slot as u64);
                self.sequencer.set_current(slot);
            }
            ControlMsg::Grab { index, reply } => {
                // The caller may already have given up waiting; a dead
                // reply channel is not an error here.
                let _ = reply.send(self.store.grab(index));
            }
            ControlMsg::Device { op, reply } => {
                let status = match op {
                    DeviceOp::Open => self.device.open(),
                    DeviceOp::Close => self.device.close(),
                    DeviceOp::IsConnected => i32::from(self.device.is_connected()),
                    DeviceOp::Play => self.device.play(),
                    DeviceOp::Stop => self.device.stop(),
                    DeviceOp::Configure {
                        play_mode,
                        connector,
                    } => self.device.configure(play_mode, connector),
                };
                if status < 0 {
                    warn!("device command failed with status {status}");
                }
                let _ = reply.send(status);
            }
        }
    }
}

struct DisplayHandle {
    tx: Sender<ControlMsg>,
    join: Option<JoinHandle<()>>,
}

/// Owner of the modulator engine: packer, calibration tables, and the
/// display thread's lifecycle.
pub struct PlmController {
    config: PlmConfig,
    lut: QuantizationTable,
    codes: CodeTable,
    packer: HologramPacker,
    shared: Arc<SharedSignals>,
    display: Option<DisplayHandle>,
}

impl PlmController {
    /// Builds a controller from a validated configuration. Probes the
    /// GPU once here; packing silently runs on the CPU if no adapter is
    /// usable.
    pub fn new(config: PlmConfig) -> Result<Self, PlmError> {
        config.validate()?;
        let lut = QuantizationTable::new(config.calibration.lookup_table)?;
        let codes = CodeTable::new(config.calibration.code_table)?;
        let packer = HologramPacker::new(
            config.geometry.width,
            config.geometry.height,
            config.gpu.prefer_gpu,
        );
        Ok(Self {
            config,
            lut,
            codes,
            packer,
            shared: Arc::new(SharedSignals::default()),
            display: None,
        })
    }

    /// Spawns the display thread around the given presentation and
    /// hardware seams. The store starts blank (all slots white) and the
    /// playback order starts as identity.
    ///
    /// Calling this while already running performs a full restart.
    pub fn start(
        &mut self,
        mut presenter: Box<dyn Presenter + Send>,
        device: Box<dyn DeviceLink + Send>,
    ) -> Result<(), PlmError> {
        if self.display.is_some() {
            info!("display loop already running, restarting");
            self.stop();
        }
        let width = self.config.geometry.width;
        let height = self.config.geometry.height;
        let capacity = self.config.playback.capacity;

        presenter
            .create_surface(2 * width, 2 * height)
            .map_err(|e| PlmError::Presenter(format!("{e:#}")))?;

        let (tx, rx) = mpsc::channel();
        self.shared.reset();
        self.shared.running.store(true, Ordering::Relaxed);
        let display = DisplayLoop {
            store: FrameStore::new(capacity, width, height),
            order: PlaybackOrder::identity(capacity),
            sequencer: PlaybackSequencer::new(capacity),
            presenter,
            device,
            rx,
            shared: Arc::clone(&self.shared),
            pause_interval: Duration::from_secs_f64(1.0 / self.config.playback.refresh_rate),
            end_delay: Duration::from_millis(self.config.playback.sequence_end_delay_ms),
        };
        let join = match thread::Builder::new()
            .name("display".to_string())
            .spawn(move || display.run())
        {
            Ok(join) => join,
            Err(e) => {
                self.shared.running.store(false, Ordering::Relaxed);
                return Err(PlmError::ThreadSpawn(e.to_string()));
            }
        };
        self.display = Some(DisplayHandle {
            tx,
            join: Some(join),
        });
        info!(
            "engine started: {width}x{height} logical, {capacity} slots, {} packing",
            self.packer.backend_name()
        );
        Ok(())
    }

    /// Stops the display thread and joins it. Safe to call when already
    /// stopped.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.display.take() {
            self.shared.running.store(false, Ordering::Relaxed);
            drop(handle.tx);
            if let Some(join) = handle.join.take() {
                if join.join().is_err() {
                    error!("display thread panicked during shutdown");
                }
            }
            info!("engine stopped");
        }
    }

    /// Tears the engine down and brings it back up with fresh seams.
    /// The old presenter and device were consumed by the previous
    /// display thread, so the caller supplies replacements.
    pub fn reset(
        &mut self,
        presenter: Box<dyn Presenter + Send>,
        device: Box<dyn DeviceLink + Send>,
    ) -> Result<(), PlmError> {
        self.stop();
        self.start(presenter, device)
    }

    /// Stages new output geometry and rebuilds the packer for it. An
    /// already-running display loop keeps its surface until the next
    /// [`start`](Self::start) or [`reset`](Self::reset).
    pub fn set_geometry(
        &mut self,
        width: usize,
        height: usize,
        monitor: usize,
    ) -> Result<(), PlmError> {
        if width == 0 || height == 0 {
            return Err(PlmError::InvalidConfig(
                "geometry must be at least 1x1".to_string(),
            ));
        }
        self.config.geometry.width = width;
        self.config.geometry.height = height;
        self.config.geometry.monitor = monitor;
        self.packer = HologramPacker::new(width, height, self.config.gpu.prefer_gpu);
        Ok(())
    }

    /// Stages a new slot count. Takes effect on the next start, when
    /// the store is rebuilt.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), PlmError> {
        if capacity == 0 {
            return Err(PlmError::InvalidConfig(
                "capacity must be at least one frame".to_string(),
            ));
        }
        self.config.playback.capacity = capacity;
        Ok(())
    }

    /// Replaces the phase lookup table used for all subsequent packs.
    pub fn set_lookup_table(&mut self, phases: [f32; LUT_BREAKPOINTS]) -> Result<(), PlmError> {
        self.lut = QuantizationTable::new(phases)?;
        self.config.calibration.lookup_table = phases;
        Ok(())
    }

    /// Replaces the level-to-bit code table used for all subsequent
    /// packs.
    pub fn set_code_table(&mut self, codes: [[u8; CODE_BITS]; LEVELS]) -> Result<(), PlmError> {
        self.codes = CodeTable::new(codes)?;
        self.config.calibration.code_table = codes;
        Ok(())
    }

    pub fn lookup_table(&self) -> &QuantizationTable {
        &self.lut
    }

    pub fn code_table(&self) -> &CodeTable {
        &self.codes
    }

    /// Packs a stack of phase maps into one display frame on the
    /// caller's thread. Works whether or not the engine is running.
    pub fn pack(&self, stack: &PhaseStack) -> Result<PackedFrame, PlmError> {
        self.packer.pack(stack, &self.lut, &self.codes)
    }

    /// Packs and stages the result into the given slot in one call.
    pub fn pack_and_insert(&self, stack: &PhaseStack, slot: usize) -> Result<(), PlmError> {
        let frame = self.pack(stack)?;
        self.set_frame_at(slot, frame)
    }

    /// Stages raw display frames into consecutive slots starting at
    /// `offset`. RGB input is expanded to RGBA with zero alpha.
    pub fn insert_frames(
        &self,
        bytes: &[u8],
        count: usize,
        offset: usize,
        layout: FrameLayout,
    ) -> Result<(), PlmError> {
        let capacity = self.config.playback.capacity;
        if offset.checked_add(count).map_or(true, |end| end > capacity) {
            return Err(PlmError::CapacityExceeded {
                offset,
                count,
                capacity,
            });
        }
        // Output frames are pixel-doubled in both axes.
        let frame_bytes =
            layout.bytes_per_pixel() * 4 * self.config.geometry.width * self.config.geometry.height;
        let expected = count * frame_bytes;
        if bytes.len() != expected {
            return Err(PlmError::FrameSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        self.send(ControlMsg::Insert {
            bytes: bytes.to_vec().into_boxed_slice(),
            count,
            offset,
            layout,
        })
    }

    /// Stages one already-packed frame into a slot.
    pub fn set_frame_at(&self, index: usize, frame: PackedFrame) -> Result<(), PlmError> {
        let capacity = self.config.playback.capacity;
        if index >= capacity {
            return Err(PlmError::IndexOutOfRange { index, capacity });
        }
        let width = 2 * self.config.geometry.width;
        let height = 2 * self.config.geometry.height;
        if frame.width() != width || frame.height() != height {
            return Err(PlmError::GeometryMismatch {
                width,
                height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }
        self.send(ControlMsg::SetAt { index, frame })
    }

    /// Copies one slot back out of the display thread's store. Blocks
    /// until the next tick boundary services the request.
    pub fn grab_frame(&self, index: usize) -> Result<PackedFrame, PlmError> {
        let capacity = self.config.playback.capacity;
        if index >= capacity {
            return Err(PlmError::IndexOutOfRange { index, capacity });
        }
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(ControlMsg::Grab {
            index,
            reply: reply_tx,
        })?;
        reply_rx.recv().map_err(|_| PlmError::ChannelClosed)?
    }

    /// Arms a finite run over the first `frames` ordered positions.
    /// Playback begins on the tick after the currently held frame is
    /// shown once more.
    pub fn start_sequence(&self, frames: usize) -> Result<(), PlmError> {
        let capacity = self.config.playback.capacity;
        if frames > capacity {
            return Err(PlmError::SequenceTooLong {
                length: frames,
                capacity,
            });
        }
        self.send(ControlMsg::StartSequence { frames })
    }

    /// Switches to free-running playback over every slot in order.
    pub fn start_continuous(&self) -> Result<(), PlmError> {
        self.send(ControlMsg::StartContinuous)
    }

    /// Cancels any armed or active sequence. The currently shown frame
    /// stays up.
    pub fn stop_sequence(&self) -> Result<(), PlmError> {
        self.send(ControlMsg::StopSequence)
    }

    /// Replaces the leading portion of the playback order. Entries
    /// beyond the given prefix keep their previous values.
    pub fn set_frame_sequence(&self, sequence: &[u64]) -> Result<(), PlmError> {
        let capacity = self.config.playback.capacity;
        if sequence.len() > capacity {
            return Err(PlmError::SequenceTooLong {
                length: sequence.len(),
                capacity,
            });
        }
        self.send(ControlMsg::SetOrder {
            entries: sequence.to_vec().into_boxed_slice(),
        })
    }

    /// Pins playback to a single slot: every order entry is pointed at
    /// it and the sequencer's resting position moves there.
    pub fn hold_frame(&self, slot: usize) -> Result<(), PlmError> {
        let capacity = self.config.playback.capacity;
        if slot >= capacity {
            return Err(PlmError::IndexOutOfRange {
                index: slot,
                capacity,
            });
        }
        self.send(ControlMsg::HoldFrame { slot })
    }

    /// Freezes the display loop. The surface keeps showing the last
    /// presented frame and the sequencer does not advance.
    pub fn pause(&self) -> Result<(), PlmError> {
        self.ensure_running()?;
        self.shared.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), PlmError> {
        self.ensure_running()?;
        self.shared.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn device_open(&self) -> Result<i32, PlmError> {
        self.device_op(DeviceOp::Open)
    }

    pub fn device_close(&self) -> Result<i32, PlmError> {
        self.device_op(DeviceOp::Close)
    }

    pub fn device_is_connected(&self) -> Result<bool, PlmError> {
        Ok(self.device_op(DeviceOp::IsConnected)? != 0)
    }

    pub fn device_play(&self) -> Result<i32, PlmError> {
        self.device_op(DeviceOp::Play)
    }

    pub fn device_stop(&self) -> Result<i32, PlmError> {
        self.device_op(DeviceOp::Stop)
    }

    pub fn device_configure(&self, play_mode: i32, connector: i32) -> Result<i32, PlmError> {
        self.device_op(DeviceOp::Configure {
            play_mode,
            connector,
        })
    }

    pub fn is_running(&self) -> bool {
        self.display.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn mode(&self) -> PlaybackMode {
        PlaybackMode::from_u8(self.shared.mode.load(Ordering::Relaxed))
    }

    /// True from the tick a sequence starts until it ends or is
    /// stopped. Cameras key their exposure window off this.
    pub fn camera_trigger(&self) -> bool {
        self.shared.camera_trigger.load(Ordering::Relaxed)
    }

    /// Ticks elapsed since the active sequence started, -1 when idle.
    pub fn buffer_index(&self) -> i64 {
        self.shared.buffer_index.load(Ordering::Relaxed)
    }

    /// Length of the most recently armed sequence, -1 before one has
    /// been armed.
    pub fn frames_in_sequence(&self) -> i64 {
        self.shared.frames_in_sequence.load(Ordering::Relaxed)
    }

    /// Ordered position most recently handed to the presenter.
    pub fn current_position(&self) -> usize {
        self.shared.current_position.load(Ordering::Relaxed)
    }

    /// Wall-clock microseconds at which the current sequence entered
    /// playback, 0 before any sequence has run.
    pub fn t0_micros(&self) -> i64 {
        self.shared.t0_micros.load(Ordering::Relaxed)
    }

    pub fn frames_presented(&self) -> u64 {
        self.shared.frames_presented.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &PlmConfig {
        &self.config
    }

    pub fn packing_backend(&self) -> &'static str {
        self.packer.backend_name()
    }

    fn ensure_running(&self) -> Result<(), PlmError> {
        if self.display.is_some() {
            Ok(())
        } else {
            Err(PlmError::NotRunning)
        }
    }

    fn send(&self, msg: ControlMsg) -> Result<(), PlmError> {
        let handle = self.display.as_ref().ok_or(PlmError::NotRunning)?;
        handle.tx.send(msg).map_err(|_| PlmError::ChannelClosed)
    }

    fn device_op(&self, op: DeviceOp) -> Result<i32, PlmError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.send(ControlMsg::Device {
            op,
            reply: reply_tx,
        })?;
        reply_rx.recv().map_err(|_| PlmError::ChannelClosed)
    }
}

impl Drop for PlmController {
    fn drop(&mut self) {
        self.stop();
    }
}
