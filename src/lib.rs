//! Control engine for a phase-only light modulator driven over a
//! standard video link.
//!
//! Phase maps come in as `f32` values on the unit interval, get
//! quantized against a 17-breakpoint calibration curve, and are
//! bit-packed 24 to an RGB frame with 2x2 pixel doubling. A display
//! thread owns the frame store and steps a playback sequencer once per
//! refresh, handing each resolved frame to a [`Presenter`] and raising
//! the camera trigger while a sequence runs.
//!
//! [`PlmController`] is the host-facing entry point; everything else
//! hangs off it.

pub mod codes;
pub mod config;
pub mod controller;
pub mod device;
pub mod display;
pub mod error;
pub mod frame;
pub mod packer;
pub mod quantize;
pub mod sequencer;
pub mod store;

pub use codes::{CodeTable, CODE_BITS, DEFAULT_CODES};
pub use config::PlmConfig;
pub use controller::PlmController;
pub use device::{DeviceLink, NullDeviceLink};
pub use display::{HeadlessPresenter, Presenter};
pub use error::{GpuError, PlmError};
pub use frame::{FrameLayout, PackedFrame, PhaseStack, MAX_PLANES, PACKED_BPP};
pub use packer::{GpuPacker, HologramPacker};
pub use quantize::{QuantizationTable, DEFAULT_LUT, LEVELS, LUT_BREAKPOINTS};
pub use sequencer::{PlaybackMode, PlaybackOrder, PlaybackSequencer, TickReport};
pub use store::FrameStore;
