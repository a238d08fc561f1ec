//! Hologram bit-packing.
//!
//! Two conformant backends exist: a sequential scalar path and a GPU
//! compute path. They produce byte-identical frames for the same
//! inputs; the equivalence tests hold them to that.

mod gpu;
mod scalar;

pub use gpu::GpuPacker;

use log::{info, warn};

use crate::codes::CodeTable;
use crate::error::PlmError;
use crate::frame::{PackedFrame, PhaseStack};
use crate::quantize::QuantizationTable;

enum Backend {
    Scalar,
    Gpu(GpuPacker),
}

/// Packs phase stacks for one fixed logical geometry.
///
/// Geometry changes rebuild the packer, so the GPU backend can keep its
/// buffers allocated for the lifetime of the instance.
pub struct HologramPacker {
    width: usize,
    height: usize,
    backend: Backend,
}

impl HologramPacker {
    /// Builds a packer for `width` x `height` logical frames. With
    /// `prefer_gpu` the GPU backend is tried first; if no usable device
    /// exists the scalar path is selected automatically.
    pub fn new(width: usize, height: usize, prefer_gpu: bool) -> Self {
        let backend = if prefer_gpu {
            match GpuPacker::new(width, height) {
                Ok(gpu) => {
                    info!("hologram packing on GPU ({})", gpu.adapter_name());
                    Backend::Gpu(gpu)
                }
                Err(e) if e.should_fallback() => {
                    warn!("GPU unavailable, packing on CPU: {e}");
                    Backend::Scalar
                }
                Err(e) => {
                    warn!("GPU packer initialization failed, packing on CPU: {e}");
                    Backend::Scalar
                }
            }
        } else {
            Backend::Scalar
        };
        Self {
            width,
            height,
            backend,
        }
    }

    /// Scalar-only packer, regardless of available hardware.
    pub fn scalar(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            backend: Backend::Scalar,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Name of the active backend, for logs and diagnostics.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Scalar => "scalar",
            Backend::Gpu(_) => "gpu",
        }
    }

    /// Packs `stack` into a fresh frame at doubled resolution. The
    /// output is fully rewritten: cleared, OR-accumulated across the
    /// stack's planes, alpha forced opaque.
    pub fn pack(
        &self,
        stack: &PhaseStack,
        lut: &QuantizationTable,
        codes: &CodeTable,
    ) -> Result<PackedFrame, PlmError> {
        if stack.width() != self.width || stack.height() != self.height {
            return Err(PlmError::GeometryMismatch {
                width: self.width,
                height: self.height,
                actual_width: stack.width(),
                actual_height: stack.height(),
            });
        }
        match &self.backend {
            Backend::Scalar => {
                let mut frame = PackedFrame::new(2 * self.width, 2 * self.height);
                scalar::pack_into(&mut frame, stack, lut, codes);
                Ok(frame)
            }
            Backend::Gpu(gpu) => Ok(gpu.pack(stack, lut, codes)?),
        }
    }
}
