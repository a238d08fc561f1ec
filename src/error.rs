//! Error types for the engine.
//!
//! Control-plane guard failures (`PlmError`) leave all state unmodified:
//! a rejected insert, sequence, or table swap must never partially apply.
//! GPU failures (`GpuError`) carry enough context to decide between
//! surfacing the error and falling back to the scalar packing path.

use thiserror::Error;

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

#[derive(Error, Debug)]
pub enum PlmError {
    #[error("frame range out of bounds: offset {offset} + count {count} exceeds capacity {capacity}")]
    CapacityExceeded {
        offset: usize,
        count: usize,
        capacity: usize,
    },
    #[error("playback sequence of {length} entries exceeds capacity {capacity}")]
    SequenceTooLong { length: usize, capacity: usize },
    #[error("frame index {index} out of range for capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },
    #[error("phase stack carries {planes} planes, a packed frame holds at most 24")]
    TooManyPlanes { planes: usize },
    #[error("frame data is {actual} bytes, expected {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },
    #[error("phase stack holds {actual} samples, expected {expected}")]
    StackSizeMismatch { expected: usize, actual: usize },
    #[error("dimensions {actual_width}x{actual_height} do not match the configured {width}x{height}")]
    GeometryMismatch {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },
    #[error("lookup table breakpoints decrease at index {index}")]
    LutNotMonotonic { index: usize },
    #[error("code table entry for level {level}, bit {bit} is {value}, must be 0 or 1")]
    InvalidCodeBit { level: usize, bit: usize, value: u8 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("engine is not running")]
    NotRunning,
    #[error("display thread failed to start: {0}")]
    ThreadSpawn(String),
    #[error("presenter error: {0}")]
    Presenter(String),
    #[error("display thread channel disconnected")]
    ChannelClosed,
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Errors from the GPU packing path.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to request GPU device: {0}")]
    DeviceRequestFailed(String),
    #[error("buffer read-back failed: {0}")]
    BufferRead(String),
}

impl GpuError {
    /// True when the GPU is unavailable and the scalar path should be
    /// used instead. Read-back failures are not in this set: by then a
    /// dispatch has already run and the caller must see the error.
    pub fn should_fallback(&self) -> bool {
        matches!(
            self,
            GpuError::NoAdapter | GpuError::DeviceRequestFailed(_)
        )
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        Self::DeviceRequestFailed(e.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for GpuError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        Self::BufferRead(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_only_for_unavailable_device() {
        assert!(GpuError::NoAdapter.should_fallback());
        assert!(GpuError::DeviceRequestFailed("test".into()).should_fallback());
        assert!(!GpuError::BufferRead("test".into()).should_fallback());
    }

    #[test]
    fn guard_errors_carry_the_offending_numbers() {
        let err = PlmError::CapacityExceeded {
            offset: 40,
            count: 10,
            capacity: 48,
        };
        let msg = err.to_string();
        assert!(msg.contains("40"));
        assert!(msg.contains("10"));
        assert!(msg.contains("48"));
    }
}
