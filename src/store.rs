//! Fixed-capacity storage for packed frames.

use log::debug;

use crate::error::PlmError;
use crate::frame::{FrameLayout, PackedFrame, PACKED_BPP};

/// Arena of `capacity` packed RGBA frames at pixel-doubled resolution.
///
/// Storage is one contiguous allocation, filled with 0xFF at build time
/// so unwritten slots display as a blank (all-levels-high) pattern
/// rather than leftover memory. All accessors are bounds-checked; a
/// rejected operation leaves the arena untouched.
pub struct FrameStore {
    data: Box<[u8]>,
    capacity: usize,
    /// Output-resolution frame dimensions, already doubled.
    width: usize,
    height: usize,
}

impl FrameStore {
    /// Builds a store for `capacity` frames of `width` x `height`
    /// logical pixels (each frame is stored at doubled resolution).
    pub fn new(capacity: usize, width: usize, height: usize) -> Self {
        let frame_bytes = PACKED_BPP * 2 * width * 2 * height;
        debug!(
            "frame store: {capacity} slots x {frame_bytes} bytes ({}x{} output)",
            2 * width,
            2 * height
        );
        Self {
            data: vec![0xFF; capacity * frame_bytes].into_boxed_slice(),
            capacity,
            width: 2 * width,
            height: 2 * height,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per stored frame.
    pub fn frame_bytes(&self) -> usize {
        PACKED_BPP * self.width * self.height
    }

    /// Tears down and reallocates the arena, invalidating every stored
    /// frame.
    pub fn resize(&mut self, capacity: usize) {
        self.data = vec![0xFF; capacity * self.frame_bytes()].into_boxed_slice();
        self.capacity = capacity;
    }

    /// Bulk insert of `count` frames starting at `offset`. RGB sources
    /// are expanded pixel by pixel with a zeroed alpha byte; RGBA
    /// sources are copied verbatim.
    pub fn insert(
        &mut self,
        frames: &[u8],
        count: usize,
        offset: usize,
        layout: FrameLayout,
    ) -> Result<(), PlmError> {
        if offset.checked_add(count).map_or(true, |end| end > self.capacity) {
            return Err(PlmError::CapacityExceeded {
                offset,
                count,
                capacity: self.capacity,
            });
        }
        let src_frame_bytes = layout.bytes_per_pixel() * self.width * self.height;
        let expected = count * src_frame_bytes;
        if frames.len() != expected {
            return Err(PlmError::FrameSizeMismatch {
                expected,
                actual: frames.len(),
            });
        }

        let dst_frame_bytes = self.frame_bytes();
        for k in 0..count {
            let src = &frames[k * src_frame_bytes..(k + 1) * src_frame_bytes];
            let dst_start = (offset + k) * dst_frame_bytes;
            let dst = &mut self.data[dst_start..dst_start + dst_frame_bytes];
            match layout {
                FrameLayout::Rgba => dst.copy_from_slice(src),
                FrameLayout::Rgb => {
                    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(PACKED_BPP)) {
                        d[..3].copy_from_slice(s);
                        d[3] = 0;
                    }
                }
            }
        }
        Ok(())
    }

    /// Overwrites the frame at `index`.
    pub fn set_at(&mut self, index: usize, frame: &PackedFrame) -> Result<(), PlmError> {
        if index >= self.capacity {
            return Err(PlmError::IndexOutOfRange {
                index,
                capacity: self.capacity,
            });
        }
        let expected = self.frame_bytes();
        if frame.as_bytes().len() != expected {
            return Err(PlmError::FrameSizeMismatch {
                expected,
                actual: frame.as_bytes().len(),
            });
        }
        let start = index * expected;
        self.data[start..start + expected].copy_from_slice(frame.as_bytes());
        Ok(())
    }

    /// Borrowed view of the frame at `index`.
    pub fn get(&self, index: usize) -> Result<&[u8], PlmError> {
        if index >= self.capacity {
            return Err(PlmError::IndexOutOfRange {
                index,
                capacity: self.capacity,
            });
        }
        let frame_bytes = self.frame_bytes();
        let start = index * frame_bytes;
        Ok(&self.data[start..start + frame_bytes])
    }

    /// Owned copy of the frame at `index`.
    pub fn grab(&self, index: usize) -> Result<PackedFrame, PlmError> {
        let bytes = self.get(index)?.to_vec().into_boxed_slice();
        Ok(PackedFrame::from_boxed(bytes, self.width, self.height))
    }
}
