//! Frame data types shared by the packer and the frame store.

use crate::error::PlmError;

/// Most phase planes a single packed frame can carry: three color
/// channels of eight bit-planes each.
pub const MAX_PLANES: usize = 24;

/// Bytes per pixel of a packed output frame.
pub const PACKED_BPP: usize = 4;

/// Byte layout of caller-supplied frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// 3 bytes per pixel. The alpha byte is zero-filled on insert; the
    /// presenter forces it opaque at upload.
    Rgb,
    /// 4 bytes per pixel, copied verbatim.
    Rgba,
}

impl FrameLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameLayout::Rgb => 3,
            FrameLayout::Rgba => 4,
        }
    }
}

/// Borrowed view over a stack of row-major phase planes at logical
/// resolution, values nominally in [0, 1].
///
/// Construction validates the plane count and sample length, so the
/// packers can index without further bounds checks.
#[derive(Debug, Clone, Copy)]
pub struct PhaseStack<'a> {
    values: &'a [f32],
    planes: usize,
    width: usize,
    height: usize,
}

impl<'a> PhaseStack<'a> {
    pub fn new(
        values: &'a [f32],
        planes: usize,
        width: usize,
        height: usize,
    ) -> Result<Self, PlmError> {
        if planes > MAX_PLANES {
            return Err(PlmError::TooManyPlanes { planes });
        }
        let expected = planes * width * height;
        if values.len() != expected {
            return Err(PlmError::StackSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            values,
            planes,
            width,
            height,
        })
    }

    pub fn planes(&self) -> usize {
        self.planes
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &'a [f32] {
        self.values
    }

    /// One plane's samples, row major at logical resolution.
    pub fn plane(&self, plane: usize) -> &'a [f32] {
        let len = self.width * self.height;
        &self.values[plane * len..(plane + 1) * len]
    }
}

/// One packed output frame: RGBA bytes at pixel-doubled resolution,
/// dense rows (stride is `PACKED_BPP * width`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    data: Box<[u8]>,
    width: usize,
    height: usize,
}

impl PackedFrame {
    /// A zeroed frame for the given output dimensions.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0u8; PACKED_BPP * width * height].into_boxed_slice(),
            width,
            height,
        }
    }

    /// Wraps bytes whose length is already known to match.
    pub(crate) fn from_boxed(data: Box<[u8]>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), PACKED_BPP * width * height);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_rgba(data: Box<[u8]>, width: usize, height: usize) -> Result<Self, PlmError> {
        let expected = PACKED_BPP * width * height;
        if data.len() != expected {
            return Err(PlmError::FrameSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Box<[u8]> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_plane_slicing() {
        let values: Vec<f32> = (0..2 * 3 * 2).map(|v| v as f32).collect();
        let stack = PhaseStack::new(&values, 2, 3, 2).unwrap();
        assert_eq!(stack.plane(0), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(stack.plane(1), &[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn stack_rejects_too_many_planes() {
        let values = vec![0.0f32; 25];
        match PhaseStack::new(&values, 25, 1, 1) {
            Err(PlmError::TooManyPlanes { planes }) => assert_eq!(planes, 25),
            other => panic!("expected TooManyPlanes, got {other:?}"),
        }
    }

    #[test]
    fn stack_rejects_wrong_sample_count() {
        let values = vec![0.0f32; 10];
        assert!(matches!(
            PhaseStack::new(&values, 2, 2, 2),
            Err(PlmError::StackSizeMismatch {
                expected: 8,
                actual: 10
            })
        ));
    }

    #[test]
    fn packed_frame_length_is_checked() {
        let ok = PackedFrame::from_rgba(vec![0u8; 16].into_boxed_slice(), 2, 2);
        assert!(ok.is_ok());
        let bad = PackedFrame::from_rgba(vec![0u8; 15].into_boxed_slice(), 2, 2);
        assert!(matches!(bad, Err(PlmError::FrameSizeMismatch { .. })));
    }
}
