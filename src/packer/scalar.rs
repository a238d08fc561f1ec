//! Sequential bit-packing path.

use crate::codes::CodeTable;
use crate::frame::{PackedFrame, PhaseStack, PACKED_BPP};
use crate::quantize::QuantizationTable;

/// Packs `stack` into `frame`, replacing its previous contents.
///
/// Plane `p` lands in color channel `p / 8` at bit position `p % 8`.
/// Each source pixel expands to a 2x2 output block whose corner bytes
/// take the four code bits of the pixel's quantized level: in
/// (column, row) offsets from the block origin, (0,1) takes bit 0,
/// (0,0) bit 1, (1,1) bit 2, (1,0) bit 3. The assignment matches the
/// device's temporal ordering and is calibration-significant.
pub(super) fn pack_into(
    frame: &mut PackedFrame,
    stack: &PhaseStack,
    lut: &QuantizationTable,
    codes: &CodeTable,
) {
    let n = stack.width();
    let m = stack.height();
    debug_assert_eq!(frame.width(), 2 * n);
    debug_assert_eq!(frame.height(), 2 * m);

    let row_stride = PACKED_BPP * 2 * n;
    let out = frame.as_bytes_mut();
    out.fill(0);

    for plane in 0..stack.planes() {
        let channel = plane / 8;
        let shift = (plane % 8) as u8;

        // Corner bytes per level, pre-shifted for this plane.
        let mut shifted = [[0u8; 4]; 16];
        for (level, corners) in shifted.iter_mut().enumerate() {
            let bits = codes.bits(level as u8);
            for (corner, byte) in corners.iter_mut().enumerate() {
                *byte = bits[corner] << shift;
            }
        }

        let samples = stack.plane(plane);
        for j in 0..m {
            let top = 2 * j * row_stride;
            let bottom = top + row_stride;
            let row = &samples[j * n..(j + 1) * n];
            for (i, &value) in row.iter().enumerate() {
                let code = &shifted[lut.quantize(value) as usize];
                let left = PACKED_BPP * 2 * i + channel;
                out[bottom + left] |= code[0];
                out[top + left] |= code[1];
                out[bottom + left + PACKED_BPP] |= code[2];
                out[top + left + PACKED_BPP] |= code[3];
            }
        }
    }

    for pixel in out.chunks_exact_mut(PACKED_BPP) {
        pixel[3] = 255;
    }
}
