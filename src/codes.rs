//! Level-to-code mapping. Each phase level drives four binary sub-pixel
//! values, one per corner of the pixel-doubled 2x2 output block.

use crate::error::PlmError;
use crate::quantize::LEVELS;

/// Bits per level code.
pub const CODE_BITS: usize = 4;

/// Default binary-counting code table: level L maps to the bits of L,
/// least significant first. Has to be recalibrated per device.
pub const DEFAULT_CODES: [[u8; CODE_BITS]; LEVELS] = [
    [0, 0, 0, 0],
    [1, 0, 0, 0],
    [0, 1, 0, 0],
    [1, 1, 0, 0],
    [0, 0, 1, 0],
    [1, 0, 1, 0],
    [0, 1, 1, 0],
    [1, 1, 1, 0],
    [0, 0, 0, 1],
    [1, 0, 0, 1],
    [0, 1, 0, 1],
    [1, 1, 0, 1],
    [0, 0, 1, 1],
    [1, 0, 1, 1],
    [0, 1, 1, 1],
    [1, 1, 1, 1],
];

/// Calibrated code table for the 16 phase levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    codes: [[u8; CODE_BITS]; LEVELS],
}

impl Default for CodeTable {
    fn default() -> Self {
        Self {
            codes: DEFAULT_CODES,
        }
    }
}

impl CodeTable {
    /// Builds a table after checking every entry is 0 or 1.
    pub fn new(codes: [[u8; CODE_BITS]; LEVELS]) -> Result<Self, PlmError> {
        for (level, code) in codes.iter().enumerate() {
            for (bit, &value) in code.iter().enumerate() {
                if value > 1 {
                    return Err(PlmError::InvalidCodeBit { level, bit, value });
                }
            }
        }
        Ok(Self { codes })
    }

    pub fn codes(&self) -> &[[u8; CODE_BITS]; LEVELS] {
        &self.codes
    }

    /// The four corner bits for `level`. Levels come from the quantizer
    /// and are always below 16; anything else is a caller bug.
    pub fn bits(&self, level: u8) -> [u8; CODE_BITS] {
        let level = usize::from(level);
        assert!(level < LEVELS, "phase level {level} out of range");
        self.codes[level]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_counts_in_binary() {
        let t = CodeTable::default();
        assert_eq!(t.bits(0), [0, 0, 0, 0]);
        assert_eq!(t.bits(5), [1, 0, 1, 0]);
        assert_eq!(t.bits(10), [0, 1, 0, 1]);
        assert_eq!(t.bits(15), [1, 1, 1, 1]);
        for level in 0..LEVELS as u8 {
            let bits = t.bits(level);
            let reassembled = bits[0] | bits[1] << 1 | bits[2] << 2 | bits[3] << 3;
            assert_eq!(reassembled, level);
        }
    }

    #[test]
    fn non_binary_entry_is_rejected() {
        let mut codes = DEFAULT_CODES;
        codes[3][2] = 7;
        match CodeTable::new(codes) {
            Err(PlmError::InvalidCodeBit { level, bit, value }) => {
                assert_eq!((level, bit, value), (3, 2, 7));
            }
            other => panic!("expected InvalidCodeBit, got {other:?}"),
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_level_panics() {
        CodeTable::default().bits(16);
    }
}
