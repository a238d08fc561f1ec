//! Phase quantization against a calibrated 17-breakpoint lookup table.

use crate::error::PlmError;

/// Breakpoint count of a quantization table. 17 breakpoints bound the 16
/// addressable phase levels; the last breakpoint aliases level 0 through
/// phase wraparound.
pub const LUT_BREAKPOINTS: usize = 17;

/// Number of discrete levels the quantizer can produce.
pub const LEVELS: usize = 16;

/// Factory-default lookup table shipped with the modulator. Real
/// deployments replace this with a per-device calibration.
pub const DEFAULT_LUT: [f32; LUT_BREAKPOINTS] = [
    0.0, 0.0100, 0.0205, 0.0422, 0.0560, 0.0727, 0.1131, 0.1734, 0.3426, 0.3707, 0.4228, 0.4916,
    0.5994, 0.6671, 0.7970, 0.9375, 1.0,
];

/// Monotone lookup table mapping continuous phase in [0, 1] to discrete
/// levels `0..=15`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationTable {
    phases: [f32; LUT_BREAKPOINTS],
}

impl Default for QuantizationTable {
    fn default() -> Self {
        Self {
            phases: DEFAULT_LUT,
        }
    }
}

impl QuantizationTable {
    /// Builds a table after checking that the breakpoints never decrease.
    /// A NaN breakpoint fails the check as well.
    pub fn new(phases: [f32; LUT_BREAKPOINTS]) -> Result<Self, PlmError> {
        for index in 1..LUT_BREAKPOINTS {
            if !(phases[index] >= phases[index - 1]) {
                return Err(PlmError::LutNotMonotonic { index });
            }
        }
        Ok(Self { phases })
    }

    pub fn breakpoints(&self) -> &[f32; LUT_BREAKPOINTS] {
        &self.phases
    }

    /// Quantizes one phase value to a level in `0..=15`.
    ///
    /// Scans for the bracket with `phases[l] < value < phases[l + 1]` and
    /// returns the nearer endpoint's index, ties toward the lower one.
    /// The upper endpoint is taken modulo 16, so a value nearest the final
    /// breakpoint wraps to level 0. Values that hit a breakpoint exactly,
    /// fall outside the table, or are NaN quantize to level 0 by design.
    pub fn quantize(&self, value: f32) -> u8 {
        for level in 0..LUT_BREAKPOINTS - 1 {
            if self.phases[level] < value && value < self.phases[level + 1] {
                if (value - self.phases[level]).abs() <= (value - self.phases[level + 1]).abs() {
                    return level as u8;
                }
                return ((level + 1) % LEVELS) as u8;
            }
        }
        0
    }
}
