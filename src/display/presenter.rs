//! Presenter trait - minimal interface for putting packed frames on glass.

use anyhow::Result;

/// Minimal output-surface interface for the display loop.
///
/// Implementations own the OS/GPU surface. The display thread drives
/// them in a strict cycle:
/// 1. `create_surface` once per geometry,
/// 2. `upload_frame` with a dense RGBA frame each tick,
/// 3. `present`, blocking until the next refresh - the blocking present
///    is the loop's scheduling primitive.
///
/// Surfaces may pad their rows: `upload_frame` implementations must
/// copy row by row against their own pitch, never assuming the pitch
/// equals `4 * width`.
pub trait Presenter {
    /// Allocates the output surface for `width` x `height` pixels.
    fn create_surface(&mut self, width: usize, height: usize) -> Result<()>;

    /// Copies one dense RGBA frame (stride `4 * width`) into the
    /// surface, forcing the alpha byte opaque on the way in.
    fn upload_frame(&mut self, rgba: &[u8]) -> Result<()>;

    /// Blocks until the surface is on glass.
    fn present(&mut self) -> Result<()>;
}
