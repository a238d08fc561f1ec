//! Headless presenter implementation.
//!
//! An in-memory surface with real row padding and wall-clock pacing,
//! for tests and display-less deployments.

use anyhow::{bail, Result};
use log::{info, trace};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use super::presenter::Presenter;

/// Row pitches are aligned up to this many bytes, mirroring typical
/// texture-upload alignment, so stride handling stays honest even
/// without a real GPU surface behind it.
const ROW_ALIGN: usize = 256;

pub struct HeadlessPresenter {
    width: usize,
    height: usize,
    row_pitch: usize,
    surface: Box<[u8]>,
    frame_interval: Duration,
    next_present: Instant,
    frames_presented: u64,
    probe: Option<Sender<Box<[u8]>>>,
}

impl HeadlessPresenter {
    pub fn new(refresh_rate: f64) -> Self {
        Self {
            width: 0,
            height: 0,
            row_pitch: 0,
            surface: Box::default(),
            frame_interval: Duration::from_secs_f64(1.0 / refresh_rate),
            next_present: Instant::now(),
            frames_presented: 0,
            probe: None,
        }
    }

    /// Sends a dense copy of the surface after every upload. Tests use
    /// this to observe exactly what the display loop showed.
    pub fn with_probe(mut self, probe: Sender<Box<[u8]>>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

impl Presenter for HeadlessPresenter {
    fn create_surface(&mut self, width: usize, height: usize) -> Result<()> {
        self.width = width;
        self.height = height;
        self.row_pitch = (4 * width).div_ceil(ROW_ALIGN) * ROW_ALIGN;
        self.surface = vec![0u8; self.row_pitch * height].into_boxed_slice();
        self.next_present = Instant::now();
        info!(
            "headless surface {}x{} (row pitch {} bytes)",
            width, height, self.row_pitch
        );
        Ok(())
    }

    fn upload_frame(&mut self, rgba: &[u8]) -> Result<()> {
        let row_bytes = 4 * self.width;
        if rgba.len() != row_bytes * self.height {
            bail!(
                "frame is {} bytes, surface expects {}",
                rgba.len(),
                row_bytes * self.height
            );
        }
        for (src, dst) in rgba
            .chunks_exact(row_bytes)
            .zip(self.surface.chunks_exact_mut(self.row_pitch))
        {
            let dst = &mut dst[..row_bytes];
            dst.copy_from_slice(src);
            for pixel in dst.chunks_exact_mut(4) {
                pixel[3] = 255;
            }
        }
        if let Some(probe) = &self.probe {
            let mut dense = vec![0u8; row_bytes * self.height];
            for (dst, src) in dense
                .chunks_exact_mut(row_bytes)
                .zip(self.surface.chunks_exact(self.row_pitch))
            {
                dst.copy_from_slice(&src[..row_bytes]);
            }
            let _ = probe.send(dense.into_boxed_slice());
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let now = Instant::now();
        if now < self.next_present {
            std::thread::sleep(self.next_present - now);
        }
        self.next_present = Instant::now() + self.frame_interval;
        self.frames_presented += 1;
        trace!("presented frame {}", self.frames_presented);
        Ok(())
    }
}
