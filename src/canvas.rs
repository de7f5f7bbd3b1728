//! Canvas, UI layer and the off-screen raster canvas
//!
//! The scheduler only talks to [`Canvas`] and [`UiLayer`]; what gets drawn is
//! up to the application. [`RasterCanvas`] renders into an RGBA image in
//! memory and hands back BGRA rows on readback, which is what the display
//! render medium expects.

use anyhow::{ensure, Result};
use image::{Rgba, RgbaImage};

use crate::geometry::{Rect, Size, BYTES_PER_PIXEL};

/// Drawing target handed to the UI layer for one frame
pub trait Surface {
    fn size(&self) -> Size;

    fn clear(&mut self, rgba: [u8; 4]);

    /// Fill `rect`, clipped to the surface
    fn fill_rect(&mut self, rect: Rect, rgba: [u8; 4]);
}

/// Window / GPU context abstraction used by the frame scheduler
pub trait Canvas {
    /// Clear and reset the transform for a new frame
    fn begin_frame(&mut self) -> Result<()>;

    fn surface(&mut self) -> &mut dyn Surface;

    /// Flush drawing and present locally, if there is a local window
    fn end_frame(&mut self) -> Result<()>;

    fn window_size(&self) -> Size;

    fn framebuffer_size(&self) -> Size;

    fn should_close(&self) -> bool;

    /// Drain queued local window events without blocking
    fn poll_events(&mut self);

    /// Copy the rendered frame as tightly packed BGRA rows, top row first
    fn read_pixels(&mut self, size: Size, out: &mut [u8]) -> Result<()>;
}

/// Draws the current application state
pub trait UiLayer {
    fn draw(&mut self, surface: &mut dyn Surface) -> Result<()>;
}

/// Off-screen canvas backed by an RGBA image
pub struct RasterCanvas {
    image: RgbaImage,
    frames: u64,
    close_after: Option<u64>,
}

impl RasterCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            image: RgbaImage::new(size.width, size.height),
            frames: 0,
            close_after: None,
        }
    }

    /// Report `should_close` once `frames` frames have been completed
    pub fn close_after(&mut self, frames: u64) {
        self.close_after = Some(frames);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl Surface for RasterCanvas {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(rgba);
        }
    }

    fn fill_rect(&mut self, rect: Rect, rgba: [u8; 4]) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        let x0 = i64::from(rect.x).clamp(0, w);
        let y0 = i64::from(rect.y).clamp(0, h);
        let x1 = (i64::from(rect.x) + i64::from(rect.size.width)).clamp(0, w);
        let y1 = (i64::from(rect.y) + i64::from(rect.size.height)).clamp(0, h);

        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put_pixel(x as u32, y as u32, Rgba(rgba));
            }
        }
    }
}

impl Canvas for RasterCanvas {
    fn begin_frame(&mut self) -> Result<()> {
        self.clear([0, 0, 0, 0xFF]);
        Ok(())
    }

    fn surface(&mut self) -> &mut dyn Surface {
        self
    }

    fn end_frame(&mut self) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn window_size(&self) -> Size {
        Surface::size(self)
    }

    fn framebuffer_size(&self) -> Size {
        Surface::size(self)
    }

    fn should_close(&self) -> bool {
        self.close_after.is_some_and(|n| self.frames >= n)
    }

    fn poll_events(&mut self) {}

    fn read_pixels(&mut self, size: Size, out: &mut [u8]) -> Result<()> {
        ensure!(
            out.len() == size.buffer_len(),
            "readback buffer holds {} bytes, {}x{} needs {}",
            out.len(),
            size.width,
            size.height,
            size.buffer_len()
        );

        out.fill(0);
        let rows = size.height.min(self.image.height());
        let cols = size.width.min(self.image.width());
        for y in 0..rows {
            for x in 0..cols {
                let [r, g, b, a] = self.image.get_pixel(x, y).0;
                let i = (y as usize * size.width as usize + x as usize) * BYTES_PER_PIXEL;
                out[i..i + BYTES_PER_PIXEL].copy_from_slice(&[b, g, r, a]);
            }
        }
        Ok(())
    }
}
