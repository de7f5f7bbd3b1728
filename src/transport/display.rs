//! Render media for the controller display
//!
//! Both media keep a BGRA shadow of the whole display. Streaming blits a
//! sub-window into the shadow; flushing pushes the shadow out.

use anyhow::{ensure, Context, Result};
use bytes::{BufMut, BytesMut};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::geometry::{Rect, Size, BYTES_PER_PIXEL};

/// Receives bitmaps for the physical display
pub trait RenderMedium {
    /// Copy `pixels` (tightly packed BGRA, `rect.size`) into the frame buffer at `rect`
    fn stream_to_sub_window(&mut self, rect: Rect, pixels: &[u8]) -> Result<()>;

    /// Present the frame buffer on the device
    fn flush_frame_buffer(&mut self) -> Result<()>;
}

/// BGRA frame buffer covering the full display
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    size: Size,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            data: vec![0; size.buffer_len()],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Blit a sub-window, dropping whatever falls outside the display
    pub fn blit(&mut self, rect: Rect, pixels: &[u8]) -> Result<()> {
        ensure!(
            pixels.len() == rect.size.buffer_len(),
            "sub-window {}x{} needs {} bytes, got {}",
            rect.size.width,
            rect.size.height,
            rect.size.buffer_len(),
            pixels.len()
        );

        let (dst_w, dst_h) = (i64::from(self.size.width), i64::from(self.size.height));
        let src_w = i64::from(rect.size.width);
        let x0 = i64::from(rect.x).max(0);
        let x1 = (i64::from(rect.x) + src_w).min(dst_w);
        if x0 >= x1 {
            return Ok(());
        }

        for row in 0..i64::from(rect.size.height) {
            let y = i64::from(rect.y) + row;
            if !(0..dst_h).contains(&y) {
                continue;
            }
            let src = ((row * src_w + (x0 - i64::from(rect.x))) as usize) * BYTES_PER_PIXEL;
            let dst = ((y * dst_w + x0) as usize) * BYTES_PER_PIXEL;
            let len = ((x1 - x0) as usize) * BYTES_PER_PIXEL;
            self.data[dst..dst + len].copy_from_slice(&pixels[src..src + len]);
        }
        Ok(())
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.size.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// Physical link that carries encoded display frames (USB bulk endpoint)
pub trait DisplayLink {
    fn write_frame(&mut self, header: &[u8], frame: &[u8]) -> Result<()>;
}

/// Link that discards frames
#[derive(Debug, Default)]
pub struct NullLink {
    frames: u64,
}

impl NullLink {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl DisplayLink for NullLink {
    fn write_frame(&mut self, _header: &[u8], _frame: &[u8]) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

/// Push 2 display resolution
pub const PUSH2_DISPLAY: Size = Size::new(960, 160);
/// Bytes per encoded line: 960 pixels × 2 bytes plus 128 filler bytes
pub const LINE_BYTES: usize = 2048;
pub const FRAME_HEADER: [u8; 16] = [
    0xFF, 0xCC, 0xAA, 0x88, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];
const XOR_MASK: [u8; 4] = [0xE7, 0xF3, 0xE7, 0xFF];

/// Pack a BGRA pixel into the display's 16-bit format (blue high, red low)
pub fn to_bgr565([b, g, r, _a]: [u8; 4]) -> u16 {
    (u16::from(b >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(r >> 3)
}

/// Encode a full display frame: little-endian 565 pixels, lines padded to
/// [`LINE_BYTES`], every byte XOR-ed with the line mask
pub fn encode_frame(frame: &FrameBuffer, out: &mut BytesMut) {
    let size = frame.size();
    out.clear();
    out.reserve(size.height as usize * LINE_BYTES);

    for y in 0..size.height {
        let mut written = 0;
        for x in 0..size.width {
            let [lo, hi] = to_bgr565(frame.pixel(x, y)).to_le_bytes();
            out.put_u8(lo ^ XOR_MASK[written % 4]);
            out.put_u8(hi ^ XOR_MASK[(written + 1) % 4]);
            written += 2;
        }
        while written < LINE_BYTES {
            out.put_u8(XOR_MASK[written % 4]);
            written += 1;
        }
    }
}

/// Render medium for the Push 2 display
pub struct Push2Display<L> {
    link: L,
    frame: FrameBuffer,
    encoded: BytesMut,
}

impl<L: DisplayLink> Push2Display<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            frame: FrameBuffer::new(PUSH2_DISPLAY),
            encoded: BytesMut::with_capacity(PUSH2_DISPLAY.height as usize * LINE_BYTES),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }
}

impl<L: DisplayLink> RenderMedium for Push2Display<L> {
    fn stream_to_sub_window(&mut self, rect: Rect, pixels: &[u8]) -> Result<()> {
        self.frame.blit(rect, pixels)
    }

    fn flush_frame_buffer(&mut self) -> Result<()> {
        encode_frame(&self.frame, &mut self.encoded);
        self.link
            .write_frame(&FRAME_HEADER, &self.encoded)
            .context("display link rejected frame")
    }
}

/// Writes every n-th flushed frame to a PNG file
pub struct SnapshotMedium {
    path: PathBuf,
    every: u64,
    flushes: u64,
    frame: FrameBuffer,
}

impl SnapshotMedium {
    pub fn new(path: impl Into<PathBuf>, size: Size, every: u64) -> Self {
        let path = path.into();
        info!("Display snapshots → {} every {} frames", path.display(), every.max(1));
        Self {
            path,
            every: every.max(1),
            flushes: 0,
            frame: FrameBuffer::new(size),
        }
    }

    fn save(&self) -> Result<()> {
        let size = self.frame.size();
        let rgba: Vec<u8> = self
            .frame
            .as_bytes()
            .chunks_exact(BYTES_PER_PIXEL)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect();
        image::save_buffer(
            &self.path,
            &rgba,
            size.width,
            size.height,
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("Failed to write snapshot {}", self.path.display()))?;
        debug!("Wrote display snapshot {}", self.path.display());
        Ok(())
    }
}

impl RenderMedium for SnapshotMedium {
    fn stream_to_sub_window(&mut self, rect: Rect, pixels: &[u8]) -> Result<()> {
        self.frame.blit(rect, pixels)
    }

    fn flush_frame_buffer(&mut self) -> Result<()> {
        self.flushes += 1;
        if self.flushes % self.every == 0 {
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CaptureLink(Vec<Vec<u8>>);

    impl DisplayLink for CaptureLink {
        fn write_frame(&mut self, header: &[u8], frame: &[u8]) -> Result<()> {
            let mut bytes = header.to_vec();
            bytes.extend_from_slice(frame);
            self.0.push(bytes);
            Ok(())
        }
    }

    fn solid(size: Size, bgra: [u8; 4]) -> Vec<u8> {
        bgra.iter().copied().cycle().take(size.buffer_len()).collect()
    }

    #[test]
    fn test_bgr565_packing() {
        assert_eq!(to_bgr565([0, 0, 0xFF, 0xFF]), 0x001F); // red
        assert_eq!(to_bgr565([0, 0xFF, 0, 0xFF]), 0x07E0); // green
        assert_eq!(to_bgr565([0xFF, 0, 0, 0xFF]), 0xF800); // blue
    }

    #[test]
    fn test_blit_clips_to_display() {
        let mut fb = FrameBuffer::new(Size::new(4, 2));
        let pixels = solid(Size::new(3, 3), [1, 2, 3, 4]);
        fb.blit(Rect::new(2, -1, 3, 3), &pixels).unwrap();

        assert_eq!(fb.pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(fb.pixel(2, 0), [1, 2, 3, 4]);
        assert_eq!(fb.pixel(3, 1), [1, 2, 3, 4]);
    }

    #[test]
    fn test_blit_rejects_short_buffer() {
        let mut fb = FrameBuffer::new(Size::new(4, 2));
        assert!(fb.blit(Rect::new(0, 0, 2, 2), &[0; 3]).is_err());
    }

    #[test]
    fn test_blit_fully_outside_is_noop() {
        let mut fb = FrameBuffer::new(Size::new(4, 2));
        let pixels = solid(Size::new(2, 2), [9, 9, 9, 9]);
        fb.blit(Rect::new(10, 0, 2, 2), &pixels).unwrap();
        assert!(fb.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_push2_frame_layout() {
        let mut display = Push2Display::new(CaptureLink(Vec::new()));
        let pixels = solid(Size::new(1, 1), [0, 0, 0xFF, 0xFF]);
        display.stream_to_sub_window(Rect::new(0, 0, 1, 1), &pixels).unwrap();
        display.flush_frame_buffer().unwrap();

        let sent = &display.link().0;
        assert_eq!(sent.len(), 1);
        let bytes = &sent[0];
        assert_eq!(bytes.len(), 16 + 160 * LINE_BYTES);
        assert_eq!(&bytes[..4], &[0xFF, 0xCC, 0xAA, 0x88]);

        // Red pixel 0x001F, little endian, XOR-ed with the mask
        assert_eq!(bytes[16], 0x1F ^ 0xE7);
        assert_eq!(bytes[17], 0x00 ^ 0xF3);
        // Black pixel next to it is just the mask
        assert_eq!(bytes[18], 0xE7);
        assert_eq!(bytes[19], 0xFF);
        // Second line starts with the mask again
        assert_eq!(bytes[16 + LINE_BYTES], 0xE7);
    }

    #[test]
    fn test_snapshot_written_on_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut medium = SnapshotMedium::new(&path, Size::new(4, 4), 2);

        medium
            .stream_to_sub_window(Rect::new(0, 0, 4, 4), &solid(Size::new(4, 4), [0, 0, 255, 255]))
            .unwrap();
        medium.flush_frame_buffer().unwrap();
        assert!(!path.exists());
        medium.flush_frame_buffer().unwrap();
        assert!(path.exists());

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }
}
