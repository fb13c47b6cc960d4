//! Host-side pixel buffer of a surface.
//!
//! The engine paints on the pump thread, the UI reads on its own thread. A [`FrameBuffer`]
//! converts every accepted paint into packed ARGB pixels under a per-surface lock and raises a
//! dirty flag once the whole buffer has been rewritten. The UI polls that flag with
//! [`FrameBuffer::needs_update`] and copies the frame out with [`FrameBuffer::acquire_frame`].

pub mod convert;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::engine::adapter::RawPixelFormat;
use crate::engine::surface::SurfaceId;

/// A complete frame of packed ARGB pixels, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Frame {
    /// Creates a frame filled with a single color.
    pub fn filled(width: u32, height: u32, argb: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![argb; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.pixels.len())
            .finish()
    }
}

/// What happened to a paint offered to a [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintOutcome {
    /// Frame was rewritten and marked dirty
    Updated,
    /// Paint arrived too soon after the previous accepted one
    Throttled,
    /// Popup paints are not composited
    IgnoredPopup,
    /// Raw buffer did not hold a single complete row
    Empty,
}

struct FrameState {
    frame: Frame,
    last_paint: Option<Instant>,
    /// Last raw size that did not match the frame, to avoid logging every paint
    last_mismatch: Option<(u32, u32)>,
}

pub struct FrameBuffer {
    owner: SurfaceId,
    format: RawPixelFormat,
    min_interval: Duration,
    background: u32,
    state: Mutex<FrameState>,
    dirty: AtomicBool,
    painted: AtomicBool,
}

impl FrameBuffer {
    pub fn new(
        owner: SurfaceId,
        width: u32,
        height: u32,
        format: RawPixelFormat,
        min_interval: Duration,
        background: u32,
    ) -> Self {
        Self {
            owner,
            format,
            min_interval,
            background,
            state: Mutex::new(FrameState {
                frame: Frame::filled(width, height, background),
                last_paint: None,
                last_mismatch: None,
            }),
            dirty: AtomicBool::new(false),
            painted: AtomicBool::new(false),
        }
    }

    /// Offers a raw engine paint.
    pub fn paint(&self, raw: &[u8], raw_width: u32, raw_height: u32, popup: bool) -> PaintOutcome {
        self.paint_at(Instant::now(), raw, raw_width, raw_height, popup)
    }

    /// Offers a raw engine paint as if it arrived at `now`.
    ///
    /// Paints arriving sooner than the minimum interval after the previous accepted paint are
    /// dropped. A raw buffer of exactly twice the frame width is down-sampled by taking the
    /// top-left pixel of every 2x2 block. Any other size is copied pixel for pixel over the
    /// overlapping region.
    pub fn paint_at(
        &self,
        now: Instant,
        raw: &[u8],
        raw_width: u32,
        raw_height: u32,
        popup: bool,
    ) -> PaintOutcome {
        if popup {
            log::trace!("Surface[{}]: ignoring popup paint {}x{}", self.owner, raw_width, raw_height);
            return PaintOutcome::IgnoredPopup;
        }

        let mut state = self.lock();
        if let Some(last) = state.last_paint {
            if now.saturating_duration_since(last) < self.min_interval {
                return PaintOutcome::Throttled;
            }
        }

        let available = convert::complete_rows(raw, raw_width);
        let rows = raw_height.min(available);
        if rows == 0 {
            log::warn!(
                "Surface[{}]: paint {}x{} carried no complete row ({} bytes)",
                self.owner,
                raw_width,
                raw_height,
                raw.len()
            );
            return PaintOutcome::Empty;
        }
        if rows < raw_height {
            log::warn!(
                "Surface[{}]: paint buffer truncated, converting {} of {} rows",
                self.owner,
                rows,
                raw_height
            );
        }

        let (width, height) = (state.frame.width, state.frame.height);
        let downsample = width > 0 && raw_width == width * 2;
        let matches = if downsample {
            raw_height == height * 2
        } else {
            raw_width == width && raw_height == height
        };
        if matches {
            state.last_mismatch = None;
        } else if state.last_mismatch != Some((raw_width, raw_height)) {
            log::warn!(
                "Surface[{}]: paint of {}x{} does not match frame {}x{}",
                self.owner,
                raw_width,
                raw_height,
                width,
                height
            );
            state.last_mismatch = Some((raw_width, raw_height));
        }

        let frame = &mut state.frame;
        if downsample {
            convert::downsample_2x(raw, raw_width, rows, self.format, &mut frame.pixels, width, height);
        } else {
            convert::blit(raw, raw_width, rows, self.format, &mut frame.pixels, width, height);
        }

        state.last_paint = Some(now);
        self.painted.store(true, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
        PaintOutcome::Updated
    }

    /// Replaces the frame with a blank one of the new size. The next paint is never throttled.
    pub fn resize(&self, width: u32, height: u32) {
        let mut state = self.lock();
        state.frame = Frame::filled(width, height, self.background);
        state.last_paint = None;
        state.last_mismatch = None;
        self.dirty.store(true, Ordering::Release);
    }

    /// Returns true when the frame changed since the previous call, and clears the flag.
    pub fn needs_update(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Returns true once at least one paint has been accepted.
    pub fn has_painted(&self) -> bool {
        self.painted.load(Ordering::Acquire)
    }

    /// Copy of the current frame.
    pub fn acquire_frame(&self) -> Frame {
        self.lock().frame.clone()
    }

    /// Runs `f` against the current frame without copying it. The pump thread cannot paint while
    /// `f` runs, so keep it short.
    pub fn with_frame<T>(&self, f: impl FnOnce(&Frame) -> T) -> T {
        f(&self.lock().frame)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.lock();
        (state.frame.width, state.frame.height)
    }

    fn lock(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::DEFAULT_BACKGROUND;

    fn buffer(width: u32, height: u32, interval_ms: u64) -> FrameBuffer {
        FrameBuffer::new(
            SurfaceId::new(),
            width,
            height,
            RawPixelFormat::Bgra8,
            Duration::from_millis(interval_ms),
            DEFAULT_BACKGROUND,
        )
    }

    fn solid_bgra(width: u32, height: u32, b: u8, g: u8, r: u8) -> Vec<u8> {
        [b, g, r, 0xFF].repeat(width as usize * height as usize)
    }

    #[test]
    fn starts_white_and_clean() {
        let fb = buffer(3, 2, 16);
        assert!(!fb.needs_update());
        assert!(!fb.has_painted());
        let frame = fb.acquire_frame();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert!(frame.pixels().iter().all(|p| *p == 0xFFFF_FFFF));
    }

    #[test]
    fn paint_converts_and_marks_dirty_once() {
        let fb = buffer(2, 2, 16);
        assert_eq!(fb.paint(&solid_bgra(2, 2, 0x30, 0x20, 0x10), 2, 2, false), PaintOutcome::Updated);
        assert!(fb.has_painted());
        assert!(fb.needs_update());
        assert!(!fb.needs_update());
        assert_eq!(fb.acquire_frame().pixel(1, 1), Some(0xFF10_2030));
    }

    #[test]
    fn paints_within_the_interval_are_dropped() {
        let fb = buffer(1, 1, 16);
        let t0 = Instant::now();
        let red = solid_bgra(1, 1, 0, 0, 0xFF);
        let blue = solid_bgra(1, 1, 0xFF, 0, 0);

        assert_eq!(fb.paint_at(t0, &red, 1, 1, false), PaintOutcome::Updated);
        assert_eq!(fb.paint_at(t0 + Duration::from_millis(5), &blue, 1, 1, false), PaintOutcome::Throttled);
        assert_eq!(fb.acquire_frame().pixel(0, 0), Some(0xFFFF_0000));

        assert_eq!(fb.paint_at(t0 + Duration::from_millis(20), &blue, 1, 1, false), PaintOutcome::Updated);
        assert_eq!(fb.acquire_frame().pixel(0, 0), Some(0xFF00_00FF));
    }

    #[test]
    fn double_width_paint_is_downsampled() {
        // 4x4 checkerboard into a 2x2 frame
        let fb = buffer(2, 2, 0);
        let mut raw = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                let v = if (x + y) % 2 == 0 { 0x00 } else { 0xFF };
                raw.extend_from_slice(&[v, v, v, 0xFF]);
            }
        }

        assert_eq!(fb.paint(&raw, 4, 4, false), PaintOutcome::Updated);
        let frame = fb.acquire_frame();
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(frame.pixel(x, y), Some(0xFF00_0000), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn mismatched_paint_copies_the_overlap() {
        let fb = buffer(3, 3, 0);
        assert_eq!(fb.paint(&solid_bgra(1, 2, 0, 0, 0), 1, 2, false), PaintOutcome::Updated);
        let frame = fb.acquire_frame();
        assert_eq!(frame.pixel(0, 0), Some(0xFF00_0000));
        assert_eq!(frame.pixel(0, 1), Some(0xFF00_0000));
        assert_eq!(frame.pixel(1, 0), Some(0xFFFF_FFFF));
        assert_eq!(frame.pixel(0, 2), Some(0xFFFF_FFFF));
    }

    #[test]
    fn truncated_buffer_converts_complete_rows_only() {
        let fb = buffer(2, 2, 0);
        let mut raw = solid_bgra(2, 1, 0, 0, 0);
        raw.extend_from_slice(&[0, 0, 0]);
        assert_eq!(fb.paint(&raw, 2, 2, false), PaintOutcome::Updated);
        let frame = fb.acquire_frame();
        assert_eq!(frame.pixel(1, 0), Some(0xFF00_0000));
        assert_eq!(frame.pixel(0, 1), Some(0xFFFF_FFFF));

        assert_eq!(fb.paint(&[1, 2, 3], 2, 2, false), PaintOutcome::Empty);
    }

    #[test]
    fn popup_paints_are_ignored_without_using_the_budget() {
        let fb = buffer(1, 1, 16);
        let t0 = Instant::now();
        let black = solid_bgra(1, 1, 0, 0, 0);
        assert_eq!(fb.paint_at(t0, &black, 1, 1, true), PaintOutcome::IgnoredPopup);
        assert!(!fb.needs_update());
        assert_eq!(fb.paint_at(t0, &black, 1, 1, false), PaintOutcome::Updated);
    }

    #[test]
    fn resize_replaces_the_frame() {
        let fb = buffer(4, 4, 0);
        fb.paint(&solid_bgra(4, 4, 0, 0, 0), 4, 4, false);
        assert!(fb.needs_update());

        fb.resize(800, 600);
        assert_eq!(fb.dimensions(), (800, 600));
        assert!(fb.needs_update());
        let frame = fb.acquire_frame();
        assert_eq!(frame.pixels().len(), 800 * 600);
        assert_eq!(frame.pixel(0, 0), Some(DEFAULT_BACKGROUND));
    }

    #[test]
    fn first_paint_after_resize_is_not_throttled() {
        let fb = buffer(4, 4, 16);
        let start = Instant::now();
        assert_eq!(fb.paint_at(start, &solid_bgra(4, 4, 1, 2, 3), 4, 4, false), PaintOutcome::Updated);

        fb.resize(8, 8);
        let outcome = fb.paint_at(start + Duration::from_millis(2), &solid_bgra(8, 8, 1, 2, 3), 8, 8, false);
        assert_eq!(outcome, PaintOutcome::Updated);
        assert_eq!(fb.acquire_frame().pixel(7, 7), Some(0xFF030201));
    }

    #[test]
    fn with_frame_borrows_in_place() {
        let fb = buffer(5, 7, 0);
        let len = fb.with_frame(|f| f.pixels().len());
        assert_eq!(len, 35);
    }
}
