//! Raw engine pixels to host pixels.
//!
//! Host pixels are packed 32-bit ARGB words: `(a << 24) | (r << 16) | (g << 8) | b`. Raw
//! buffers are rows of 4-byte pixels, tightly packed, in the adapter's [`RawPixelFormat`].

use crate::engine::adapter::RawPixelFormat;

const BYTES_PER_PIXEL: usize = 4;

#[inline]
pub fn pack_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    u32::from_be_bytes([a, r, g, b])
}

/// Converts a single raw pixel. `px` must hold at least 4 bytes.
#[inline]
pub fn to_argb(px: &[u8], format: RawPixelFormat) -> u32 {
    match format {
        RawPixelFormat::Bgra8 => pack_argb(px[3], px[2], px[1], px[0]),
        RawPixelFormat::Rgba8 => pack_argb(px[3], px[0], px[1], px[2]),
    }
}

/// Number of complete rows of `raw_width` pixels held by `raw`.
pub fn complete_rows(raw: &[u8], raw_width: u32) -> u32 {
    let stride = raw_width as usize * BYTES_PER_PIXEL;
    if stride == 0 {
        return 0;
    }
    u32::try_from(raw.len() / stride).unwrap_or(u32::MAX)
}

/// Copies the region shared by the raw buffer and the destination, pixel for pixel.
///
/// Pixels of `dst` outside the overlap keep their previous value.
pub fn blit(
    raw: &[u8],
    raw_width: u32,
    rows: u32,
    format: RawPixelFormat,
    dst: &mut [u32],
    dst_width: u32,
    dst_height: u32,
) {
    let stride = raw_width as usize * BYTES_PER_PIXEL;
    let copy_w = raw_width.min(dst_width) as usize;
    let copy_h = rows.min(dst_height) as usize;
    let dst_w = dst_width as usize;

    for y in 0..copy_h {
        let src_row = &raw[y * stride..y * stride + copy_w * BYTES_PER_PIXEL];
        let dst_row = &mut dst[y * dst_w..y * dst_w + copy_w];
        for (d, s) in dst_row.iter_mut().zip(src_row.chunks_exact(BYTES_PER_PIXEL)) {
            *d = to_argb(s, format);
        }
    }
}

/// Down-samples a raw buffer of twice the destination width by taking the top-left pixel of
/// every 2x2 block.
pub fn downsample_2x(
    raw: &[u8],
    raw_width: u32,
    rows: u32,
    format: RawPixelFormat,
    dst: &mut [u32],
    dst_width: u32,
    dst_height: u32,
) {
    let stride = raw_width as usize * BYTES_PER_PIXEL;
    let copy_w = dst_width.min(raw_width.div_ceil(2)) as usize;
    let copy_h = dst_height.min(rows.div_ceil(2)) as usize;
    let dst_w = dst_width as usize;

    for y in 0..copy_h {
        let src_row = &raw[2 * y * stride..(2 * y + 1) * stride];
        let dst_row = &mut dst[y * dst_w..y * dst_w + copy_w];
        for (x, d) in dst_row.iter_mut().enumerate() {
            let off = 2 * x * BYTES_PER_PIXEL;
            *d = to_argb(&src_row[off..off + BYTES_PER_PIXEL], format);
        }
    }
}
