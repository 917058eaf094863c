//! Raw QImage pixel decoding for KWin screenshots
//!
//! KWin's ScreenShot2 interface writes unencoded pixels into a file
//! descriptor and describes them in the reply metadata. Rows may be padded,
//! so every row is read through `stride`.

use image::RgbaImage;

use super::image_buffer::ImageBuffer;
use crate::error::{CaptureError, CaptureResult};

/// `QImage::Format_RGB32` (0xffRRGGBB)
pub const FORMAT_RGB32: u32 = 4;
/// `QImage::Format_ARGB32` (0xAARRGGBB)
pub const FORMAT_ARGB32: u32 = 5;
/// `QImage::Format_ARGB32_Premultiplied`
pub const FORMAT_ARGB32_PREMULTIPLIED: u32 = 6;
/// `QImage::Format_RGB888`
pub const FORMAT_RGB888: u32 = 13;

/// Layout of the raw buffer, as reported by KWin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub width:  u32,
    pub height: u32,
    pub stride: u32,
    pub format: u32,
}

impl RawLayout {
    /// Bytes KWin has to write before the image is complete
    pub fn expected_len(&self) -> u64 {
        u64::from(self.stride) * u64::from(self.height)
    }

    fn bytes_per_pixel(&self) -> CaptureResult<u32> {
        match self.format {
            FORMAT_RGB32 | FORMAT_ARGB32 | FORMAT_ARGB32_PREMULTIPLIED => Ok(4),
            FORMAT_RGB888 => Ok(3),
            other => Err(CaptureError::ImageError(format!(
                "unsupported QImage format {other}"
            ))),
        }
    }
}

/// Converts raw KWin pixels into an RGBA bitmap
pub fn decode(raw: &[u8], layout: RawLayout) -> CaptureResult<ImageBuffer> {
    let bpp = layout.bytes_per_pixel()?;
    let row_len = (layout.width * bpp) as usize;
    let stride = layout.stride as usize;

    if layout.width == 0 || layout.height == 0 || stride < row_len {
        return Err(CaptureError::ImageError(format!(
            "invalid raw layout {}x{} stride {}",
            layout.width, layout.height, layout.stride
        )));
    }
    if (raw.len() as u64) < layout.expected_len() {
        return Err(CaptureError::ImageError(format!(
            "raw buffer has {} bytes, expected {}",
            raw.len(),
            layout.expected_len()
        )));
    }

    let mut rgba = Vec::with_capacity((layout.width * layout.height * 4) as usize);
    for row in raw.chunks_exact(stride).take(layout.height as usize) {
        let pixels = &row[..row_len];
        match layout.format {
            FORMAT_RGB888 => {
                for px in pixels.chunks_exact(3) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            format => {
                for px in pixels.chunks_exact(4) {
                    let argb = u32::from_ne_bytes([px[0], px[1], px[2], px[3]]);
                    let a = if format == FORMAT_RGB32 {
                        255
                    } else {
                        (argb >> 24) as u8
                    };
                    rgba.extend_from_slice(&[(argb >> 16) as u8, (argb >> 8) as u8, argb as u8, a]);
                }
            }
        }
    }

    RgbaImage::from_raw(layout.width, layout.height, rgba)
        .map(ImageBuffer::from_rgba)
        .ok_or_else(|| CaptureError::ImageError("raw pixel buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argb(a: u8, r: u8, g: u8, b: u8) -> [u8; 4] {
        let value = (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        value.to_ne_bytes()
    }

    #[test]
    fn test_argb32_to_rgba() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&argb(0x80, 10, 20, 30));
        raw.extend_from_slice(&argb(0xff, 40, 50, 60));
        let layout = RawLayout {
            width:  2,
            height: 1,
            stride: 8,
            format: FORMAT_ARGB32,
        };

        let rgba = decode(&raw, layout).unwrap().to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 0x80]);
        assert_eq!(rgba.get_pixel(1, 0).0, [40, 50, 60, 0xff]);
    }

    #[test]
    fn test_rgb32_forces_opaque() {
        let raw = argb(0x00, 1, 2, 3);
        let layout = RawLayout {
            width:  1,
            height: 1,
            stride: 4,
            format: FORMAT_RGB32,
        };

        let rgba = decode(&raw, layout).unwrap().to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn test_rgb888_with_row_padding() {
        // 1 pixel per row, 3 bytes of pixel + 1 byte padding
        let raw = [9, 8, 7, 0, 6, 5, 4, 0];
        let layout = RawLayout {
            width:  1,
            height: 2,
            stride: 4,
            format: FORMAT_RGB888,
        };

        let rgba = decode(&raw, layout).unwrap().to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0, [9, 8, 7, 255]);
        assert_eq!(rgba.get_pixel(0, 1).0, [6, 5, 4, 255]);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let layout = RawLayout {
            width:  2,
            height: 2,
            stride: 8,
            format: FORMAT_ARGB32_PREMULTIPLIED,
        };
        assert_eq!(layout.expected_len(), 16);
        assert!(decode(&[0u8; 12], layout).is_err());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let layout = RawLayout {
            width:  1,
            height: 1,
            stride: 4,
            format: 22,
        };
        assert!(matches!(decode(&[0u8; 4], layout), Err(CaptureError::ImageError(_))));
    }
}
