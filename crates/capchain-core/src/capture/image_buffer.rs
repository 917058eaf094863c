//! Image buffer wrapper for captured bitmaps
//!
//! Every capture mechanism hands back an [`ImageBuffer`]: a decoded bitmap in
//! a standard in-memory pixel format. Ownership moves to the caller on a
//! successful capture.
//!
//! # Examples
//!
//! ```
//! use capchain_core::{capture::ImageBuffer, model::Region};
//!
//! let img = ImageBuffer::from_test_pattern(1920, 1080);
//! let cropped = img.crop(Region::new(100, 100, 800, 400)).unwrap();
//! assert_eq!(cropped.dimensions(), (800, 400));
//! ```

use std::path::Path;

use image::{GenericImageView, RgbaImage};

use crate::{
    error::{CaptureError, CaptureResult},
    model::Region,
};

/// Wrapper around `image::DynamicImage`
///
/// All transformation methods return new `ImageBuffer` instances, leaving
/// the original unchanged.
#[derive(Clone, Debug)]
pub struct ImageBuffer {
    inner: image::DynamicImage,
}

impl ImageBuffer {
    /// Creates a new ImageBuffer from a DynamicImage
    pub fn new(image: image::DynamicImage) -> Self {
        Self { inner: image }
    }

    /// Wraps an RGBA8 bitmap
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self::new(image::DynamicImage::ImageRgba8(image))
    }

    /// Decodes an encoded image (PNG, JPEG, WebP) from memory
    pub fn decode(bytes: &[u8]) -> CaptureResult<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::new(image))
    }

    /// Decodes an image file, rejecting empty files
    ///
    /// The file is read fully before decoding so the caller can delete it
    /// straight afterwards.
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(CaptureError::ImageError(format!(
                "{} is empty",
                path.display()
            )));
        }
        Self::decode(&bytes)
    }

    /// Crops the image to the specified region
    ///
    /// The region must be non-empty and lie entirely within the image bounds,
    /// otherwise an `InvalidParameter` error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use capchain_core::{capture::ImageBuffer, model::Region};
    ///
    /// let img = ImageBuffer::from_test_pattern(1920, 1080);
    /// assert!(img.crop(Region::new(1900, 0, 100, 100)).is_err());
    /// ```
    pub fn crop(&self, region: Region) -> CaptureResult<Self> {
        let (img_width, img_height) = self.dimensions();

        if region.is_empty() {
            return Err(CaptureError::invalid_region(format!(
                "Region size {}x{} must be positive",
                region.width, region.height
            )));
        }

        if region.x < 0 || region.y < 0 {
            return Err(CaptureError::invalid_region(format!(
                "Region origin ({}, {}) is outside image bounds ({}x{})",
                region.x, region.y, img_width, img_height
            )));
        }

        if region.right() > i64::from(img_width) || region.bottom() > i64::from(img_height) {
            return Err(CaptureError::invalid_region(format!(
                "Region ({}x{} at {},{}) extends beyond image bounds ({}x{})",
                region.width, region.height, region.x, region.y, img_width, img_height
            )));
        }

        let cropped = self.inner.crop_imm(
            region.x as u32,
            region.y as u32,
            region.width as u32,
            region.height as u32,
        );

        Ok(Self::new(cropped))
    }

    /// Crops to the part of `region` that overlaps the image
    ///
    /// Returns `None` when nothing overlaps.
    pub fn crop_clamped(&self, region: Region) -> Option<Self> {
        let (width, height) = self.dimensions();
        let bounds = Region::new(0, 0, width as i32, height as i32);
        let clipped = region.intersect(&bounds)?;
        self.crop(clipped).ok()
    }

    /// Composes tiles onto one canvas covering `bounds`
    ///
    /// Each tile is placed at its region's offset from the canvas origin.
    /// Used to assemble a virtual-desktop image from per-monitor captures.
    pub fn stitch(bounds: Region, tiles: &[(Region, ImageBuffer)]) -> CaptureResult<Self> {
        if bounds.is_empty() {
            return Err(CaptureError::invalid_region("virtual desktop has no area"));
        }

        let mut canvas = RgbaImage::new(bounds.width as u32, bounds.height as u32);
        for (region, tile) in tiles {
            let rgba = tile.to_rgba8();
            image::imageops::overlay(
                &mut canvas,
                &rgba,
                i64::from(region.x) - i64::from(bounds.x),
                i64::from(region.y) - i64::from(bounds.y),
            );
        }

        Ok(Self::from_rgba(canvas))
    }

    /// Returns the dimensions of the image as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// Returns the image width in pixels
    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    /// Returns the image height in pixels
    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    /// Converts the image to RGBA8 format
    pub fn to_rgba8(&self) -> RgbaImage {
        self.inner.to_rgba8()
    }

    /// Writes the image as PNG
    pub fn write_png(&self, path: &Path) -> CaptureResult<()> {
        self.inner.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Creates a vertical blue-to-cyan gradient
    ///
    /// Useful for exercising the pipeline without a real capture mechanism.
    pub fn from_test_pattern(width: u32, height: u32) -> Self {
        let img = RgbaImage::from_fn(width, height, |_x, y| {
            let ratio = y as f32 / height.max(1) as f32;
            image::Rgba([0, (255.0 * ratio) as u8, 255, 255])
        });

        Self::from_rgba(img)
    }

    /// Returns a reference to the inner DynamicImage
    pub fn inner(&self) -> &image::DynamicImage {
        &self.inner
    }

    /// Consumes self and returns the inner DynamicImage
    pub fn into_inner(self) -> image::DynamicImage {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_from_dynamic_image() {
        let dynamic = image::DynamicImage::new_rgb8(100, 100);
        let buffer = ImageBuffer::new(dynamic);
        assert_eq!(buffer.dimensions(), (100, 100));
    }

    #[test]
    fn test_crop_valid_region() {
        let img = ImageBuffer::from_test_pattern(1920, 1080);
        let cropped = img.crop(Region::new(460, 240, 1000, 600)).unwrap();
        assert_eq!(cropped.dimensions(), (1000, 600));
    }

    #[test]
    fn test_crop_boundary_check() {
        let img = ImageBuffer::from_test_pattern(1920, 1080);

        let full = img.crop(Region::new(0, 0, 1920, 1080)).unwrap();
        assert_eq!(full.dimensions(), (1920, 1080));

        let corner = img.crop(Region::new(1820, 980, 100, 100)).unwrap();
        assert_eq!(corner.dimensions(), (100, 100));
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let img = ImageBuffer::from_test_pattern(1920, 1080);

        assert!(img.crop(Region::new(2000, 1000, 100, 100)).is_err());
        assert!(img.crop(Region::new(1900, 1000, 200, 200)).is_err());
        assert!(img.crop(Region::new(-1, 0, 10, 10)).is_err());
    }

    #[test]
    fn test_crop_rejects_empty_region() {
        let img = ImageBuffer::from_test_pattern(100, 100);
        let err = img.crop(Region::new(0, 0, 0, 10)).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidParameter { .. }));
    }

    #[test]
    fn test_crop_clamped() {
        let img = ImageBuffer::from_test_pattern(100, 80);

        let clipped = img.crop_clamped(Region::new(50, 40, 200, 200)).unwrap();
        assert_eq!(clipped.dimensions(), (50, 40));

        let from_negative = img.crop_clamped(Region::new(-20, -20, 40, 40)).unwrap();
        assert_eq!(from_negative.dimensions(), (20, 20));

        assert!(img.crop_clamped(Region::new(100, 0, 10, 10)).is_none());
    }

    #[test]
    fn test_stitch_places_tiles() {
        let left = ImageBuffer::from_rgba(RgbaImage::from_pixel(
            10,
            10,
            image::Rgba([255, 0, 0, 255]),
        ));
        let right = ImageBuffer::from_rgba(RgbaImage::from_pixel(
            10,
            5,
            image::Rgba([0, 255, 0, 255]),
        ));
        let tiles = vec![
            (Region::new(-10, 0, 10, 10), left),
            (Region::new(0, 0, 10, 5), right),
        ];

        let stitched = ImageBuffer::stitch(Region::new(-10, 0, 20, 10), &tiles).unwrap();
        assert_eq!(stitched.dimensions(), (20, 10));

        let rgba = stitched.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0), &image::Rgba([255, 0, 0, 255]));
        assert_eq!(rgba.get_pixel(15, 2), &image::Rgba([0, 255, 0, 255]));
        // Uncovered area stays transparent
        assert_eq!(rgba.get_pixel(15, 8), &image::Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_png_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");

        ImageBuffer::from_test_pattern(64, 32).write_png(&path).unwrap();
        let loaded = ImageBuffer::load(&path).unwrap();
        assert_eq!(loaded.dimensions(), (64, 32));
    }

    #[test]
    fn test_load_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(ImageBuffer::load(&path), Err(CaptureError::ImageError(_))));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(ImageBuffer::decode(b"definitely not an image").is_err());
    }
}
