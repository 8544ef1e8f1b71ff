//! Raster helpers: cropping and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use posemark_models::CropBounds;

use crate::error::{MediaError, MediaResult};

/// Default JPEG quality for encoded frames.
pub const JPEG_QUALITY: u8 = 80;

/// Copy the `bounds` region out of `image`.
pub fn crop_frame(image: &RgbImage, bounds: &CropBounds) -> MediaResult<RgbImage> {
    let (width, height) = image.dimensions();
    if !bounds.fits_within(width, height) {
        return Err(MediaError::InvalidCrop(format!(
            "{}x{}+{}+{} does not fit a {}x{} frame",
            bounds.width, bounds.height, bounds.x, bounds.y, width, height
        )));
    }
    Ok(image::imageops::crop_imm(image, bounds.x, bounds.y, bounds.width, bounds.height).to_image())
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> MediaResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_crop_frame() {
        let img = RgbImage::from_fn(10, 10, |x, y| Rgb([x as u8, y as u8, 0]));
        let cropped = crop_frame(&img, &CropBounds::new(2, 3, 4, 5)).unwrap();
        assert_eq!(cropped.dimensions(), (4, 5));
        assert_eq!(cropped.get_pixel(0, 0).0, [2, 3, 0]);

        assert!(matches!(
            crop_frame(&img, &CropBounds::new(8, 0, 4, 4)),
            Err(MediaError::InvalidCrop(_))
        ));
    }

    #[test]
    fn test_encode_jpeg_magic() {
        let img = RgbImage::from_pixel(16, 8, Rgb([200, 10, 10]));
        let bytes = encode_jpeg(&img, JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
