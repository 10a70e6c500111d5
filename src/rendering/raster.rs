//! PNG decoding, alpha flattening and resampling helpers

use crate::error::AssemblyError;
use crate::rendering::Rgb;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, Rgba};

pub use image::{RgbImage, RgbaImage};

/// Decode a PNG payload (any colour type or bit depth) into RGBA8.
pub fn decode_png(data: &[u8]) -> Result<RgbaImage, AssemblyError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Png)?.to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(AssemblyError::InvalidRaster(format!(
            "empty image ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(image)
}

fn opaque(background: Rgb) -> Rgba<u8> {
    Rgba([background.r, background.g, background.b, 255])
}

/// Composite the image over an opaque background and drop the alpha channel.
pub fn flatten(image: &RgbaImage, background: Rgb) -> RgbImage {
    let mut canvas = RgbaImage::from_pixel(image.width(), image.height(), opaque(background));
    imageops::overlay(&mut canvas, image, 0, 0);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

/// Nearest-neighbour resample by `factor`. Output dimensions are rounded and
/// never drop below one pixel.
pub fn upscale_nearest(image: &RgbaImage, factor: f32) -> RgbaImage {
    let width = ((image.width() as f32 * factor).round() as u32).max(1);
    let height = ((image.height() as f32 * factor).round() as u32).max(1);
    if width == image.width() && height == image.height() {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Nearest)
}

/// Lay the image on a `min_width`-wide background, anchored top-left.
pub fn pad_to_width(image: &RgbaImage, min_width: u32, background: Rgb) -> RgbaImage {
    if image.width() >= min_width {
        return image.clone();
    }
    let mut canvas = RgbaImage::from_pixel(min_width, image.height(), opaque(background));
    imageops::replace(&mut canvas, image, 0, 0);
    canvas
}

pub fn encode_rgb_png(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)?;
    Ok(out)
}

pub fn encode_rgba_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = if (x + y) % 2 == 0 { 0 } else { 255 };
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn flatten_transparent_pixels_become_background() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let rgb = flatten(&img, Rgb::WHITE);
        assert_eq!(rgb.as_raw(), &vec![255, 255, 255, 10, 20, 30]);
    }

    #[test]
    fn flatten_half_alpha_blends() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let rgb = flatten(&img, Rgb::WHITE);
        for c in rgb.as_raw() {
            assert!((126..=128).contains(c), "{}", c);
        }
    }

    #[test]
    fn upscale_doubles_dimensions_and_repeats_pixels() {
        let img = checker(2, 1);
        let up = upscale_nearest(&img, 2.0);
        assert_eq!(up.dimensions(), (4, 2));
        assert_eq!(up.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(up.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
        assert_eq!(up.get_pixel(2, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(up.get_pixel(3, 1), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn padding_fills_the_right_edge_with_background() {
        let img = RgbaImage::from_pixel(2, 3, Rgba([1, 2, 3, 255]));
        let padded = pad_to_width(&img, 5, Rgb::new(9, 9, 9));
        assert_eq!(padded.dimensions(), (5, 3));
        assert_eq!(padded.get_pixel(1, 2), &Rgba([1, 2, 3, 255]));
        assert_eq!(padded.get_pixel(4, 0), &Rgba([9, 9, 9, 255]));
        assert_eq!(pad_to_width(&img, 2, Rgb::WHITE), img);
    }

    #[test]
    fn png_encode_decode_preserves_pixels() {
        let img = checker(3, 5);
        let png = encode_rgba_png(&img).unwrap();
        assert_eq!(decode_png(&png).unwrap(), img);
    }

    #[test]
    fn rgb_png_decodes_opaque() {
        let png = encode_rgb_png(&RgbImage::from_raw(1, 1, vec![1, 2, 3]).unwrap()).unwrap();
        let decoded = decode_png(&png).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn garbage_is_invalid_raster() {
        let err = decode_png(b"not a png").unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidRaster(_)));
    }
}
