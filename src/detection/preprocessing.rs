use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Rgb, Rgb32FImage};
use ndarray::Array4;
use serde::Deserialize;

/// Numeric range of the values held by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelKind {
    /// Whole numbers in `0..=255`.
    Integer,
    Float,
}

/// Channel order the model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// A 3-channel image owned by whichever stage is currently working on it.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Rgb32FImage,
    kind: PixelKind,
}

impl Frame {
    /// Decode-side entry point. Swaps channels once if the model wants BGR.
    pub fn from_image(img: &DynamicImage, order: ChannelOrder) -> Self {
        let rgb = img.to_rgb8();
        let pixels = ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            match order {
                ChannelOrder::Rgb => Rgb([r as f32, g as f32, b as f32]),
                ChannelOrder::Bgr => Rgb([b as f32, g as f32, r as f32]),
            }
        });
        Self {
            pixels,
            kind: PixelKind::Integer,
        }
    }

    /// Wrap an existing float buffer; `kind` says what range its values are in.
    pub fn from_pixels(pixels: Rgb32FImage, kind: PixelKind) -> Self {
        Self { pixels, kind }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    pub fn pixels(&self) -> &Rgb32FImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels.get_pixel(x, y).0
    }
}

fn value_range(pixels: &Rgb32FImage) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for v in pixels.as_raw() {
        lo = lo.min(*v);
        hi = hi.max(*v);
    }
    if lo > hi { (0.0, 0.0) } else { (lo, hi) }
}

/// Bilinear resize to exactly `width x height`.
///
/// `imageops::resize` saturates float samples to `[0, 1]`, so values are mapped
/// into that range and back. The triangle filter only takes convex combinations,
/// which keeps the mapping exact. Integer frames are rounded back to `0..=255`.
pub fn resize_linear(frame: Frame, width: u32, height: u32) -> Frame {
    if frame.dimensions() == (width, height) {
        return frame;
    }

    let (lo, hi) = value_range(&frame.pixels);
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut unit = frame.pixels;
    for v in unit.iter_mut() {
        *v = (*v - lo) / span;
    }

    let mut resized = imageops::resize(&unit, width, height, FilterType::Triangle);
    for v in resized.iter_mut() {
        let restored = *v * span + lo;
        *v = match frame.kind {
            PixelKind::Integer => restored.round().clamp(0.0, 255.0),
            PixelKind::Float => restored,
        };
    }

    Frame {
        pixels: resized,
        kind: frame.kind,
    }
}

/// Surround the frame with a constant border.
pub fn pad_constant(frame: Frame, top: u32, bottom: u32, left: u32, right: u32, value: f32) -> Frame {
    let (width, height) = frame.dimensions();
    let mut canvas = Rgb32FImage::from_pixel(
        width + left + right,
        height + top + bottom,
        Rgb([value, value, value]),
    );
    imageops::replace(&mut canvas, &frame.pixels, left as i64, top as i64);

    Frame {
        pixels: canvas,
        kind: frame.kind,
    }
}

/// Divide every sample by `max_value`.
pub fn standardize(mut frame: Frame, max_value: f32) -> Frame {
    for v in frame.pixels.iter_mut() {
        *v /= max_value;
    }
    frame.kind = PixelKind::Float;
    frame
}

/// Per-channel `(x - mean) / std`.
pub fn normalize(mut frame: Frame, mean: [f32; 3], std: [f32; 3]) -> Frame {
    for pixel in frame.pixels.pixels_mut() {
        for c in 0..3 {
            pixel[c] = (pixel[c] - mean[c]) / std[c];
        }
    }
    frame.kind = PixelKind::Float;
    frame
}

/// Pack as a `(1, 3, height, width)` channel-first tensor.
pub fn to_tensor(frame: &Frame) -> Array4<f32> {
    let (width, height) = frame.dimensions();
    Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| frame.pixels.get_pixel(x as u32, y as u32)[channel],
    )
}
