//! Box and detection types shared by the decoder, recovery and NMS stages.

use serde::Serialize;

/// Axis-aligned box as `[x0, y0, x1, y1]` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_array(coords: [f32; 4]) -> Self {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Shift every corner by `(-dx, -dy)`.
    pub fn shifted(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x0 - dx, self.y0 - dy, self.x1 - dx, self.y1 - dy)
    }

    /// Divide horizontal coordinates by `sx` and vertical ones by `sy`.
    pub fn unscaled(self, sx: f64, sy: f64) -> Self {
        Self::new(
            (self.x0 as f64 / sx) as f32,
            (self.y0 as f64 / sy) as f32,
            (self.x1 as f64 / sx) as f32,
            (self.y1 as f64 / sy) as f32,
        )
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        let w = self.x1.min(other.x1) - self.x0.max(other.x0);
        let h = self.y1.min(other.y1) - self.y0.max(other.y0);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }

    /// Intersection over union. Zero-area boxes overlap nothing.
    pub fn iou(&self, other: &Self) -> f32 {
        let a = self.area();
        let b = other.area();
        if a <= 0.0 || b <= 0.0 {
            return 0.0;
        }
        let inter = self.intersection_area(other);
        let union = a + b - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Integer `(x, y, w, h)` rect, truncated toward zero and never clamped.
    pub fn to_pixel_rect(self) -> PixelRect {
        PixelRect {
            x: self.x0 as i32,
            y: self.y0 as i32,
            width: (self.x1 - self.x0) as i32,
            height: (self.y1 - self.y0) as i32,
        }
    }
}

/// A decoded detection that has not been deduplicated yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub bbox: BBox,
    pub class_id: usize,
    pub score: f32,
}

/// Integer pixel rect in original-image coordinates. May extend past the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Final output unit for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub rect: PixelRect,
    pub class_id: usize,
    pub score: f32,
}

impl From<&Candidate> for Detection {
    fn from(candidate: &Candidate) -> Self {
        Self {
            rect: candidate.bbox.to_pixel_rect(),
            class_id: candidate.class_id,
            score: candidate.score,
        }
    }
}
