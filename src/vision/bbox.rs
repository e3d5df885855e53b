//! Image-space boxes and detector output.

use std::fmt;

/// Axis-aligned pixel rectangle `(x, y, w, h)`.
///
/// A box with zero width or height is degenerate; it can be represented but
/// never reaches the position estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Build from signed pixel coordinates, clipping anything left of or
    /// above the image origin. Returns `None` if nothing positive remains.
    pub fn from_signed(x: i32, y: i32, w: i32, h: i32) -> Option<Self> {
        let right = x.saturating_add(w);
        let bottom = y.saturating_add(h);
        let x0 = x.max(0);
        let y0 = y.max(0);
        if right <= x0 || bottom <= y0 {
            return None;
        }
        Some(Self::new(
            x0 as u32,
            y0 as u32,
            (right - x0) as u32,
            (bottom - y0) as u32,
        ))
    }

    pub fn is_valid(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Box center in whole pixels, rounded towards the origin.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x as u64 + (self.w / 2) as u64) as f64,
            (self.y as u64 + (self.h / 2) as u64) as f64,
        )
    }

    /// Scale every coordinate by `factor`, truncating to whole pixels.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(
            (self.x as f64 * factor) as u32,
            (self.y as f64 * factor) as u32,
            (self.w as f64 * factor) as u32,
            (self.h as f64 * factor) as u32,
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.w, self.h)
    }
}

/// A single person candidate reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }
}

/// Largest valid detection by area, assumed to be the closest person.
///
/// Degenerate boxes are skipped. On equal areas the earliest detection in the
/// detector's own order wins.
pub fn select_largest(detections: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for det in detections.iter().filter(|d| d.bbox.is_valid()) {
        match best {
            Some(b) if det.bbox.area() <= b.bbox.area() => {}
            _ => best = Some(det),
        }
    }
    best
}
