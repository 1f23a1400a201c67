use serde::{Deserialize, Serialize};

/// A face box in normalized `[0, 1]` frame coordinates.
///
/// Detectors guarantee `x1 <= x2` and `y1 <= y2`. Dilation may push high
/// edges past 1.0; conversion to pixels clamps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// Half-open pixel rectangle `[x1, x2) x [y1, y2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f64 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Pads the box by scaling its edges: the low edges by `2 - amount`,
    /// the high edges by `amount`.
    pub fn dilate(&self, amount: f64) -> BoundingBox {
        BoundingBox {
            x1: self.x1 * (2.0 - amount),
            y1: self.y1 * (2.0 - amount),
            x2: self.x2 * amount,
            y2: self.y2 * amount,
        }
    }

    /// Converts to a pixel rect inside a `frame_w` x `frame_h` frame.
    ///
    /// `expand` widens every edge by that normalized margin before clamping
    /// to the frame. With `square`, the largest centered square is taken,
    /// cutting the long axis. The result covers at least one pixel whenever
    /// the frame itself is non-empty.
    pub fn crop_rect(&self, frame_w: u32, frame_h: u32, expand: f64, square: bool) -> PixelRect {
        let (x1, x2) = axis_span(self.x1, self.x2, expand, frame_w);
        let (y1, y2) = axis_span(self.y1, self.y2, expand, frame_h);
        let rect = PixelRect { x1, y1, x2, y2 };

        if square {
            square_within(rect)
        } else {
            rect
        }
    }
}

fn axis_span(lo: f64, hi: f64, expand: f64, extent: u32) -> (u32, u32) {
    let lo = (lo - expand).clamp(0.0, 1.0);
    let hi = (hi + expand).clamp(0.0, 1.0);
    let size = extent as f64;

    let mut p1 = (lo * size) as u32;
    let mut p2 = ((hi * size) as u32).max(p1);

    if p1 == p2 && extent > 0 {
        if p2 < extent {
            p2 += 1;
        } else {
            p1 -= 1;
        }
    }
    (p1, p2)
}

fn square_within(rect: PixelRect) -> PixelRect {
    let w = rect.width();
    let h = rect.height();

    if h > w {
        let half = w / 2;
        let center = rect.y1 + h / 2;
        PixelRect {
            y1: center - half,
            y2: center + (w - half),
            ..rect
        }
    } else {
        let half = h / 2;
        let center = rect.x1 + w / 2;
        PixelRect {
            x1: center - half,
            x2: center + (h - half),
            ..rect
        }
    }
}
