//! # Bounding Box Geometry
//!
//! Axis-aligned bounding boxes in source-image pixel coordinates, plus the
//! overlap metrics the merger and line reconstructor are built on.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-union between two boxes.
    ///
    /// Returns 0.0 for disjoint boxes and for degenerate (zero-area) unions,
    /// so callers never see NaN from a bad detection.
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Length in pixels of the overlap between the two boxes' vertical ranges.
    pub fn vertical_overlap(&self, other: &BBox) -> f32 {
        let top = self.y.max(other.y);
        let bottom = self.bottom().min(other.bottom());
        (bottom - top).max(0.0)
    }

    /// True when the vertical ranges overlap by more than half the smaller
    /// box's height. This is the row-membership test used when grouping
    /// fragments into output lines.
    pub fn shares_row_with(&self, other: &BBox) -> bool {
        let smaller_height = self.height.min(other.height);
        if smaller_height <= 0.0 {
            return false;
        }
        self.vertical_overlap(other) > smaller_height / 2.0
    }

    /// Quantized corner key for exact-duplicate detection. Sub-pixel jitter
    /// between identical detections collapses onto the same key.
    pub fn quantized(&self) -> (i32, i32, i32, i32) {
        (
            self.x.round() as i32,
            self.y.round() as i32,
            self.width.round() as i32,
            self.height.round() as i32,
        )
    }
}
