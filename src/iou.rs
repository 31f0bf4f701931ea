//! # Overlap
//!
//! Intersection-over-union for image-plane boxes (area) and for oriented 3D
//! boxes, either on their bird's-eye-view footprint or on their volume.

use geo::{intersects::Intersects, polygon, prelude::Area, Polygon};
use geo_clipper::Clipper;
use serde::{Deserialize, Serialize};

use crate::data::{Box2D, Box3D, ObjectType};

/// Fixed-point factor for the polygon clipper.
const CLIPPER_FACTOR: f64 = 1e6;

/// How two 3D boxes are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Footprint area only.
    Bev,
    /// Footprint area times vertical overlap.
    Volume,
}

impl Default for OverlapMode {
    fn default() -> Self {
        OverlapMode::Volume
    }
}

pub fn iou_2d(a: &Box2D, b: &Box2D) -> f32 {
    let iw = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let ih = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = iw * ih;
    let union = a.area() + b.area() - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn bev_polygon(bbox: &Box3D) -> Polygon<f64> {
    let [p0, p1, p2, p3] = bbox.bev_footprint();
    polygon![
        (x: p0.x as f64, y: p0.y as f64),
        (x: p1.x as f64, y: p1.y as f64),
        (x: p2.x as f64, y: p2.y as f64),
        (x: p3.x as f64, y: p3.y as f64),
    ]
}

/// Footprint areas of `a` and `b` and of their intersection. Boxes with a
/// non-finite field have no footprint.
fn bev_areas(a: &Box3D, b: &Box3D) -> (f32, f32, f32) {
    if !(a.is_finite() && b.is_finite()) {
        return (0.0, 0.0, 0.0);
    }
    let (base_a, base_b) = (bev_polygon(a), bev_polygon(b));
    let (area_a, area_b) = (base_a.unsigned_area() as f32, base_b.unsigned_area() as f32);
    let intersection = if base_a.intersects(&base_b) {
        base_a.intersection(&base_b, CLIPPER_FACTOR).unsigned_area() as f32
    } else {
        0.0
    };
    (area_a, area_b, intersection)
}

pub fn iou_bev(a: &Box3D, b: &Box3D) -> f32 {
    let (area_a, area_b, intersection) = bev_areas(a, b);
    let union = area_a + area_b - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

pub fn iou_3d(a: &Box3D, b: &Box3D) -> f32 {
    let (area_a, area_b, base_intersection) = bev_areas(a, b);
    if base_intersection <= 0.0 {
        return 0.0;
    }
    let (ca, cb) = (a.corners(), b.corners());
    // y points down: the bottom face has the larger y.
    let h_intersection = (ca.bottom().min(cb.bottom()) - ca.top().max(cb.top())).max(0.0);
    let intersection = base_intersection * h_intersection;
    let union = area_a * a.h + area_b * b.h - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// A box NMS can rank and compare.
pub trait Overlap {
    fn iou(&self, other: &Self, mode: OverlapMode) -> f32;

    /// Ground truth without a score counts as fully confident.
    fn confidence(&self) -> f32;

    fn class(&self) -> ObjectType;
}

impl Overlap for Box2D {
    fn iou(&self, other: &Self, _mode: OverlapMode) -> f32 {
        iou_2d(self, other)
    }

    fn confidence(&self) -> f32 {
        self.score.unwrap_or(1.0)
    }

    fn class(&self) -> ObjectType {
        self.cls
    }
}

impl Overlap for Box3D {
    fn iou(&self, other: &Self, mode: OverlapMode) -> f32 {
        match mode {
            OverlapMode::Bev => iou_bev(self, other),
            OverlapMode::Volume => iou_3d(self, other),
        }
    }

    fn confidence(&self) -> f32 {
        self.score.unwrap_or(1.0)
    }

    fn class(&self) -> ObjectType {
        self.cls
    }
}
