//! # Detection output
//!
//! Writes decoded (and suppressed) boxes back out as KITTI result records,
//! the format consumed by the benchmark's evaluation tools.

use std::f32::consts::PI;

use itertools::Itertools;
use nalgebra as na;

use super::{Box2D, Box3D};
use crate::calibration::{project_in_front, CalibrationSet};

/// Observation angle of a box: yaw relative to the ray from the camera.
pub fn observation_angle(bbox: &Box3D) -> f32 {
    wrap_to_pi(bbox.rot_y - bbox.x.atan2(bbox.z))
}

/// Bring an angle into `[-π, π)`.
pub fn wrap_to_pi(angle: f32) -> f32 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Image-plane hull of a 3D box, clipped to the image.
///
/// `None` when no corner lies in front of the camera or the clipped hull is
/// empty.
pub fn image_hull(bbox: &Box3D, calib: &CalibrationSet, image_size: (u32, u32)) -> Option<Box2D> {
    let corners: Vec<na::Point3<f32>> = bbox.corners().0.to_vec();
    let pixels = project_in_front(&calib.p2, &corners);
    if pixels.is_empty() {
        return None;
    }
    let (w, h) = (image_size.0 as f32, image_size.1 as f32);
    let (mut x1, mut y1, mut x2, mut y2) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for (_, px) in &pixels {
        x1 = x1.min(px.x);
        y1 = y1.min(px.y);
        x2 = x2.max(px.x);
        y2 = y2.max(px.y);
    }
    let (x1, x2) = (x1.clamp(0.0, w - 1.0), x2.clamp(0.0, w - 1.0));
    let (y1, y2) = (y1.clamp(0.0, h - 1.0), y2.clamp(0.0, h - 1.0));
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    let hull = Box2D::from_corners(x1, y1, x2, y2, bbox.cls);
    Some(match bbox.score {
        Some(score) => hull.with_score(score),
        None => hull,
    })
}

/// One KITTI result line for a 3D box.
///
/// Truncation and occlusion are unknown for detections and written as -1.
pub fn format_kitti_record(bbox: &Box3D, hull: Option<&Box2D>) -> String {
    let (x1, y1, x2, y2) = hull.map(|b| (b.x1, b.y1, b.x2, b.y2)).unwrap_or((-1.0, -1.0, -1.0, -1.0));
    let mut line = format!(
        "{} -1 -1 {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2} {:.2}",
        bbox.cls,
        observation_angle(bbox),
        x1,
        y1,
        x2,
        y2,
        bbox.h,
        bbox.w,
        bbox.l,
        bbox.x,
        bbox.y,
        bbox.z,
        bbox.rot_y,
    );
    if let Some(score) = bbox.score {
        line.push_str(&format!(" {:.4}", score));
    }
    line
}

/// A full KITTI result file for one frame.
pub fn format_kitti_frame(boxes: &[Box3D], calib: &CalibrationSet, image_size: (u32, u32)) -> String {
    boxes
        .iter()
        .map(|b| format_kitti_record(b, image_hull(b, calib, image_size).as_ref()) + "\n")
        .join("")
}
