//! # Calibration
//!
//! Per-frame KITTI calibration and the coordinate-frame transforms built on
//! it: velodyne → rectified camera → image plane.

use nalgebra as na;

use crate::error::{Error, Result};

/// The three matrices a frame needs, each padded to 4×4 homogeneous form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationSet {
    /// Rigid velodyne → (unrectified) camera transform.
    pub tr_velo_to_cam: na::Matrix4<f32>,
    /// Rectifying rotation.
    pub r0_rect: na::Matrix4<f32>,
    /// Projection of the left color camera.
    pub p2: na::Matrix4<f32>,
}

impl CalibrationSet {
    /// `R0_rect · Tr_velo_to_cam`, applied to LiDAR points before anything else.
    pub fn velo_to_rect(&self) -> na::Matrix4<f32> {
        self.r0_rect * self.tr_velo_to_cam
    }

    pub fn rect_to_velo(&self) -> Result<na::Matrix4<f32>> {
        self.velo_to_rect()
            .try_inverse()
            .ok_or_else(|| Error::Parse("velodyne to camera transform is singular".to_string()))
    }
}

/// Parse a KITTI calibration file.
///
/// Only `Tr_velo_to_cam`, `R0_rect` and `P2` are read; other matrices are
/// ignored, a missing one is an error.
pub fn parse_calibration(text: &str) -> Result<CalibrationSet> {
    let (mut tr_velo_to_cam, mut r0_rect, mut p2) = (None, None, None);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, values) = match line.split_once(':') {
            Some(pair) => pair,
            None => return Err(Error::Parse(format!("calibration line without a matrix name: {:?}", line))),
        };
        match name.trim() {
            "Tr_velo_to_cam" => tr_velo_to_cam = Some(pad_3x4(&parse_values(name, values, 12)?)),
            "R0_rect" => r0_rect = Some(pad_3x3(&parse_values(name, values, 9)?)),
            "P2" => p2 = Some(pad_3x4(&parse_values(name, values, 12)?)),
            _ => {}
        }
    }
    let missing = |name: &str| Error::Parse(format!("calibration is missing {}", name));
    Ok(CalibrationSet {
        tr_velo_to_cam: tr_velo_to_cam.ok_or_else(|| missing("Tr_velo_to_cam"))?,
        r0_rect: r0_rect.ok_or_else(|| missing("R0_rect"))?,
        p2: p2.ok_or_else(|| missing("P2"))?,
    })
}

fn parse_values(name: &str, values: &str, expected: usize) -> Result<Vec<f32>> {
    let values = values
        .split_whitespace()
        .map(|v| v.parse::<f32>().map_err(|_| Error::Parse(format!("{}: invalid value {:?}", name, v))))
        .collect::<Result<Vec<_>>>()?;
    if values.len() != expected {
        return Err(Error::Parse(format!(
            "{}: expected {} values, found {}",
            name,
            expected,
            values.len()
        )));
    }
    Ok(values)
}

/// 3×4 row-major values plus a `[0, 0, 0, 1]` bottom row.
fn pad_3x4(v: &[f32]) -> na::Matrix4<f32> {
    #[rustfmt::skip]
    let m = na::Matrix4::new(
        v[0], v[1], v[2], v[3],
        v[4], v[5], v[6], v[7],
        v[8], v[9], v[10], v[11],
        0.0, 0.0, 0.0, 1.0,
    );
    m
}

/// 3×3 row-major values, zero right column, `[0, 0, 0, 1]` bottom row.
fn pad_3x3(values: &[f32]) -> na::Matrix4<f32> {
    na::Matrix3::from_row_slice(values).to_homogeneous()
}

/// Apply a homogeneous transform and keep the first three rows.
pub fn transform(matrix: &na::Matrix4<f32>, points: &[na::Point3<f32>]) -> Vec<na::Point3<f32>> {
    points.iter().map(|p| transform_point(matrix, p)).collect()
}

#[inline]
pub(crate) fn transform_point(matrix: &na::Matrix4<f32>, point: &na::Point3<f32>) -> na::Point3<f32> {
    let h = matrix * point.to_homogeneous();
    na::Point3::new(h.x, h.y, h.z)
}

/// Perspective projection; fails on the first point with non-positive depth.
pub fn project(projection: &na::Matrix4<f32>, points: &[na::Point3<f32>]) -> Result<Vec<na::Point2<f32>>> {
    points
        .iter()
        .enumerate()
        .map(|(index, p)| {
            let q = transform_point(projection, p);
            if q.z > 0.0 {
                Ok(na::Point2::new(q.x / q.z, q.y / q.z))
            } else {
                Err(Error::DegenerateProjection { index, depth: q.z })
            }
        })
        .collect()
}

/// Perspective projection that drops points at or behind the camera,
/// keeping the index of every projected point.
pub fn project_in_front(projection: &na::Matrix4<f32>, points: &[na::Point3<f32>]) -> Vec<(usize, na::Point2<f32>)> {
    points
        .iter()
        .enumerate()
        .filter_map(|(index, p)| {
            let q = transform_point(projection, p);
            (q.z > 0.0).then(|| (index, na::Point2::new(q.x / q.z, q.y / q.z)))
        })
        .collect()
}
