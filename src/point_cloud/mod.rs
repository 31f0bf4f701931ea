//! # Point clouds
//!
//! LiDAR points with their paired reflectance, the region/FOV filters and
//! the voxel encoder producing the network input volume.

use nalgebra as na;

use crate::calibration::transform;
use crate::error::{Error, Result};

pub mod encoder;
pub mod filter;

pub use encoder::{Accumulation, PointCloudEncoder, VolumeTensor};
pub use filter::{filter_by_fov, filter_by_region};

/// Points and per-point reflectance, always of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<na::Point3<f32>>,
    reflectance: Vec<f32>,
}

impl PointCloud {
    pub fn new(points: Vec<na::Point3<f32>>, reflectance: Vec<f32>) -> Result<Self> {
        if points.len() != reflectance.len() {
            return Err(Error::Parse(format!(
                "{} points but {} reflectance values",
                points.len(),
                reflectance.len()
            )));
        }
        Ok(Self { points, reflectance })
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            reflectance: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: na::Point3<f32>, reflectance: f32) {
        self.points.push(point);
        self.reflectance.push(reflectance);
    }

    pub fn points(&self) -> &[na::Point3<f32>] {
        &self.points
    }

    pub fn reflectance(&self) -> &[f32] {
        &self.reflectance
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&na::Point3<f32>, f32)> + '_ {
        self.points.iter().zip(self.reflectance.iter().copied())
    }

    /// Move every point through a homogeneous transform; reflectance is kept.
    pub fn transformed(&self, matrix: &na::Matrix4<f32>) -> Self {
        Self {
            points: transform(matrix, &self.points),
            reflectance: self.reflectance.clone(),
        }
    }

    /// Keep the entries whose mask value is set, in their original order.
    pub(crate) fn select(&self, mask: &[bool]) -> Self {
        let mut kept = Self::with_capacity(mask.iter().filter(|&&m| m).count());
        for ((p, r), &keep) in self.iter().zip(mask) {
            if keep {
                kept.push(*p, r);
            }
        }
        kept
    }
}
