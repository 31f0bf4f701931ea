use log::debug;
use nalgebra as na;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::PointCloud;
use crate::config::{PipelineConfig, Workspace};

/// Dense `(rows, cols, depth_bins)` input volume: rows follow x, cols follow
/// z, depth bins follow y.
pub type VolumeTensor = Array3<f32>;

/// What a voxel stores about the points falling into it. Every mode is
/// independent of point order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accumulation {
    /// 1.0 when at least one point falls in the voxel.
    Occupancy,
    /// `min(1, ln(n + 1) / ln(64))` for `n` points.
    Density,
    /// Largest reflectance among the voxel's points.
    MaxReflectance,
}

const DENSITY_SATURATION: f32 = 64.0;

#[derive(Clone, Debug)]
pub struct PointCloudEncoder {
    workspace: Workspace,
    shape: (usize, usize, usize),
    accumulation: Accumulation,
}

impl PointCloudEncoder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            workspace: config.workspace,
            shape: config.input_shape,
            accumulation: config.point_encoding,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn accumulation(&self) -> Accumulation {
        self.accumulation
    }

    /// Voxel holding `p`, or `None` outside the workspace. The upper bound of
    /// each axis belongs to the last voxel.
    pub fn voxel_index(&self, p: &na::Point3<f32>) -> Option<(usize, usize, usize)> {
        if !self.workspace.contains(p) {
            return None;
        }
        let bin = |v: f32, (lo, hi): (f32, f32), n: usize| (((v - lo) / (hi - lo) * n as f32) as usize).min(n - 1);
        let (rows, cols, depth) = self.shape;
        Some((
            bin(p.x, self.workspace.x, rows),
            bin(p.z, self.workspace.z, cols),
            bin(p.y, self.workspace.y, depth),
        ))
    }

    pub fn encode(&self, cloud: &PointCloud) -> VolumeTensor {
        let mut volume = VolumeTensor::zeros(self.shape);
        let mut dropped = 0usize;
        for (p, reflectance) in cloud.iter() {
            let idx = match self.voxel_index(p) {
                Some(idx) => idx,
                None => {
                    dropped += 1;
                    continue;
                }
            };
            let cell = &mut volume[idx];
            match self.accumulation {
                Accumulation::Occupancy => *cell = 1.0,
                Accumulation::Density => *cell += 1.0,
                Accumulation::MaxReflectance => *cell = cell.max(reflectance),
            }
        }
        if self.accumulation == Accumulation::Density {
            let norm = DENSITY_SATURATION.ln();
            volume.mapv_inplace(|n| ((n + 1.0).ln() / norm).min(1.0));
        }
        if dropped > 0 {
            debug!("point cloud encoder dropped {} of {} points outside the workspace", dropped, cloud.len());
        }
        volume
    }
}
