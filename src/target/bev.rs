//! Bird's-eye-view targets for 3D boxes.
//!
//! Rows of the grid follow the camera x axis, columns follow z, and every
//! cell covers `downsampling_factor` input voxels along each of them.
//! Channels: `[obj, sin(yaw), cos(yaw), dx, dz, ln(w), ln(l)]`, where
//! `dx, dz` are the offsets of the box centre from the cell centre.

use log::debug;
use ndarray::Axis;

use super::{check_shape, check_threshold, paint_cell, read_cell, Footprint, Normalization, OverlapPolicy};
use super::RegressionStats;
use super::{TargetEncoder, TargetTensor};
use crate::config::{PipelineConfig, Workspace};
use crate::data::{Box3D, ObjectType};
use crate::error::Result;

/// Statistics keys of the BEV regression channels, in channel order.
pub const BEV_CHANNELS: [&str; 6] = ["sin_yaw", "cos_yaw", "dx", "dz", "log_w", "log_l"];

/// Geometry of the BEV target grid, independent of any normalization.
#[derive(Clone, Debug)]
pub struct BevGrid {
    workspace: Workspace,
    rows: usize,
    cols: usize,
    cell_x: f32,
    cell_z: f32,
    footprint: Footprint,
}

impl BevGrid {
    pub fn new(config: &PipelineConfig) -> Self {
        let (rows, cols) = config.target_shape;
        let (cell_x, cell_z) = config.target_cell_size();
        Self {
            workspace: config.workspace,
            rows,
            cols,
            cell_x,
            cell_z,
            footprint: config.target.footprint,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Physical `(x, z)` of a cell centre.
    pub fn cell_center(&self, (row, col): (usize, usize)) -> (f32, f32) {
        (
            self.workspace.x.0 + (row as f32 + 0.5) * self.cell_x,
            self.workspace.z.0 + (col as f32 + 0.5) * self.cell_z,
        )
    }

    /// Cell holding the physical point `(x, z)`; the upper workspace bounds
    /// belong to the last row/column.
    pub fn cell_of(&self, x: f32, z: f32) -> Option<(usize, usize)> {
        let inside = |v: f32, (lo, hi): (f32, f32)| lo <= v && v <= hi;
        if !(inside(x, self.workspace.x) && inside(z, self.workspace.z)) {
            return None;
        }
        Some((
            (((x - self.workspace.x.0) / self.cell_x) as usize).min(self.rows - 1),
            (((z - self.workspace.z.0) / self.cell_z) as usize).min(self.cols - 1),
        ))
    }

    /// Cells marked positive for `bbox`, centre cell first.
    pub fn footprint_cells(&self, bbox: &Box3D) -> Vec<(usize, usize)> {
        let center = self.cell_of(bbox.x, bbox.z);
        let mut cells: Vec<_> = center.into_iter().collect();
        let scale = match self.footprint {
            Footprint::Center => return cells,
            Footprint::Ellipse { scale } => scale,
        };
        let (semi_l, semi_w) = (scale * bbox.l / 2.0, scale * bbox.w / 2.0);
        let reach = semi_l.max(semi_w);
        let rows = span(bbox.x - reach, bbox.x + reach, self.workspace.x.0, self.cell_x, self.rows);
        let cols = span(bbox.z - reach, bbox.z + reach, self.workspace.z.0, self.cell_z, self.cols);
        let ((r0, r1), (c0, c1)) = match (rows, cols) {
            (Some(rows), Some(cols)) => (rows, cols),
            _ => return cells,
        };
        for row in r0..=r1 {
            for col in c0..=c1 {
                if Some((row, col)) == center {
                    continue;
                }
                let (xc, zc) = self.cell_center((row, col));
                let (u, v) = bbox.to_object_frame(xc - bbox.x, zc - bbox.z);
                if (u / semi_l).powi(2) + (v / semi_w).powi(2) <= 1.0 {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    /// Unnormalized regression values of `bbox` seen from `cell`.
    pub fn raw_regression(&self, bbox: &Box3D, cell: (usize, usize)) -> [f32; 6] {
        let (xc, zc) = self.cell_center(cell);
        let (sin, cos) = bbox.rot_y.sin_cos();
        [sin, cos, bbox.x - xc, bbox.z - zc, bbox.w.ln(), bbox.l.ln()]
    }

    /// Raw regression values over every footprint cell of every box, the
    /// population the normalization statistics are computed from.
    pub fn regression_samples(&self, boxes: &[Box3D]) -> Vec<[f32; 6]> {
        boxes
            .iter()
            .flat_map(|b| self.footprint_cells(b).into_iter().map(move |cell| self.raw_regression(b, cell)))
            .collect()
    }

    pub fn compute_stats(&self, boxes: &[Box3D]) -> RegressionStats {
        RegressionStats::from_samples(&BEV_CHANNELS, &self.regression_samples(boxes))
    }
}

/// Inclusive index range of cells touched by the physical interval
/// `[lo, hi]`, clipped to `n` cells; `None` when it misses the grid.
pub(crate) fn span(lo: f32, hi: f32, origin: f32, cell: f32, n: usize) -> Option<(usize, usize)> {
    let first = ((lo - origin) / cell).floor();
    let last = ((hi - origin) / cell).floor();
    if !(first.is_finite() && last.is_finite()) || last < 0.0 || first > (n - 1) as f32 {
        return None;
    }
    Some((first.max(0.0) as usize, (last as usize).min(n - 1)))
}

#[derive(Clone, Debug)]
pub struct BevTargetEncoder {
    grid: BevGrid,
    normalization: Normalization<6>,
    overlap: OverlapPolicy,
    mean_height: f32,
    mean_altitude: f32,
    cls: ObjectType,
}

impl BevTargetEncoder {
    /// Build from configuration, reading the statistics once.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_stats(config, &config.target.stats.load()?)
    }

    pub fn with_stats(config: &PipelineConfig, stats: &RegressionStats) -> Result<Self> {
        Ok(Self {
            grid: BevGrid::new(config),
            normalization: stats.normalization(&BEV_CHANNELS)?,
            overlap: config.target.overlap,
            mean_height: config.target.mean_height,
            mean_altitude: config.target.mean_altitude,
            cls: config.primary_group()?,
        })
    }

    pub fn grid(&self) -> &BevGrid {
        &self.grid
    }
}

impl TargetEncoder for BevTargetEncoder {
    type Box = Box3D;

    fn shape(&self) -> (usize, usize, usize) {
        let (rows, cols) = self.grid.shape();
        (rows, cols, BEV_CHANNELS.len() + 1)
    }

    fn encode(&self, boxes: &[Box3D]) -> TargetTensor {
        let mut target = TargetTensor::zeros(self.shape());
        let mut painted = 0usize;
        for bbox in boxes {
            let cells = self.grid.footprint_cells(bbox);
            if cells.is_empty() {
                debug!("box outside the BEV grid: {}", bbox);
            }
            for cell in cells {
                let values = self.normalization.normalize(self.grid.raw_regression(bbox, cell));
                if paint_cell(&mut target, cell, &values, self.overlap) {
                    painted += 1;
                }
            }
        }
        debug!("encoded {} boxes into {} cell writes", boxes.len(), painted);
        target
    }

    fn decode(&self, tensor: &TargetTensor, threshold: f32) -> Result<Vec<Box3D>> {
        check_shape(tensor, self.shape())?;
        check_threshold(threshold)?;
        let mut boxes = Vec::new();
        let mut degenerate = 0usize;
        for ((row, col), &score) in tensor.index_axis(Axis(2), 0).indexed_iter() {
            // NaN scores fail this too.
            if !(score > threshold) {
                continue;
            }
            let [sin, cos, dx, dz, log_w, log_l] = self.normalization.denormalize(read_cell(tensor, (row, col)));
            let (xc, zc) = self.grid.cell_center((row, col));
            let bbox = Box3D {
                h: self.mean_height,
                w: log_w.exp(),
                l: log_l.exp(),
                x: xc + dx,
                y: self.mean_altitude,
                z: zc + dz,
                rot_y: sin.atan2(cos),
                cls: self.cls,
                score: Some(score),
            };
            if !(bbox.is_finite() && bbox.w > 0.0 && bbox.l > 0.0) {
                degenerate += 1;
                continue;
            }
            boxes.push(bbox);
        }
        if degenerate > 0 {
            debug!("skipped {} cells decoding to non-finite or empty boxes", degenerate);
        }
        debug!("decoded {} candidates above {}", boxes.len(), threshold);
        Ok(boxes)
    }
}
