//! Image-plane targets for 2D boxes.
//!
//! The grid covers the configured image size downsampled by an integer
//! factor. Channels: `[obj, dx, dy, ln(w), ln(h)]` in pixels, offsets taken
//! from the cell centre to the box centre.

use log::debug;
use ndarray::Axis;

use super::bev::span;
use super::{check_shape, check_threshold, paint_cell, read_cell, Footprint, Normalization, OverlapPolicy};
use super::RegressionStats;
use super::{TargetEncoder, TargetTensor};
use crate::config::{ImageTargetConfig, PipelineConfig};
use crate::data::{Box2D, ObjectType};
use crate::error::Result;

/// Statistics keys of the image regression channels, in channel order.
pub const IMAGE_CHANNELS: [&str; 4] = ["dx", "dy", "log_w", "log_h"];

#[derive(Clone, Debug)]
pub struct ImageGrid {
    rows: usize,
    cols: usize,
    cell: f32,
    footprint: Footprint,
}

impl ImageGrid {
    pub fn new(image_size: (u32, u32), downsampling_factor: usize, footprint: Footprint) -> Self {
        let f = downsampling_factor.max(1);
        Self {
            rows: (image_size.1 as usize + f - 1) / f,
            cols: (image_size.0 as usize + f - 1) / f,
            cell: f as f32,
            footprint,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Pixel `(x, y)` of a cell centre.
    pub fn cell_center(&self, (row, col): (usize, usize)) -> (f32, f32) {
        ((col as f32 + 0.5) * self.cell, (row as f32 + 0.5) * self.cell)
    }

    pub fn cell_of(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        Some((span(y, y, 0.0, self.cell, self.rows)?.0, span(x, x, 0.0, self.cell, self.cols)?.0))
    }

    /// Cells marked positive for `bbox`, centre cell first. Boxes without
    /// area have no footprint.
    pub fn footprint_cells(&self, bbox: &Box2D) -> Vec<(usize, usize)> {
        if !(bbox.w() > 0.0 && bbox.h() > 0.0) {
            return Vec::new();
        }
        let (cx, cy) = (bbox.cx(), bbox.cy());
        let center = self.cell_of(cx, cy);
        let mut cells: Vec<_> = center.into_iter().collect();
        let scale = match self.footprint {
            Footprint::Center => return cells,
            Footprint::Ellipse { scale } => scale,
        };
        let (semi_w, semi_h) = (scale * bbox.w() / 2.0, scale * bbox.h() / 2.0);
        let rows = span(cy - semi_h, cy + semi_h, 0.0, self.cell, self.rows);
        let cols = span(cx - semi_w, cx + semi_w, 0.0, self.cell, self.cols);
        let ((r0, r1), (c0, c1)) = match (rows, cols) {
            (Some(rows), Some(cols)) => (rows, cols),
            _ => return cells,
        };
        for row in r0..=r1 {
            for col in c0..=c1 {
                if Some((row, col)) == center {
                    continue;
                }
                let (xc, yc) = self.cell_center((row, col));
                if ((xc - cx) / semi_w).powi(2) + ((yc - cy) / semi_h).powi(2) <= 1.0 {
                    cells.push((row, col));
                }
            }
        }
        cells
    }

    pub fn raw_regression(&self, bbox: &Box2D, cell: (usize, usize)) -> [f32; 4] {
        let (xc, yc) = self.cell_center(cell);
        [bbox.cx() - xc, bbox.cy() - yc, bbox.w().ln(), bbox.h().ln()]
    }

    pub fn regression_samples(&self, boxes: &[Box2D]) -> Vec<[f32; 4]> {
        boxes
            .iter()
            .flat_map(|b| self.footprint_cells(b).into_iter().map(move |cell| self.raw_regression(b, cell)))
            .collect()
    }

    pub fn compute_stats(&self, boxes: &[Box2D]) -> RegressionStats {
        RegressionStats::from_samples(&IMAGE_CHANNELS, &self.regression_samples(boxes))
    }
}

#[derive(Clone, Debug)]
pub struct ImageTargetEncoder {
    grid: ImageGrid,
    normalization: Normalization<4>,
    overlap: OverlapPolicy,
    cls: ObjectType,
}

impl ImageTargetEncoder {
    /// Build from the `image_target` section; its absence is a configuration error.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let section = config.image_target()?;
        Self::build(config, section, &section.stats.load()?)
    }

    pub fn with_stats(config: &PipelineConfig, stats: &RegressionStats) -> Result<Self> {
        Self::build(config, config.image_target()?, stats)
    }

    fn build(config: &PipelineConfig, section: &ImageTargetConfig, stats: &RegressionStats) -> Result<Self> {
        Ok(Self {
            grid: ImageGrid::new(config.image_size, section.downsampling_factor, section.footprint),
            normalization: stats.normalization(&IMAGE_CHANNELS)?,
            overlap: section.overlap,
            cls: config.primary_group()?,
        })
    }

    pub fn grid(&self) -> &ImageGrid {
        &self.grid
    }
}

impl TargetEncoder for ImageTargetEncoder {
    type Box = Box2D;

    fn shape(&self) -> (usize, usize, usize) {
        let (rows, cols) = self.grid.shape();
        (rows, cols, IMAGE_CHANNELS.len() + 1)
    }

    fn encode(&self, boxes: &[Box2D]) -> TargetTensor {
        let mut target = TargetTensor::zeros(self.shape());
        for bbox in boxes {
            for cell in self.grid.footprint_cells(bbox) {
                let values = self.normalization.normalize(self.grid.raw_regression(bbox, cell));
                paint_cell(&mut target, cell, &values, self.overlap);
            }
        }
        target
    }

    fn decode(&self, tensor: &TargetTensor, threshold: f32) -> Result<Vec<Box2D>> {
        check_shape(tensor, self.shape())?;
        check_threshold(threshold)?;
        let mut boxes = Vec::new();
        for ((row, col), &score) in tensor.index_axis(Axis(2), 0).indexed_iter() {
            if !(score > threshold) {
                continue;
            }
            let [dx, dy, log_w, log_h] = self.normalization.denormalize(read_cell(tensor, (row, col)));
            let (xc, yc) = self.grid.cell_center((row, col));
            let (cx, cy, w, h) = (xc + dx, yc + dy, log_w.exp(), log_h.exp());
            if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
                continue;
            }
            boxes.push(Box2D::from_center_size(cx, cy, w, h, self.cls).with_score(score));
        }
        debug!("decoded {} image-plane candidates above {}", boxes.len(), threshold);
        Ok(boxes)
    }
}
