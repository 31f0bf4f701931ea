//! # Targets
//!
//! Dense training targets and their inverse. A target tensor is
//! `(rows, cols, channels)` with the objectness in channel 0 and normalized
//! regression values in the remaining channels. Encoding paints every cell
//! of a box's footprint; decoding turns every cell above a confidence
//! threshold back into one scored box.

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod bev;
pub mod image_plane;
pub mod stats;

pub use bev::{BevGrid, BevTargetEncoder, BEV_CHANNELS};
pub use image_plane::{ImageGrid, ImageTargetEncoder, IMAGE_CHANNELS};
pub use stats::{Normalization, RegressionStats, StatsSource};

pub type TargetTensor = Array3<f32>;

/// Which cells a box marks positive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Footprint {
    /// Only the cell holding the box centre.
    Center,
    /// The centre cell plus every cell whose centre lies in an ellipse
    /// aligned with the box, semi-axes `scale` times the half extents.
    Ellipse { scale: f32 },
}

impl Default for Footprint {
    fn default() -> Self {
        Footprint::Ellipse { scale: 0.5 }
    }
}

impl Footprint {
    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            Footprint::Center => Ok(()),
            Footprint::Ellipse { scale } if scale > 0.0 && scale <= 1.0 => Ok(()),
            Footprint::Ellipse { scale } => Err(Error::config(format!("ellipse scale {} is not in (0, 1]", scale))),
        }
    }
}

/// Who owns a cell covered by several footprints.
///
/// Boxes are painted in input order, so with `LastWriteWins` the later box
/// overwrites the earlier one. That is a known source of label noise and is
/// kept deliberately; there is no score-based policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    LastWriteWins,
    FirstWriteWins,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        OverlapPolicy::LastWriteWins
    }
}

/// Encodes boxes into a target tensor and decodes a predicted tensor.
pub trait TargetEncoder {
    type Box;

    /// `(rows, cols, channels)`.
    fn shape(&self) -> (usize, usize, usize);

    fn encode(&self, boxes: &[Self::Box]) -> TargetTensor;

    /// One scored box per cell whose objectness is strictly above
    /// `threshold`, in row-major cell order. Cells with a NaN objectness or
    /// regression values that do not reconstruct a finite box are skipped;
    /// a NaN threshold is rejected.
    fn decode(&self, tensor: &TargetTensor, threshold: f32) -> Result<Vec<Self::Box>>;
}

/// Write objectness and regression values into one cell, honouring the
/// overlap policy. Returns whether the cell was written.
pub(crate) fn paint_cell<const N: usize>(
    tensor: &mut TargetTensor,
    (row, col): (usize, usize),
    values: &[f32; N],
    policy: OverlapPolicy,
) -> bool {
    if policy == OverlapPolicy::FirstWriteWins && tensor[[row, col, 0]] > 0.0 {
        return false;
    }
    tensor[[row, col, 0]] = 1.0;
    for (k, v) in values.iter().enumerate() {
        tensor[[row, col, k + 1]] = *v;
    }
    true
}

pub(crate) fn check_threshold(threshold: f32) -> Result<()> {
    if threshold.is_nan() {
        return Err(Error::InvalidThreshold(threshold));
    }
    Ok(())
}

pub(crate) fn check_shape(tensor: &TargetTensor, expected: (usize, usize, usize)) -> Result<()> {
    if tensor.dim() != expected {
        return Err(Error::config(format!(
            "target tensor has shape {:?}, expected {:?}",
            tensor.dim(),
            expected
        )));
    }
    Ok(())
}

/// Regression values of one cell, read from channels `1..=N`.
pub(crate) fn read_cell<const N: usize>(tensor: &TargetTensor, (row, col): (usize, usize)) -> [f32; N] {
    let mut values = [0f32; N];
    for (k, v) in values.iter_mut().enumerate() {
        *v = tensor[[row, col, k + 1]];
    }
    values
}
