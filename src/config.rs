//! # Configuration
//!
//! The immutable settings every component is built from. A `PipelineConfig`
//! is deserialized once (JSON), validated, and then passed by reference to
//! the constructors that need it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::data::{ClassMap, ObjectType};
use crate::error::{Error, Result};
use crate::loader::LoaderConfig;
use crate::nms::NmsConfig;
use crate::point_cloud::Accumulation;
use crate::target::{Footprint, OverlapPolicy, StatsSource};

/// Physical region of interest in rectified camera coordinates (metres),
/// each axis a closed interval `(min, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Lateral, spans the rows of the BEV grids.
    pub x: (f32, f32),
    /// Vertical (pointing down), spans the depth bins of the input volume.
    pub y: (f32, f32),
    /// Forward, spans the columns of the BEV grids.
    pub z: (f32, f32),
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            x: (-40.0, 40.0),
            y: (-1.0, 2.5),
            z: (0.0, 70.0),
        }
    }
}

impl Workspace {
    pub fn contains(&self, p: &na::Point3<f32>) -> bool {
        let inside = |v: f32, (lo, hi): (f32, f32)| lo <= v && v <= hi;
        inside(p.x, self.x) && inside(p.y, self.y) && inside(p.z, self.z)
    }

    /// Forward extent.
    pub fn phy_width(&self) -> f32 {
        self.z.1 - self.z.0
    }

    /// Lateral extent.
    pub fn phy_height(&self) -> f32 {
        self.x.1 - self.x.0
    }

    /// Vertical extent.
    pub fn phy_depth(&self) -> f32 {
        self.y.1 - self.y.0
    }

    fn validate(&self) -> Result<()> {
        for (name, (lo, hi)) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                return Err(Error::config(format!("workspace {} range ({}, {}) is empty", name, lo, hi)));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub footprint: Footprint,
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Height given to every BEV-decoded box.
    #[serde(default = "default_mean_height")]
    pub mean_height: f32,
    /// Camera-frame `y` given to every BEV-decoded box.
    #[serde(default = "default_mean_altitude")]
    pub mean_altitude: f32,
    pub stats: StatsSource,
}

fn default_mean_height() -> f32 {
    1.52
}

fn default_mean_altitude() -> f32 {
    1.71
}

/// Image-plane targets for 2D boxes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageTargetConfig {
    pub downsampling_factor: usize,
    #[serde(default)]
    pub footprint: Footprint,
    #[serde(default)]
    pub overlap: OverlapPolicy,
    pub stats: StatsSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Fail a frame on its first malformed label record.
    pub strict: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self { strict: true }
    }
}

fn default_image_size() -> (u32, u32) {
    (1242, 375)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub workspace: Workspace,
    /// `(rows, cols, depth_bins)` of the voxelized input.
    pub input_shape: (usize, usize, usize),
    /// `(rows, cols)` of the BEV target.
    pub target_shape: (usize, usize),
    pub downsampling_factor: usize,
    /// Voxel accumulation; has no default on purpose.
    pub point_encoding: Accumulation,
    pub target: TargetConfig,
    #[serde(default)]
    pub image_target: Option<ImageTargetConfig>,
    /// Group name → KITTI types trained as that group.
    pub classes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub labels: LabelConfig,
    /// `(width, height)` every image and 2D label is brought to.
    #[serde(default = "default_image_size")]
    pub image_size: (u32, u32),
    #[serde(default)]
    pub nms: NmsConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl PipelineConfig {
    /// Read and validate a JSON configuration. Relative statistics paths are
    /// resolved against the configuration file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: PipelineConfig = serde_json::from_str(&contents).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.target.stats.rebase(&base);
        if let Some(image_target) = config.image_target.as_mut() {
            image_target.stats.rebase(&base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(contents).map_err(|source| Error::Json {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.workspace.validate()?;
        let (rows, cols, depth) = self.input_shape;
        if rows == 0 || cols == 0 || depth == 0 {
            return Err(Error::config(format!("input shape {:?} has an empty axis", self.input_shape)));
        }
        let f = self.downsampling_factor;
        if f == 0 || rows % f != 0 || cols % f != 0 {
            return Err(Error::config(format!(
                "input shape {:?} is not divisible by the downsampling factor {}",
                self.input_shape, f
            )));
        }
        if self.target_shape != (rows / f, cols / f) {
            return Err(Error::config(format!(
                "target shape {:?} does not match input shape {:?} downsampled by {}",
                self.target_shape, self.input_shape, f
            )));
        }
        self.target.footprint.validate()?;
        if !(self.target.mean_height.is_finite() && self.target.mean_height > 0.0) {
            return Err(Error::config(format!("mean height {} must be positive", self.target.mean_height)));
        }
        if let Some(image_target) = &self.image_target {
            if image_target.downsampling_factor == 0 {
                return Err(Error::config("image downsampling factor must be positive"));
            }
            image_target.footprint.validate()?;
        }
        if self.image_size.0 == 0 || self.image_size.1 == 0 {
            return Err(Error::config(format!("image size {:?} has an empty axis", self.image_size)));
        }
        if self.class_map()?.is_empty() {
            return Err(Error::config("no object classes configured"));
        }
        self.nms.validate()?;
        self.loader.validate()?;
        Ok(())
    }

    pub fn class_map(&self) -> Result<ClassMap> {
        ClassMap::from_named_groups(
            self.classes
                .iter()
                .map(|(group, members)| (group.as_str(), members.iter().map(String::as_str))),
        )
    }

    /// Group decoded boxes are labelled with: the first configured one.
    pub fn primary_group(&self) -> Result<ObjectType> {
        let name = self
            .classes
            .keys()
            .next()
            .ok_or_else(|| Error::config("no object classes configured"))?;
        name.parse::<ObjectType>()
            .map_err(|_| Error::config(format!("unknown object group {:?}", name)))
    }

    pub fn image_target(&self) -> Result<&ImageTargetConfig> {
        self.image_target
            .as_ref()
            .ok_or_else(|| Error::config("no image_target section configured"))
    }

    /// Physical size of one input voxel along `(x, y, z)`.
    pub fn voxel_size(&self) -> (f32, f32, f32) {
        let (rows, cols, depth) = self.input_shape;
        (
            self.workspace.phy_height() / rows as f32,
            self.workspace.phy_depth() / depth as f32,
            self.workspace.phy_width() / cols as f32,
        )
    }

    /// Physical size of one target cell along `(x, z)`.
    pub fn target_cell_size(&self) -> (f32, f32) {
        let (vx, _, vz) = self.voxel_size();
        let f = self.downsampling_factor as f32;
        (vx * f, vz * f)
    }
}
