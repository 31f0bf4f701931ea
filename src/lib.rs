//! Data preparation and post-processing for single-shot 3D detection on
//! KITTI.
//!
//! A frame's LiDAR sweep is moved into the rectified camera frame, cropped
//! to a workspace and voxelized into a dense input volume; its annotations
//! become a dense bird's-eye-view target. Predicted targets are decoded
//! back into scored boxes, suppressed with NMS and written out as KITTI
//! result records.

pub mod calibration;
pub mod config;
pub mod data;
pub mod error;
pub mod iou;
pub mod loader;
pub mod nms;
pub mod point_cloud;
pub mod target;

pub use calibration::CalibrationSet;
pub use config::{PipelineConfig, Workspace};
pub use data::{Box2D, Box3D, ClassMap, ObjectType};
pub use error::{Error, Result};
pub use loader::{KittiDataset, Prefetcher, Sample, SamplePipeline};
pub use nms::{nms, NmsConfig};
pub use point_cloud::{PointCloud, PointCloudEncoder};
pub use target::{BevTargetEncoder, ImageTargetEncoder, TargetEncoder};
