//! # Dataset access
//!
//! Reads frames from a KITTI training directory and prefetches encoded
//! samples on worker threads.
//!
//! ```text
//! <root>/image_2/<id>.png
//! <root>/label_2/<id>.txt
//! <root>/velodyne/<id>.bin
//! <root>/calib/<id>.txt
//! <root>/subsets/<subset>.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver};
use image::imageops::FilterType;
use log::{debug, error, warn};
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::calibration::{parse_calibration, CalibrationSet};
use crate::config::{PipelineConfig, Workspace};
use crate::data::input::{parse_labels, parse_velodyne, LabelOptions, Labels};
use crate::data::{Box3D, ClassMap};
use crate::error::{Error, Result};
use crate::point_cloud::{filter_by_fov, filter_by_region, PointCloud, PointCloudEncoder, VolumeTensor};
use crate::target::{BevTargetEncoder, TargetEncoder, TargetTensor};

pub const SUBSETS: [&str; 4] = ["train", "val", "micro", "trainval"];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub num_workers: usize,
    /// Encoded samples buffered ahead of the consumer.
    pub queue_capacity: usize,
    /// Drop points that do not project into the camera image.
    pub use_fov_filter: bool,
    /// Camera image `(width, height)` the FOV filter falls back to when a
    /// frame's own image cannot be read.
    pub fov_image_size: (u32, u32),
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_capacity: 2,
            use_fov_filter: true,
            fov_image_size: (1242, 375),
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 || self.queue_capacity == 0 {
            return Err(Error::config(format!(
                "loader needs at least one worker and one queue slot, got {} and {}",
                self.num_workers, self.queue_capacity
            )));
        }
        if self.fov_image_size.0 == 0 || self.fov_image_size.1 == 0 {
            return Err(Error::config(format!("FOV image size {:?} has an empty axis", self.fov_image_size)));
        }
        Ok(())
    }
}

/// File-level access to one KITTI split directory.
#[derive(Clone, Debug)]
pub struct KittiDataset {
    root: PathBuf,
    class_map: ClassMap,
    workspace: Workspace,
    image_size: (u32, u32),
    strict_labels: bool,
    use_fov_filter: bool,
    fov_image_size: (u32, u32),
}

impl KittiDataset {
    pub fn new(root: impl Into<PathBuf>, config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            class_map: config.class_map()?,
            workspace: config.workspace,
            image_size: config.image_size,
            strict_labels: config.labels.strict,
            use_fov_filter: config.loader.use_fov_filter,
            fov_image_size: config.loader.fov_image_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn frame_path(&self, dir: &str, id: &str, ext: &str) -> PathBuf {
        self.root.join(dir).join(format!("{}.{}", id, ext))
    }

    /// Frame ids listed for `subset`, one per line.
    pub fn ids(&self, subset: &str) -> Result<Vec<String>> {
        if !SUBSETS.contains(&subset) {
            return Err(Error::config(format!("unknown subset {:?}, expected one of {:?}", subset, SUBSETS)));
        }
        let path = self.root.join("subsets").join(format!("{}.txt", subset));
        let contents = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    pub fn calibration(&self, id: &str) -> Result<CalibrationSet> {
        let path = self.frame_path("calib", id, "txt");
        parse_calibration(&fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?)
    }

    fn read_labels(&self, id: &str, options: &LabelOptions) -> Result<Labels> {
        let path = self.frame_path("label_2", id, "txt");
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        parse_labels(&text, &self.class_map, options)
    }

    /// 3D boxes only; does not touch the image.
    pub fn boxes_3d(&self, id: &str) -> Result<Vec<Box3D>> {
        Ok(self.read_labels(id, &LabelOptions::new(self.strict_labels))?.boxes_3d)
    }

    /// All boxes, 2D corners rescaled from the frame's real image size to
    /// the configured one.
    pub fn boxes(&self, id: &str) -> Result<Labels> {
        let image_path = self.frame_path("image_2", id, "png");
        let reference = image::image_dimensions(&image_path).map_err(|source| Error::Image {
            path: image_path.clone(),
            source,
        })?;
        self.read_labels(id, &LabelOptions::rescaling(reference, self.image_size, self.strict_labels))
    }

    /// Points in rectified camera coordinates, restricted to the workspace
    /// and, when configured, to the camera's field of view.
    pub fn point_cloud(&self, id: &str, calib: &CalibrationSet) -> Result<PointCloud> {
        let path = self.frame_path("velodyne", id, "bin");
        let raw = parse_velodyne(&fs::read(&path).map_err(|e| Error::io(&path, e))?)?;
        let rect = raw.transformed(&calib.velo_to_rect());
        let mut cloud = filter_by_region(&rect, &self.workspace);
        if self.use_fov_filter {
            cloud = filter_by_fov(&cloud, &calib.p2, self.camera_size(id));
        }
        debug!("frame {}: kept {} of {} points", id, cloud.len(), raw.len());
        Ok(cloud)
    }

    /// Native size of the frame's camera image; P2 projects into this one,
    /// not into the configured image size.
    fn camera_size(&self, id: &str) -> (u32, u32) {
        let path = self.frame_path("image_2", id, "png");
        image::image_dimensions(&path).unwrap_or_else(|e| {
            debug!("frame {}: no image size ({}), using {:?}", id, e, self.fov_image_size);
            self.fov_image_size
        })
    }

    /// RGB image resized to the configured size, `(height, width, 3)` in `[0, 1]`.
    pub fn image(&self, id: &str) -> Result<Array3<f32>> {
        let path = self.frame_path("image_2", id, "png");
        let img = image::open(&path).map_err(|source| Error::Image {
            path: path.clone(),
            source,
        })?;
        let (w, h) = self.image_size;
        let rgb = img.resize_exact(w, h, FilterType::Triangle).to_rgb8();
        Ok(Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
            rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        }))
    }
}

/// One encoded training pair.
#[derive(Clone, Debug)]
pub struct Sample {
    pub id: String,
    pub input: VolumeTensor,
    pub target: TargetTensor,
    pub boxes: Vec<Box3D>,
}

/// Reads a frame and turns it into a network input and a BEV target.
#[derive(Clone, Debug)]
pub struct SamplePipeline {
    dataset: KittiDataset,
    input_encoder: PointCloudEncoder,
    target_encoder: BevTargetEncoder,
}

impl SamplePipeline {
    pub fn new(root: impl Into<PathBuf>, config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            dataset: KittiDataset::new(root, config)?,
            input_encoder: PointCloudEncoder::new(config),
            target_encoder: BevTargetEncoder::new(config)?,
        })
    }

    pub fn dataset(&self) -> &KittiDataset {
        &self.dataset
    }

    pub fn target_encoder(&self) -> &BevTargetEncoder {
        &self.target_encoder
    }

    pub fn load(&self, id: &str) -> Result<Sample> {
        let calib = self.dataset.calibration(id)?;
        let cloud = self.dataset.point_cloud(id, &calib)?;
        let boxes = self.dataset.boxes_3d(id)?;
        Ok(Sample {
            id: id.to_string(),
            input: self.input_encoder.encode(&cloud),
            target: self.target_encoder.encode(&boxes),
            boxes,
        })
    }
}

/// Worker threads filling a bounded queue.
///
/// Each worker takes the next id from a shared job queue, loads it and
/// blocks until the output queue has room. Frames that fail to load are
/// logged and skipped. Samples arrive in completion order. Dropping the
/// prefetcher stops the workers and joins them.
pub struct Prefetcher<T> {
    rx: Option<Receiver<T>>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl<T: Send + 'static> Prefetcher<T> {
    pub fn spawn<F>(ids: Vec<String>, config: &LoaderConfig, load: F) -> Self
    where
        F: Fn(&str) -> Result<T> + Send + Sync + 'static,
    {
        let (job_tx, job_rx) = unbounded::<String>();
        for id in ids {
            // The receiver is alive in this scope.
            let _ = job_tx.send(id);
        }
        drop(job_tx);

        let (tx, rx) = bounded(config.queue_capacity.max(1));
        let load = Arc::new(load);
        let stop = Arc::new(AtomicBool::new(false));
        let workers = (0..config.num_workers.max(1))
            .map(|worker| {
                let (job_rx, tx, load, stop) = (job_rx.clone(), tx.clone(), Arc::clone(&load), Arc::clone(&stop));
                thread::spawn(move || {
                    for id in job_rx.iter() {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        match (*load)(&id) {
                            Ok(sample) => {
                                if tx.send(sample).is_err() {
                                    debug!("prefetch worker {} stopping: consumer gone", worker);
                                    break;
                                }
                            }
                            Err(e) => warn!("skipping frame {}: {}", id, e),
                        }
                    }
                })
            })
            .collect();
        Self {
            rx: Some(rx),
            workers,
            stop,
        }
    }
}

impl Prefetcher<Sample> {
    /// Encoded samples of `ids` from `pipeline`.
    pub fn from_pipeline(pipeline: Arc<SamplePipeline>, ids: Vec<String>, config: &LoaderConfig) -> Self {
        Self::spawn(ids, config, move |id| pipeline.load(id))
    }
}

impl<T> Iterator for Prefetcher<T> {
    type Item = T;

    /// Blocks until a sample is ready; `None` once every worker is done.
    fn next(&mut self) -> Option<T> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl<T> Drop for Prefetcher<T> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Unblocks workers waiting on a full queue.
        drop(self.rx.take());
        for (worker, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                error!("prefetch worker {} panicked", worker);
            }
        }
    }
}
