#![allow(dead_code)]

use std::fs;
use std::path::Path;

use kitti_pixor::PipelineConfig;

/// Calibration of KITTI training frame 000000.
pub const CALIB_000000: &str = "\
P0: 7.215377e+02 0.000000e+00 6.095593e+02 0.000000e+00 0.000000e+00 7.215377e+02 1.728540e+02 0.000000e+00 0.000000e+00 0.000000e+00 1.000000e+00 0.000000e+00
P1: 7.215377e+02 0.000000e+00 6.095593e+02 -3.875744e+02 0.000000e+00 7.215377e+02 1.728540e+02 0.000000e+00 0.000000e+00 0.000000e+00 1.000000e+00 0.000000e+00
P2: 7.215377e+02 0.000000e+00 6.095593e+02 4.485728e+01 0.000000e+00 7.215377e+02 1.728540e+02 2.163791e-01 0.000000e+00 0.000000e+00 1.000000e+00 2.745884e-03
P3: 7.215377e+02 0.000000e+00 6.095593e+02 -3.395242e+02 0.000000e+00 7.215377e+02 1.728540e+02 2.199936e+00 0.000000e+00 0.000000e+00 1.000000e+00 2.729905e-03
R0_rect: 9.999239e-01 9.837760e-03 -7.445048e-03 -9.869795e-03 9.999421e-01 -4.278459e-03 7.402527e-03 4.351614e-03 9.999631e-01
Tr_velo_to_cam: 7.533745e-03 -9.999714e-01 -6.166020e-04 -4.069766e-03 1.480249e-02 7.280733e-04 -9.998902e-01 -7.631618e-02 9.998621e-01 7.523790e-03 1.480755e-02 -2.717806e-01
Tr_imu_to_velo: 9.999976e-01 7.553071e-04 -2.035826e-03 -8.086759e-01 -7.854027e-04 9.998898e-01 -1.482298e-02 3.195559e-01 2.024406e-03 1.482454e-02 9.998881e-01 -7.997231e-01
";

/// A label file with a car, a pedestrian, a DontCare region and a van.
pub const LABELS_MIXED: &str = "\
Car 0.00 0 -1.58 587.01 173.33 614.12 200.12 1.65 1.67 3.64 -0.65 1.71 46.70 -1.59
Pedestrian 0.00 0 -0.20 712.40 143.00 810.73 307.92 1.89 0.48 1.20 1.84 1.47 8.41 0.01
DontCare -1 -1 -10 503.89 169.71 590.61 190.13 -1 -1 -1 -1000 -1000 -1000 -10

Van 0.00 1 1.85 387.63 181.54 423.81 203.12 2.19 1.91 5.12 -16.53 2.39 58.49 1.57
";

/// Small grid: 0.5 m voxels, 2 m target cells, identity normalization.
pub const CONFIG_JSON: &str = r#"{
  "workspace": { "x": [-40.0, 40.0], "y": [-1.0, 2.5], "z": [0.0, 70.0] },
  "input_shape": [160, 140, 7],
  "target_shape": [40, 35],
  "downsampling_factor": 4,
  "point_encoding": "occupancy",
  "target": {
    "footprint": { "ellipse": { "scale": 0.5 } },
    "stats": {
      "mean": { "sin_yaw": 0.0, "cos_yaw": 0.0, "dx": 0.0, "dz": 0.0, "log_w": 0.0, "log_l": 0.0 },
      "std":  { "sin_yaw": 1.0, "cos_yaw": 1.0, "dx": 1.0, "dz": 1.0, "log_w": 1.0, "log_l": 1.0 }
    }
  },
  "classes": { "Car": ["Car", "Van"] },
  "nms": { "iou_threshold": 0.1 }
}"#;

pub fn config() -> PipelineConfig {
    PipelineConfig::from_json_str(CONFIG_JSON).unwrap()
}

pub fn velodyne_bytes(points: &[[f32; 4]]) -> Vec<u8> {
    points.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
}

/// Lays out one frame of a KITTI training directory. `None` leaves that
/// file out.
pub fn write_frame(root: &Path, id: &str, calib: Option<&str>, labels: Option<&str>, points: Option<&[[f32; 4]]>) {
    for dir in ["calib", "label_2", "velodyne", "image_2", "subsets"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    if let Some(calib) = calib {
        fs::write(root.join("calib").join(format!("{}.txt", id)), calib).unwrap();
    }
    if let Some(labels) = labels {
        fs::write(root.join("label_2").join(format!("{}.txt", id)), labels).unwrap();
    }
    if let Some(points) = points {
        fs::write(root.join("velodyne").join(format!("{}.bin", id)), velodyne_bytes(points)).unwrap();
    }
}

pub fn write_subset(root: &Path, subset: &str, ids: &[&str]) {
    fs::create_dir_all(root.join("subsets")).unwrap();
    fs::write(root.join("subsets").join(format!("{}.txt", subset)), ids.join("\n")).unwrap();
}
