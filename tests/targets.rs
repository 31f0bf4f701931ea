mod common;

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;

use kitti_pixor::config::ImageTargetConfig;
use kitti_pixor::target::{
    BevGrid, Footprint, OverlapPolicy, RegressionStats, StatsSource, TargetTensor, BEV_CHANNELS, IMAGE_CHANNELS,
};
use kitti_pixor::{
    nms, BevTargetEncoder, Box2D, Box3D, Error, ImageTargetEncoder, NmsConfig, ObjectType, PipelineConfig,
    TargetEncoder,
};

fn identity_stats(names: &[&str]) -> RegressionStats {
    let mut stats = RegressionStats::default();
    for name in names {
        stats.mean.insert(name.to_string(), 0.0);
        stats.std.insert(name.to_string(), 1.0);
    }
    stats
}

fn car(x: f32, z: f32, rot_y: f32) -> Box3D {
    Box3D::new(1.5, 1.6, 3.9, x, 1.7, z, rot_y, ObjectType::Car).unwrap()
}

#[test]
fn bev_round_trip_recovers_the_box() {
    let config = common::config();
    let encoder = BevTargetEncoder::new(&config).unwrap();
    assert_eq!(encoder.shape(), (40, 35, 7));

    let truth = car(2.3, 20.4, 0.3);
    let target = encoder.encode(&[truth]);
    let positives = target.index_axis(ndarray::Axis(2), 0).iter().filter(|v| **v > 0.0).count();
    assert!(positives >= 1);
    // Centre cell of (2.3, 20.4) on a 2 m grid.
    assert_eq!(target[[21, 10, 0]], 1.0);

    let candidates = encoder.decode(&target, 0.5).unwrap();
    assert_eq!(candidates.len(), positives);
    let detections = nms(&candidates, &config.nms).unwrap();
    assert_eq!(detections.len(), 1);

    let d = &detections[0];
    assert_eq!(d.cls, ObjectType::Car);
    assert_eq!(d.score, Some(1.0));
    for (got, want) in [(d.x, truth.x), (d.z, truth.z), (d.w, truth.w), (d.l, truth.l), (d.rot_y, truth.rot_y)] {
        assert_relative_eq!(got, want, epsilon = 0.1);
    }
    assert_relative_eq!(d.h, config.target.mean_height);
    assert_relative_eq!(d.y, config.target.mean_altitude);
}

#[test]
fn bev_round_trip_with_real_statistics() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs").join("car_bev.json");
    let config = PipelineConfig::load(&path).unwrap();
    let encoder = BevTargetEncoder::new(&config).unwrap();
    assert_eq!(encoder.shape(), (200, 175, 7));

    let boxes = [car(-8.0, 15.0, -1.2), car(6.5, 42.0, 1.5)];
    let target = encoder.encode(&boxes);
    let detections = nms(&encoder.decode(&target, 0.5).unwrap(), &config.nms).unwrap();
    assert_eq!(detections.len(), 2);
    for truth in &boxes {
        let found = detections
            .iter()
            .any(|d| (d.x - truth.x).abs() < 0.1 && (d.z - truth.z).abs() < 0.1 && (d.rot_y - truth.rot_y).abs() < 0.1);
        assert!(found, "no detection for {}", truth);
    }
}

#[test]
fn footprint_cells_start_at_the_centre() {
    let mut config = common::config();
    config.target.footprint = Footprint::Ellipse { scale: 1.0 };
    let grid = BevGrid::new(&config);
    let big = Box3D::new(1.5, 4.0, 10.0, 0.5, 1.7, 30.5, 0.0, ObjectType::Car).unwrap();
    let cells = grid.footprint_cells(&big);
    assert_eq!(cells[0], grid.cell_of(0.5, 30.5).unwrap());
    assert!(cells.len() > 1);
    for &(row, col) in &cells[1..] {
        let (x, z) = grid.cell_center((row, col));
        assert!((x - 0.5).abs() <= 5.0 && (z - 30.5).abs() <= 2.0);
    }

    config.target.footprint = Footprint::Center;
    assert_eq!(BevGrid::new(&config).footprint_cells(&big).len(), 1);
}

#[test]
fn grid_upper_bounds_belong_to_the_last_cell() {
    let grid = BevGrid::new(&common::config());
    assert_eq!(grid.cell_of(40.0, 70.0), Some((39, 34)));
    assert_eq!(grid.cell_of(-40.0, 0.0), Some((0, 0)));
    assert_eq!(grid.cell_of(40.1, 10.0), None);
}

#[test]
fn boxes_outside_the_grid_paint_nothing() {
    let encoder = BevTargetEncoder::new(&common::config()).unwrap();
    let target = encoder.encode(&[car(100.0, 20.0, 0.0), car(0.0, -5.0, 0.0)]);
    assert_eq!(target.sum(), 0.0);
}

#[test]
fn overlap_policy_decides_the_shared_cell() {
    let first = car(2.3, 20.4, 0.3);
    let second = car(2.3, 20.4, -1.0);

    let mut config = common::config();
    let last = BevTargetEncoder::new(&config).unwrap().encode(&[first, second]);
    assert_relative_eq!(last[[21, 10, 1]], (-1.0f32).sin());

    config.target.overlap = OverlapPolicy::FirstWriteWins;
    let kept = BevTargetEncoder::new(&config).unwrap().encode(&[first, second]);
    assert_relative_eq!(kept[[21, 10, 1]], 0.3f32.sin());
}

#[test]
fn decode_threshold_is_strict() {
    let encoder = BevTargetEncoder::new(&common::config()).unwrap();
    let mut tensor = TargetTensor::zeros(encoder.shape());
    tensor[[5, 7, 0]] = 0.5;
    assert!(encoder.decode(&tensor, 0.5).unwrap().is_empty());

    let boxes = encoder.decode(&tensor, 0.4).unwrap();
    assert_eq!(boxes.len(), 1);
    let (xc, zc) = encoder.grid().cell_center((5, 7));
    assert_relative_eq!(boxes[0].x, xc);
    assert_relative_eq!(boxes[0].z, zc);
    assert_relative_eq!(boxes[0].w, 1.0);
    assert_eq!(boxes[0].score, Some(0.5));
}

#[test]
fn decode_rejects_a_mismatched_tensor() {
    let encoder = BevTargetEncoder::new(&common::config()).unwrap();
    let tensor = TargetTensor::zeros((40, 35, 5));
    assert!(matches!(encoder.decode(&tensor, 0.5), Err(Error::InvalidConfig(_))));
}

#[test]
fn decode_skips_cells_that_overflow() {
    let encoder = BevTargetEncoder::new(&common::config()).unwrap();
    let mut tensor = TargetTensor::zeros(encoder.shape());
    // log_w = 200 overflows to an infinite width.
    tensor[[10, 10, 0]] = 0.9;
    tensor[[10, 10, 5]] = 200.0;
    // Undefined heading.
    tensor[[12, 3, 0]] = 0.85;
    tensor[[12, 3, 1]] = f32::NAN;
    tensor[[10, 11, 0]] = 0.8;

    let candidates = encoder.decode(&tensor, 0.5).unwrap();
    assert_eq!(candidates.len(), 1);
    assert!(candidates.iter().all(Box3D::is_finite));
    assert_eq!(candidates[0].score, Some(0.8));

    let detections = nms(&candidates, &NmsConfig::new(0.1, 100).unwrap()).unwrap();
    assert_eq!(detections, candidates);
}

#[test]
fn decode_ignores_nan_objectness() {
    let encoder = BevTargetEncoder::new(&common::config()).unwrap();
    let mut tensor = TargetTensor::zeros(encoder.shape());
    tensor[[3, 4, 0]] = f32::NAN;
    tensor[[6, 8, 0]] = 0.7;
    let boxes = encoder.decode(&tensor, 0.5).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(boxes[0].score, Some(0.7));
}

#[test]
fn decode_rejects_a_nan_threshold() {
    let bev = BevTargetEncoder::new(&common::config()).unwrap();
    let tensor = TargetTensor::from_elem(bev.shape(), 0.9);
    assert!(matches!(bev.decode(&tensor, f32::NAN), Err(Error::InvalidThreshold(t)) if t.is_nan()));

    let image = ImageTargetEncoder::new(&image_config()).unwrap();
    let tensor = TargetTensor::from_elem(image.shape(), 0.9);
    assert!(matches!(image.decode(&tensor, f32::NAN), Err(Error::InvalidThreshold(_))));
}

#[test]
fn image_decode_skips_cells_that_overflow() {
    let encoder = ImageTargetEncoder::new(&image_config()).unwrap();
    let mut tensor = TargetTensor::zeros(encoder.shape());
    tensor[[20, 30, 0]] = 0.9;
    tensor[[20, 30, 3]] = 200.0;
    tensor[[40, 50, 0]] = f32::NAN;
    tensor[[20, 31, 0]] = 0.8;

    let candidates = encoder.decode(&tensor, 0.5).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].score, Some(0.8));
    assert_eq!(nms(&candidates, &NmsConfig::default()).unwrap().len(), 1);
}

#[test]
fn decoded_boxes_take_the_first_group() {
    let config = common::config();
    assert_eq!(config.primary_group().unwrap(), ObjectType::Car);

    let mut config = image_config();
    config.classes.insert("Cyclist".to_string(), vec!["Cyclist".to_string()]);
    // Groups are ordered by name.
    assert_eq!(config.primary_group().unwrap(), ObjectType::Car);
    let encoder = ImageTargetEncoder::new(&config).unwrap();
    let mut tensor = TargetTensor::zeros(encoder.shape());
    tensor[[1, 1, 0]] = 1.0;
    assert_eq!(encoder.decode(&tensor, 0.5).unwrap()[0].cls, ObjectType::Car);

    config.classes.clear();
    assert!(matches!(config.primary_group(), Err(Error::InvalidConfig(_))));
}

fn image_config() -> PipelineConfig {
    let mut config = common::config();
    config.image_target = Some(ImageTargetConfig {
        downsampling_factor: 4,
        footprint: Footprint::default(),
        overlap: OverlapPolicy::default(),
        stats: StatsSource::Inline(identity_stats(&IMAGE_CHANNELS)),
    });
    config
}

#[test]
fn image_round_trip_recovers_the_box() {
    let config = image_config();
    let encoder = ImageTargetEncoder::new(&config).unwrap();
    assert_eq!(encoder.shape(), (94, 311, 5));

    let truth = Box2D::from_corners(100.0, 50.0, 180.0, 120.0, ObjectType::Car);
    let target = encoder.encode(&[truth]);
    let candidates = encoder.decode(&target, 0.5).unwrap();
    assert!(candidates.len() > 1);

    let detections = nms(&candidates, &NmsConfig::new(0.5, 100).unwrap()).unwrap();
    assert_eq!(detections.len(), 1);
    let d = &detections[0];
    for (got, want) in [(d.x1, truth.x1), (d.y1, truth.y1), (d.x2, truth.x2), (d.y2, truth.y2)] {
        assert_relative_eq!(got, want, epsilon = 1e-2);
    }
}

#[test]
fn image_targets_need_their_section() {
    assert!(matches!(
        ImageTargetEncoder::new(&common::config()),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn statistics_round_trip_through_json() {
    let config = common::config();
    let grid = BevGrid::new(&config);
    let boxes = [car(2.3, 20.4, 0.3), car(-10.0, 35.0, -1.2), car(15.0, 50.0, 2.0)];
    let stats = grid.compute_stats(&boxes);
    assert_relative_eq!(stats.mean["log_w"], 1.6f32.ln(), epsilon = 1e-5);
    assert!(stats.std["sin_yaw"] > 0.0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");
    stats.save(&path).unwrap();
    let loaded = RegressionStats::load(&path).unwrap();
    assert_eq!(loaded, stats);

    // Every box has the same width: no spread, no usable normalization.
    assert!(matches!(loaded.normalization(&BEV_CHANNELS), Err(Error::InvalidConfig(_))));
}

#[test]
fn statistics_need_every_channel() {
    let mut stats = identity_stats(&BEV_CHANNELS);
    stats.std.remove("dz");
    assert!(matches!(stats.normalization(&BEV_CHANNELS), Err(Error::InvalidConfig(_))));
    stats.std.insert("dz".to_string(), f32::NAN);
    assert!(matches!(stats.normalization(&BEV_CHANNELS), Err(Error::InvalidConfig(_))));
}

#[test]
fn statistics_files_resolve_next_to_the_config() {
    let dir = tempfile::tempdir().unwrap();
    identity_stats(&BEV_CHANNELS).save(&dir.path().join("bev_stats.json")).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(common::CONFIG_JSON).unwrap();
    value["target"]["stats"] = serde_json::json!({ "path": "bev_stats.json" });
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, value.to_string()).unwrap();

    let config = PipelineConfig::load(&config_path).unwrap();
    assert!(BevTargetEncoder::new(&config).is_ok());
}

#[test]
fn config_validation_rejects_mismatched_shapes() {
    let bad_target = common::CONFIG_JSON.replace("[40, 35]", "[40, 36]");
    assert!(matches!(PipelineConfig::from_json_str(&bad_target), Err(Error::InvalidConfig(_))));

    let bad_factor = common::CONFIG_JSON.replace("\"downsampling_factor\": 4", "\"downsampling_factor\": 3");
    assert!(matches!(PipelineConfig::from_json_str(&bad_factor), Err(Error::InvalidConfig(_))));

    let no_encoding = common::CONFIG_JSON.replace("\"point_encoding\": \"occupancy\",", "");
    assert!(matches!(PipelineConfig::from_json_str(&no_encoding), Err(Error::Json { .. })));

    let bad_class = common::CONFIG_JSON.replace("\"Van\"", "\"Lorry\"");
    assert!(matches!(PipelineConfig::from_json_str(&bad_class), Err(Error::InvalidConfig(_))));
}
