//! # Frame inputs
//!
//! Parsers for the per-frame KITTI inputs: annotation records and raw
//! velodyne scans.

use log::warn;
use nalgebra as na;

use super::{Box2D, Box3D, ClassMap, ObjectType};
use crate::error::{Error, Result};
use crate::point_cloud::PointCloud;

/// Positional columns of a KITTI label record.
pub const KITTI_COLUMN_NAMES: [&str; 15] = [
    "type", "truncated", "occluded", "alpha", "x1", "y1", "x2", "y2", "h", "w", "l", "x", "y", "z", "rot_y",
];

/// How label records are turned into boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelOptions {
    /// Horizontal factor applied to 2D box corners.
    pub scale_x: f32,
    /// Vertical factor applied to 2D box corners.
    pub scale_y: f32,
    /// Fail on the first malformed record instead of skipping it.
    pub strict: bool,
}

impl LabelOptions {
    pub fn new(strict: bool) -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            strict,
        }
    }

    /// Rescale 2D boxes annotated on a `reference` image to `target` pixels.
    pub fn rescaling(reference: (u32, u32), target: (u32, u32), strict: bool) -> Self {
        Self {
            scale_x: target.0 as f32 / reference.0 as f32,
            scale_y: target.1 as f32 / reference.1 as f32,
            strict,
        }
    }
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Boxes parsed from one label file, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Labels {
    pub boxes_2d: Vec<Box2D>,
    pub boxes_3d: Vec<Box3D>,
}

/// Parse a KITTI label file.
///
/// Records whose type is not in `class_map` are dropped before any numeric
/// field is looked at. An optional 16th column is read as a detection score.
pub fn parse_labels(text: &str, class_map: &ClassMap, options: &LabelOptions) -> Result<Labels> {
    let mut labels = Labels::default();
    for (line_idx, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let group = match class_map.group_of_str(fields[0]) {
            Some(group) => group,
            None => continue,
        };
        match parse_record(line_idx + 1, &fields, group, options) {
            Ok((box_2d, box_3d)) => {
                labels.boxes_2d.push(box_2d);
                labels.boxes_3d.push(box_3d);
            }
            Err(e) if !options.strict => warn!("skipping label record: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(labels)
}

fn parse_record(
    line: usize,
    fields: &[&str],
    cls: ObjectType,
    options: &LabelOptions,
) -> Result<(Box2D, Box3D)> {
    if fields.len() != KITTI_COLUMN_NAMES.len() && fields.len() != KITTI_COLUMN_NAMES.len() + 1 {
        return Err(Error::RecordParse {
            line,
            column: 0,
            value: format!("expected 15 or 16 columns, found {}", fields.len()),
        });
    }
    let mut values = [0f32; 16];
    for (column, field) in fields.iter().enumerate().skip(1) {
        values[column] = field.parse::<f32>().map_err(|_| Error::RecordParse {
            line,
            column: column + 1,
            value: field.to_string(),
        })?;
    }
    let score = (fields.len() == 16).then(|| values[15]);

    let [_, _truncated, _occluded, _alpha, x1, y1, x2, y2, h, w, l, x, y, z, rot_y, _] = values;

    let mut box_2d = Box2D::from_corners(
        x1 * options.scale_x,
        y1 * options.scale_y,
        x2 * options.scale_x,
        y2 * options.scale_y,
        cls,
    );
    let mut box_3d = Box3D::new(h, w, l, x, y, z, rot_y, cls).ok_or_else(|| Error::RecordParse {
        line,
        column: 9,
        value: format!("non-positive extents h={} w={} l={}", h, w, l),
    })?;
    if let Some(score) = score {
        box_2d = box_2d.with_score(score);
        box_3d = box_3d.with_score(score);
    }
    Ok((box_2d, box_3d))
}

/// Decode a velodyne scan: little-endian `f32` quadruples `(x, y, z, r)`.
pub fn parse_velodyne(bytes: &[u8]) -> Result<PointCloud> {
    const RECORD: usize = 4 * std::mem::size_of::<f32>();
    if bytes.len() % RECORD != 0 {
        return Err(Error::Parse(format!(
            "velodyne scan of {} bytes is not a whole number of points",
            bytes.len()
        )));
    }
    let mut cloud = PointCloud::with_capacity(bytes.len() / RECORD);
    for record in bytes.chunks_exact(RECORD) {
        let mut v = [0f32; 4];
        for (dst, src) in v.iter_mut().zip(record.chunks_exact(4)) {
            *dst = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        }
        cloud.push(na::Point3::new(v[0], v[1], v[2]), v[3]);
    }
    Ok(cloud)
}
