//! # Annotation entities
//!
//! Object types, class groups and the 2D/3D box representations shared by
//! the label parser, the target encoders and NMS.

use std::collections::HashMap;
use std::str::FromStr;

use derive_more::Display;
use nalgebra as na;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::error::{Error, Result};

pub mod input;

pub mod output;

/// KITTI object types as they appear in the first label column.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, StrumDisplay, EnumString, Serialize, Deserialize,
)]
pub enum ObjectType {
    Car,
    Van,
    Truck,
    Pedestrian,
    #[strum(serialize = "Person_sitting")]
    #[serde(rename = "Person_sitting")]
    PersonSitting,
    Cyclist,
    Tram,
    Misc,
    DontCare,
}

/// Maps a KITTI type onto the group it is trained as.
///
/// Types without an entry are dropped by the label parser.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassMap {
    class_to_group: HashMap<ObjectType, ObjectType>,
}

impl ClassMap {
    /// Build from `(group, members)` pairs, e.g. `[(Car, [Car, Van])]`.
    pub fn from_groups<G, M>(groups: G) -> Self
    where
        G: IntoIterator<Item = (ObjectType, M)>,
        M: IntoIterator<Item = ObjectType>,
    {
        let mut class_to_group = HashMap::new();
        for (group, members) in groups {
            for member in members {
                class_to_group.insert(member, group);
            }
        }
        Self { class_to_group }
    }

    /// Build from type names as found in configuration files.
    pub fn from_named_groups<'a, G, M>(groups: G) -> Result<Self>
    where
        G: IntoIterator<Item = (&'a str, M)>,
        M: IntoIterator<Item = &'a str>,
    {
        let parse = |name: &str| {
            ObjectType::from_str(name).map_err(|_| Error::config(format!("unknown object type {:?}", name)))
        };
        let mut pairs = Vec::new();
        for (group, members) in groups {
            let members = members.into_iter().map(parse).collect::<Result<Vec<_>>>()?;
            pairs.push((parse(group)?, members));
        }
        Ok(Self::from_groups(pairs))
    }

    pub fn group_of(&self, object_type: ObjectType) -> Option<ObjectType> {
        self.class_to_group.get(&object_type).copied()
    }

    /// Resolve a raw type string; unknown strings are simply unmapped.
    pub fn group_of_str(&self, type_name: &str) -> Option<ObjectType> {
        ObjectType::from_str(type_name).ok().and_then(|t| self.group_of(t))
    }

    pub fn is_empty(&self) -> bool {
        self.class_to_group.is_empty()
    }

    pub fn len(&self) -> usize {
        self.class_to_group.len()
    }
}

pub static CARS_ONLY: Lazy<ClassMap> = Lazy::new(|| ClassMap::from_groups([(ObjectType::Car, [ObjectType::Car])]));

pub static PEDESTRIANS_ONLY: Lazy<ClassMap> =
    Lazy::new(|| ClassMap::from_groups([(ObjectType::Pedestrian, [ObjectType::Pedestrian])]));

pub static CYCLISTS_ONLY: Lazy<ClassMap> =
    Lazy::new(|| ClassMap::from_groups([(ObjectType::Cyclist, [ObjectType::Cyclist])]));

pub static SMALL_OBJECTS: Lazy<ClassMap> = Lazy::new(|| {
    ClassMap::from_groups([
        (ObjectType::Pedestrian, [ObjectType::Pedestrian]),
        (ObjectType::Cyclist, [ObjectType::Cyclist]),
    ])
});

pub static ALL_VEHICLES: Lazy<ClassMap> = Lazy::new(|| {
    use ObjectType::*;
    ClassMap::from_groups([Car, Van, Truck, Tram, Misc].iter().map(|&t| (t, [t])))
});

pub static ALL_OBJECTS: Lazy<ClassMap> = Lazy::new(|| {
    use ObjectType::*;
    ClassMap::from_groups(
        [Car, Van, Truck, Pedestrian, PersonSitting, Cyclist, Tram, Misc]
            .iter()
            .map(|&t| (t, [t])),
    )
});

/// The two ways an image-plane box is described.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Box2DSpec {
    Corners { x1: f32, y1: f32, x2: f32, y2: f32 },
    CenterSize { cx: f32, cy: f32, w: f32, h: f32 },
}

/// Axis-aligned image-plane box, always stored as ordered corners.
#[derive(Clone, Copy, Debug, PartialEq, Display)]
#[display(fmt = "{} [{}, {}, {}, {}]", cls, x1, y1, x2, y2)]
pub struct Box2D {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub cls: ObjectType,
    pub score: Option<f32>,
}

impl Box2D {
    pub fn new(spec: Box2DSpec, cls: ObjectType) -> Self {
        let (xa, ya, xb, yb) = match spec {
            Box2DSpec::Corners { x1, y1, x2, y2 } => (x1, y1, x2, y2),
            Box2DSpec::CenterSize { cx, cy, w, h } => (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
        };
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
            cls,
            score: None,
        }
    }

    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32, cls: ObjectType) -> Self {
        Self::new(Box2DSpec::Corners { x1, y1, x2, y2 }, cls)
    }

    pub fn from_center_size(cx: f32, cy: f32, w: f32, h: f32, cls: ObjectType) -> Self {
        Self::new(Box2DSpec::CenterSize { cx, cy, w, h }, cls)
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn cx(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    pub fn cy(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    pub fn w(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn h(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.w() * self.h()
    }
}

/*
  Camera frame, rectified:

       O._________\ z (forward)
       /|         /
      / |
     /  |
 x |/_  |
       \|/
       y (down)

                                     (6)_________(7)
                                       /|       /|
                                      / |      / |
                                     /  |     /  |
                    ___          (5)/___|____/(4)|
                     |              |   |    |   |
                     |  ___         |(2)|____|___|(3)
                     h   /          |   /    |   /
                     |  w           |  /  C .|__/_____\ z'
                     | /            | /    /|| /      /
                    _|/          (1)|/____/_||/(0)
                                         /  |
                                     x'|/_  |
                                           \|/
                                           y'

                                    |<--l--->|

    (x, y, z) is the bottom-face centre C in the camera frame. The object
    frame is the camera frame rotated about Y by rot_y; the length runs
    along x', the width along z'.
*/

/// Oriented box in rectified camera coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Display)]
#[display(
    fmt = "{} x: {}, y: {}, z: {}, h: {}, w: {}, l: {}, rot_y: {}",
    cls,
    x,
    y,
    z,
    h,
    w,
    l,
    rot_y
)]
pub struct Box3D {
    pub h: f32,
    pub w: f32,
    pub l: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rot_y: f32,
    pub cls: ObjectType,
    pub score: Option<f32>,
}

impl Box3D {
    /// `None` unless all three extents are finite and strictly positive.
    #[allow(clippy::too_many_arguments)]
    pub fn new(h: f32, w: f32, l: f32, x: f32, y: f32, z: f32, rot_y: f32, cls: ObjectType) -> Option<Self> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !(valid(h) && valid(w) && valid(l)) {
            return None;
        }
        Some(Self {
            h,
            w,
            l,
            x,
            y,
            z,
            rot_y,
            cls,
            score: None,
        })
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    fn isometry(&self) -> na::Isometry3<f32> {
        na::Isometry3::new(
            na::Vector3::new(self.x, self.y, self.z),
            na::Vector3::y() * self.rot_y,
        )
    }

    pub fn corners(&self) -> CornerPoints {
        let iso = self.isometry();
        let (l, h, w) = (self.l / 2.0, self.h, self.w / 2.0);
        CornerPoints([
            iso * na::Point3::new(l, 0.0, w),
            iso * na::Point3::new(l, 0.0, -w),
            iso * na::Point3::new(-l, 0.0, -w),
            iso * na::Point3::new(-l, 0.0, w),
            iso * na::Point3::new(l, -h, w),
            iso * na::Point3::new(l, -h, -w),
            iso * na::Point3::new(-l, -h, -w),
            iso * na::Point3::new(-l, -h, w),
        ])
    }

    /// Bottom face in the x-z plane, corners 0..4.
    pub fn bev_footprint(&self) -> [na::Point2<f32>; 4] {
        let c = self.corners().0;
        [0, 1, 2, 3].map(|i| na::Point2::new(c[i].x, c[i].z))
    }

    /// Express a BEV offset from the box centre in the box's own frame:
    /// `(along length, along width)`.
    pub fn to_object_frame(&self, dx: f32, dz: f32) -> (f32, f32) {
        let (sin, cos) = self.rot_y.sin_cos();
        (dx * cos - dz * sin, dx * sin + dz * cos)
    }

    pub fn volume(&self) -> f32 {
        self.h * self.w * self.l
    }

    /// Every coordinate, extent and angle is finite.
    pub fn is_finite(&self) -> bool {
        [self.h, self.w, self.l, self.x, self.y, self.z, self.rot_y]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Eight corners, 0..4 on the bottom face and 4..8 on the top face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerPoints(pub [na::Point3<f32>; 8]);

impl CornerPoints {
    /// Camera-frame y of the bottom face (larger, since y points down).
    pub fn bottom(&self) -> f32 {
        self.0[0].y
    }

    pub fn top(&self) -> f32 {
        self.0[4].y
    }
}
