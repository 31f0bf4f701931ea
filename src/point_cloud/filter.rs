use nalgebra as na;

use super::PointCloud;
use crate::calibration::project_in_front;
use crate::config::Workspace;

/// Keep the points inside the workspace, bounds included.
pub fn filter_by_region(cloud: &PointCloud, bounds: &Workspace) -> PointCloud {
    let mask: Vec<bool> = cloud.points().iter().map(|p| bounds.contains(p)).collect();
    cloud.select(&mask)
}

/// Keep the points in front of the camera whose projection lands inside an
/// image of `image_size = (width, height)` pixels.
pub fn filter_by_fov(cloud: &PointCloud, projection: &na::Matrix4<f32>, image_size: (u32, u32)) -> PointCloud {
    let (width, height) = (image_size.0 as f32, image_size.1 as f32);
    let mut mask = vec![false; cloud.len()];
    for (index, px) in project_in_front(projection, cloud.points()) {
        mask[index] = px.x >= 0.0 && px.x < width && px.y >= 0.0 && px.y < height;
    }
    cloud.select(&mask)
}
