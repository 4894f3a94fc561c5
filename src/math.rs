// Projection helpers

use glam::Mat4;

/// Perspective projection for Vulkan clip space.
///
/// View space is right-handed with y up, looking down -z. Depth maps to
/// 0..1 and clip-space y points down, so no viewport flip is needed.
pub fn create_perspective_projection_matrix(
    field_of_view: f32,
    aspect_ratio: f32,
    near_plane: f32,
    far_plane: f32,
) -> Mat4 {
    let mut projection = Mat4::perspective_rh(field_of_view, aspect_ratio, near_plane, far_plane);
    projection.y_axis.y *= -1.0;
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Vec3, Vec4};

    fn project(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * Vec4::new(p.x, p.y, p.z, 1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn near_and_far_planes_map_to_zero_and_one() {
        let m = create_perspective_projection_matrix(60f32.to_radians(), 1.0, 0.1, 100.0);
        assert_relative_eq!(project(m, Vec3::new(0.0, 0.0, -0.1)).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(project(m, Vec3::new(0.0, 0.0, -100.0)).z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn up_in_view_space_is_negative_clip_y() {
        let m = create_perspective_projection_matrix(90f32.to_radians(), 1.0, 0.1, 100.0);
        let p = project(m, Vec3::new(0.0, 1.0, -1.0));
        assert_relative_eq!(p.y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn aspect_ratio_scales_x() {
        let m = create_perspective_projection_matrix(90f32.to_radians(), 2.0, 0.1, 100.0);
        let p = project(m, Vec3::new(2.0, 0.0, -1.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
    }
}
