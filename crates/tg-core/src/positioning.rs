use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use crate::bounding_box::BoundingBox;

/// World placement of a scene object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// Object dimensions as seen in the world, before rotation
    pub fn dimensions(&self, local: &BoundingBox) -> Vec3 {
        local.size() * self.scale.abs()
    }
}

/// Places object `b` over object `a`.
///
/// `b` takes `a`'s transform, is turned 90° about Z when its footprint runs
/// the other way, is scaled uniformly until the largest dimensions match,
/// and finally sits on the same world floor as `a`.
pub fn align_and_fit(a: &Transform, a_bounds: &BoundingBox, b_bounds: &BoundingBox) -> Transform {
    let mut matrix = a.matrix();

    let a_dims = a.dimensions(a_bounds);
    let b_dims = a.dimensions(b_bounds);

    let a_ratio = xy_ratio(a_dims);
    let b_ratio = xy_ratio(b_dims);
    if (a_ratio > 1.0 && b_ratio < 1.0) || (a_ratio < 1.0 && b_ratio > 1.0) {
        matrix *= Mat4::from_rotation_z(90f32.to_radians());
    }

    let a_max = a_dims.max_element();
    let b_max = b_dims.max_element();
    if b_max != 0.0 {
        matrix *= Mat4::from_scale(Vec3::splat(a_max / b_max));
    }

    let a_bottom = a_bounds.transformed(a.matrix()).min.z;
    let b_bottom = b_bounds.transformed(matrix).min.z;
    matrix.w_axis.z += a_bottom - b_bottom;

    Transform::from_matrix(matrix)
}

fn xy_ratio(dims: Vec3) -> f32 {
    if dims.y != 0.0 { dims.x / dims.y } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(size: Vec3) -> BoundingBox {
        BoundingBox::new(-size * 0.5, size * 0.5)
    }

    #[test]
    fn test_scales_to_largest_dimension() {
        let target = Transform::IDENTITY;
        let placed = align_and_fit(&target, &unit_box(Vec3::splat(2.0)), &unit_box(Vec3::splat(0.5)));

        assert!((placed.scale - Vec3::splat(4.0)).length() < 1e-4);
    }

    #[test]
    fn test_bottoms_align() {
        let target = Transform::from_translation(Vec3::new(3.0, 1.0, 5.0));
        let a_bounds = BoundingBox::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 2.0));
        let b_bounds = unit_box(Vec3::splat(2.0));

        let placed = align_and_fit(&target, &a_bounds, &b_bounds);
        let b_world = b_bounds.transformed(placed.matrix());

        assert!((b_world.min.z - 5.0).abs() < 1e-4);
        assert!((placed.translation.x - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_rotates_when_footprint_differs() {
        let target = Transform::IDENTITY;
        let wide = unit_box(Vec3::new(4.0, 1.0, 1.0));
        let deep = unit_box(Vec3::new(1.0, 4.0, 1.0));

        let placed = align_and_fit(&target, &wide, &deep);
        let b_world = deep.transformed(placed.matrix());
        let size = b_world.size();

        assert!(size.x > size.y);
    }

    #[test]
    fn test_no_rotation_for_matching_footprint() {
        let target = Transform::IDENTITY;
        let wide = unit_box(Vec3::new(4.0, 1.0, 1.0));

        let placed = align_and_fit(&target, &wide, &unit_box(Vec3::new(2.0, 1.0, 1.0)));

        assert!(placed.rotation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }
}
