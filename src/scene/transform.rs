use glam::{Affine3A, Mat3, Quat, Vec3};

/// The TRS triple a local matrix was built from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Trs {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
}

/// Position, rotation and scale of a node, with its cached local and world
/// matrices.
///
/// The fields are plain data; [`Transform::update_local_matrix`] compares
/// them against the triple the cached matrix came from and rebuilds only
/// on a difference.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    built_from: Option<Trs>,
    local: Affine3A,
    pub(crate) world_matrix: Affine3A,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            built_from: None,
            local: Affine3A::IDENTITY,
            world_matrix: Affine3A::IDENTITY,
        }
    }

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    fn trs(&self) -> Trs {
        Trs {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Returns whether the local matrix had to be rebuilt.
    pub fn update_local_matrix(&mut self) -> bool {
        let current = self.trs();
        if self.built_from == Some(current) {
            return false;
        }
        self.local = Affine3A::from_scale_rotation_translation(current.scale, current.rotation, current.position);
        self.built_from = Some(current);
        true
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Affine3A {
        &self.local
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Affine3A {
        &self.world_matrix
    }

    pub fn set_world_matrix(&mut self, world: Affine3A) {
        self.world_matrix = world;
    }

    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix.translation.into()
    }

    /// True when the world matrix flips handedness, which swaps the
    /// winding of every triangle drawn with it.
    #[must_use]
    pub fn is_mirrored(&self) -> bool {
        self.world_matrix.matrix3.determinant() < 0.0
    }

    /// Rotates so that -Z faces `target` (parent space). Degenerate inputs
    /// leave the rotation unchanged.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        let right = forward.cross(up);
        if right.length_squared() < 1e-8 {
            return;
        }
        let right = right.normalize();
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, right.cross(forward), -forward));
    }

    /// Forces the next [`Transform::update_local_matrix`] to rebuild.
    pub fn mark_dirty(&mut self) {
        self.built_from = None;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_matrix_tracks_the_trs_it_was_built_from() {
        let mut t = Transform::new();
        assert!(t.update_local_matrix());
        assert!(!t.update_local_matrix());

        t.position.x = 1.0;
        assert!(t.update_local_matrix());
        assert_eq!(t.local_matrix().translation.x, 1.0);

        t.mark_dirty();
        assert!(t.update_local_matrix());
    }

    #[test]
    fn negative_scale_is_mirrored() {
        let mut t = Transform::new().with_scale(Vec3::new(-1.0, 1.0, 1.0));
        t.update_local_matrix();
        t.set_world_matrix(*t.local_matrix());
        assert!(t.is_mirrored());

        let mut twice = Transform::new().with_scale(Vec3::new(-1.0, -1.0, 1.0));
        twice.update_local_matrix();
        twice.set_world_matrix(*twice.local_matrix());
        assert!(!twice.is_mirrored());
    }

    #[test]
    fn look_at_points_negative_z_at_target() {
        let mut t = Transform::from_position(Vec3::new(0.0, 0.0, 5.0));
        t.look_at(Vec3::ZERO, Vec3::Y);
        let forward = t.rotation * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn look_at_along_up_is_ignored() {
        let mut t = Transform::new();
        t.look_at(Vec3::new(0.0, 3.0, 0.0), Vec3::Y);
        assert_eq!(t.rotation, Quat::IDENTITY);
    }
}
