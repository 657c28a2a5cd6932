use glam::{Affine3A, Mat4, Vec3, Vec4};

use crate::errors::ConfigurationError;
use crate::resources::geometry::{Aabb, BoundingSphere};
use crate::scene::layers::Layers;
use crate::scene::transform::Transform;

/// Clip-space depth convention of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CoordinateSystem {
    /// Clip depth in [-1, 1].
    WebGl = 2000,
    /// Clip depth in [0, 1].
    #[default]
    WebGpu = 2001,
}

impl TryFrom<u32> for CoordinateSystem {
    type Error = ConfigurationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2000 => Ok(Self::WebGl),
            2001 => Ok(Self::WebGpu),
            value => Err(ConfigurationError::InvalidEnum {
                kind: "coordinate system",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    /// Checks the parameters can produce an invertible projection.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            Self::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => {
                if near.is_nan() || near <= 0.0 {
                    return Err(ConfigurationError::InvalidProjection(format!(
                        "perspective near plane must be positive (got {near})"
                    )));
                }
                if far.is_nan() || far <= near {
                    return Err(ConfigurationError::InvalidProjection(format!(
                        "far plane ({far}) must lie beyond near plane ({near})"
                    )));
                }
                let fov_ok = fov_y > 0.0 && fov_y < std::f32::consts::PI;
                if aspect.is_nan() || aspect <= 0.0 || !fov_ok {
                    return Err(ConfigurationError::InvalidProjection(format!(
                        "invalid field of view {fov_y} or aspect {aspect}"
                    )));
                }
            }
            Self::Orthographic {
                left,
                right,
                top,
                bottom,
                near,
                far,
            } => {
                if (right - left).abs() < f32::EPSILON
                    || (top - bottom).abs() < f32::EPSILON
                    || (far - near).abs() < f32::EPSILON
                {
                    return Err(ConfigurationError::InvalidProjection(
                        "orthographic volume has zero extent".to_owned(),
                    ));
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        match self {
            Self::Perspective { near, .. } | Self::Orthographic { near, .. } => *near,
        }
    }

    #[must_use]
    pub fn far(&self) -> f32 {
        match self {
            Self::Perspective { far, .. } | Self::Orthographic { far, .. } => *far,
        }
    }

    #[must_use]
    pub fn is_perspective(&self) -> bool {
        matches!(self, Self::Perspective { .. })
    }

    /// Builds the projection matrix. Reversed depth maps near to 1 and far
    /// to 0 in WebGPU clip space.
    #[must_use]
    pub fn matrix(&self, system: CoordinateSystem, reversed_depth: bool) -> Mat4 {
        let (near, far) = if reversed_depth {
            (self.far(), self.near())
        } else {
            (self.near(), self.far())
        };
        match (*self, system) {
            (Self::Perspective { fov_y, aspect, .. }, CoordinateSystem::WebGpu) => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            (Self::Perspective { fov_y, aspect, .. }, CoordinateSystem::WebGl) => {
                Mat4::perspective_rh_gl(fov_y, aspect, near, far)
            }
            (
                Self::Orthographic {
                    left,
                    right,
                    top,
                    bottom,
                    ..
                },
                CoordinateSystem::WebGpu,
            ) => Mat4::orthographic_rh(left, right, bottom, top, near, far),
            (
                Self::Orthographic {
                    left,
                    right,
                    top,
                    bottom,
                    ..
                },
                CoordinateSystem::WebGl,
            ) => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }
}

/// Sub-view of an array camera, rendered into its own viewport.
#[derive(Debug, Clone)]
pub struct CameraView {
    pub camera: Camera,
    /// (x, y, width, height) in pixels.
    pub viewport: Vec4,
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    projection: Projection,
    coordinate_system: CoordinateSystem,
    reversed_depth: bool,
    pub transform: Transform,
    pub layers: Layers,
    /// (x, y, width, height) in pixels; `None` covers the whole target.
    pub viewport: Option<Vec4>,
    /// Array camera sub-views. When non-empty, each view is rendered
    /// instead of this camera.
    pub views: Vec<CameraView>,
    projection_matrix: Mat4,
}

impl Camera {
    /// Perspective camera; `fov_y_degrees` is the vertical field of view.
    pub fn new_perspective(
        fov_y_degrees: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Result<Self, ConfigurationError> {
        Self::new(Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        })
    }

    pub fn new_orthographic(
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) -> Result<Self, ConfigurationError> {
        Self::new(Projection::Orthographic {
            left,
            right,
            top,
            bottom,
            near,
            far,
        })
    }

    pub fn new(projection: Projection) -> Result<Self, ConfigurationError> {
        projection.validate()?;
        let coordinate_system = CoordinateSystem::default();
        Ok(Self {
            name: String::new(),
            projection,
            coordinate_system,
            reversed_depth: false,
            transform: Transform::new(),
            layers: Layers::default(),
            viewport: None,
            views: Vec::new(),
            projection_matrix: projection.matrix(coordinate_system, false),
        })
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) -> Result<(), ConfigurationError> {
        projection.validate()?;
        self.projection = projection;
        self.update_projection_matrix();
        Ok(())
    }

    /// Updates the aspect ratio of a perspective camera.
    pub fn set_aspect(&mut self, aspect: f32) -> Result<(), ConfigurationError> {
        if let Projection::Perspective { fov_y, near, far, .. } = self.projection {
            self.set_projection(Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }

    /// Selects the clip-space convention. The renderer sets this to match
    /// its device before rendering.
    pub fn set_coordinate_system(&mut self, system: CoordinateSystem, reversed_depth: bool) {
        if self.coordinate_system != system || self.reversed_depth != reversed_depth {
            self.coordinate_system = system;
            self.reversed_depth = reversed_depth;
            self.update_projection_matrix();
        }
        for view in &mut self.views {
            view.camera.set_coordinate_system(system, reversed_depth);
        }
    }

    #[must_use]
    pub fn reversed_depth(&self) -> bool {
        self.reversed_depth
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = self
            .projection
            .matrix(self.coordinate_system, self.reversed_depth);
    }

    /// Recomputes the world matrix from the camera transform (cameras are
    /// not parented into the scene).
    pub fn update_world_matrix(&mut self) {
        self.transform.update_local_matrix();
        let local = *self.transform.local_matrix();
        self.transform.set_world_matrix(local);
        for view in &mut self.views {
            view.camera.update_world_matrix();
        }
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[must_use]
    pub fn world_matrix(&self) -> Affine3A {
        *self.transform.world_matrix()
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from(self.world_matrix().inverse())
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix()
    }

    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix().translation.into()
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection_matrix(), self.coordinate_system)
    }

    #[must_use]
    pub fn is_array_camera(&self) -> bool {
        !self.views.is_empty()
    }
}

/// Six clip planes (left, right, bottom, top, near, far) as
/// `normal.xyz, distance` with normals pointing inwards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Gribb-Hartmann plane extraction from a view-projection matrix.
    #[must_use]
    pub fn from_matrix(m: Mat4, system: CoordinateSystem) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];
        let near = match system {
            CoordinateSystem::WebGpu => rows[2],
            CoordinateSystem::WebGl => rows[3] + rows[2],
        };
        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            near,
            rows[3] - rows[2],
        ];
        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }
        Self { planes }
    }

    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(sphere.center) + p.w >= -sphere.radius)
    }

    /// Positive-vertex test against every plane.
    #[must_use]
    pub fn intersects_box(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|p| {
            let n = p.truncate();
            let positive = Vec3::select(n.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            n.dot(positive) + p.w >= 0.0
        })
    }

    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(point) + p.w >= 0.0)
    }
}
