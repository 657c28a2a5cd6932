//! Camera and Frustum Tests
//!
//! Tests for:
//! - Projection validation
//! - WebGPU / WebGL clip depth ranges and reversed depth
//! - Frustum plane extraction
//! - Frustum-sphere and frustum-AABB intersection
//! - Coordinate system codes

use glam::{Affine3A, Vec3, Vec4};

use kiln::errors::ConfigurationError;
use kiln::resources::geometry::{Aabb, BoundingSphere};
use kiln::scene::camera::{Camera, CoordinateSystem, Frustum, Projection};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn ndc_depth(camera: &Camera, view_z: f32) -> f32 {
    let clip = camera.projection_matrix() * Vec4::new(0.0, 0.0, view_z, 1.0);
    clip.z / clip.w
}

fn camera_at_origin() -> Camera {
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0).unwrap();
    camera.update_world_matrix();
    camera
}

// ============================================================================
// Projection Validation Tests
// ============================================================================

#[test]
fn perspective_rejects_non_positive_near() {
    let err = Camera::new_perspective(60.0, 1.0, 0.0, 100.0).unwrap_err();
    assert!(
        matches!(err, ConfigurationError::InvalidProjection(_)),
        "near = 0 must be rejected, got {err:?}"
    );
}

#[test]
fn perspective_rejects_far_before_near() {
    assert!(Camera::new_perspective(60.0, 1.0, 10.0, 1.0).is_err());
    assert!(Camera::new_perspective(60.0, 1.0, 1.0, 1.0).is_err());
}

#[test]
fn perspective_rejects_degenerate_fov_and_aspect() {
    assert!(Camera::new_perspective(0.0, 1.0, 0.1, 10.0).is_err());
    assert!(Camera::new_perspective(190.0, 1.0, 0.1, 10.0).is_err());
    assert!(Camera::new_perspective(60.0, 0.0, 0.1, 10.0).is_err());
}

#[test]
fn orthographic_rejects_zero_extent() {
    assert!(Camera::new_orthographic(-1.0, -1.0, 1.0, -1.0, 0.1, 10.0).is_err());
    assert!(Camera::new_orthographic(-1.0, 1.0, 1.0, 1.0, 0.1, 10.0).is_err());
    assert!(Camera::new_orthographic(-1.0, 1.0, 1.0, -1.0, 0.1, 10.0).is_ok());
}

#[test]
fn set_aspect_validates_and_keeps_old_projection() {
    let mut camera = camera_at_origin();
    let before = *camera.projection();
    assert!(camera.set_aspect(-1.0).is_err());
    assert_eq!(*camera.projection(), before);
    assert!(camera.set_aspect(2.0).is_ok());
    assert!(matches!(
        camera.projection(),
        Projection::Perspective { aspect, .. } if approx(*aspect, 2.0)
    ));
}

// ============================================================================
// Clip Depth Tests
// ============================================================================

#[test]
fn webgpu_depth_maps_near_to_0_and_far_to_1() {
    let camera = camera_at_origin();
    assert!(approx(ndc_depth(&camera, -0.1), 0.0), "near should map to 0");
    assert!(approx(ndc_depth(&camera, -100.0), 1.0), "far should map to 1");
}

#[test]
fn webgl_depth_spans_minus_one_to_one() {
    let mut camera = camera_at_origin();
    camera.set_coordinate_system(CoordinateSystem::WebGl, false);
    assert!(approx(ndc_depth(&camera, -0.1), -1.0));
    assert!(approx(ndc_depth(&camera, -100.0), 1.0));
}

#[test]
fn reversed_depth_maps_near_to_1() {
    let mut camera = camera_at_origin();
    camera.set_coordinate_system(CoordinateSystem::WebGpu, true);
    assert!(camera.reversed_depth());
    let near = ndc_depth(&camera, -0.1);
    let far = ndc_depth(&camera, -100.0);
    assert!(approx(near, 1.0), "near should map to 1 with reversed depth, got {near}");
    assert!(approx(far, 0.0), "far should map to 0 with reversed depth, got {far}");
}

#[test]
fn coordinate_system_codes_round_trip() {
    assert_eq!(CoordinateSystem::try_from(2000).unwrap(), CoordinateSystem::WebGl);
    assert_eq!(CoordinateSystem::try_from(2001).unwrap(), CoordinateSystem::WebGpu);
    assert!(matches!(
        CoordinateSystem::try_from(7),
        Err(ConfigurationError::InvalidEnum { value: 7, .. })
    ));
}

// ============================================================================
// Frustum Tests
// ============================================================================

#[test]
fn frustum_contains_points_in_front_only() {
    let frustum = camera_at_origin().frustum();
    assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -5.0)));
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 5.0)), "behind the camera");
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -200.0)), "past the far plane");
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -0.05)), "before the near plane");
}

#[test]
fn frustum_planes_are_normalized() {
    let frustum = camera_at_origin().frustum();
    for plane in frustum.planes() {
        assert!(
            approx(plane.truncate().length(), 1.0),
            "plane normal should be unit length, got {plane:?}"
        );
    }
}

#[test]
fn sphere_straddling_a_plane_intersects() {
    let frustum = camera_at_origin().frustum();
    let straddling = BoundingSphere {
        center: Vec3::new(0.0, 0.0, 1.0),
        radius: 2.0,
    };
    let outside = BoundingSphere {
        center: Vec3::new(0.0, 0.0, 10.0),
        radius: 2.0,
    };
    assert!(frustum.intersects_sphere(&straddling));
    assert!(!frustum.intersects_sphere(&outside));
}

#[test]
fn box_intersection_uses_positive_vertex() {
    let frustum = camera_at_origin().frustum();
    let inside = Aabb::from_points([Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0)]);
    let far_left = Aabb::from_points([Vec3::new(-500.0, -1.0, -6.0), Vec3::new(-400.0, 1.0, -4.0)]);
    assert!(frustum.intersects_box(&inside));
    assert!(!frustum.intersects_box(&far_left));
}

#[test]
fn moved_camera_moves_the_frustum() {
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0).unwrap();
    camera.transform.position = Vec3::new(0.0, 0.0, 50.0);
    camera.update_world_matrix();
    let frustum = camera.frustum();
    assert!(frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 60.0)));
}

#[test]
fn reversed_frustum_culls_like_the_forward_one() {
    let forward = camera_at_origin();
    let mut reversed = camera_at_origin();
    reversed.set_coordinate_system(CoordinateSystem::WebGpu, true);
    for z in [-0.05, -1.0, -50.0, -150.0, 3.0] {
        let point = Vec3::new(0.0, 0.0, z);
        assert_eq!(
            forward.frustum().contains_point(point),
            reversed.frustum().contains_point(point),
            "culling should not depend on depth direction at z = {z}"
        );
    }
}

#[test]
fn orthographic_frustum_is_a_box() {
    let mut camera = Camera::new_orthographic(-2.0, 2.0, 2.0, -2.0, 0.1, 10.0).unwrap();
    camera.update_world_matrix();
    let frustum = Frustum::from_matrix(camera.view_projection_matrix(), CoordinateSystem::WebGpu);
    assert!(frustum.contains_point(Vec3::new(1.9, -1.9, -9.0)));
    assert!(!frustum.contains_point(Vec3::new(2.1, 0.0, -5.0)));
}

// ============================================================================
// Bounding Volume Tests
// ============================================================================

#[test]
fn aabb_transform_encloses_rotated_corners() {
    let aabb = Aabb::from_points([Vec3::splat(-1.0), Vec3::splat(1.0)]);
    let rotated = aabb.transform(&Affine3A::from_rotation_y(std::f32::consts::FRAC_PI_4));
    let half = std::f32::consts::SQRT_2;
    assert!(approx(rotated.max.x, half), "got {:?}", rotated.max);
    assert!(approx(rotated.min.z, -half), "got {:?}", rotated.min);
    assert!(approx(rotated.max.y, 1.0));
}

#[test]
fn sphere_transform_scales_radius_by_largest_axis() {
    let sphere = BoundingSphere {
        center: Vec3::ZERO,
        radius: 1.0,
    };
    let m = Affine3A::from_scale_rotation_translation(
        Vec3::new(1.0, 3.0, 2.0),
        glam::Quat::IDENTITY,
        Vec3::new(0.0, 5.0, 0.0),
    );
    let moved = sphere.transform(&m);
    assert!(approx(moved.radius, 3.0));
    assert!(approx(moved.center.y, 5.0));
}
