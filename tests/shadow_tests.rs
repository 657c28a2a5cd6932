//! Shadow Tests
//!
//! Tests for:
//! - ShadowConfig validation
//! - Directional, spot and point shadow cameras
//! - Shadow map allocation per casting light
//! - Shadow pass scheduling (auto update / needs update)
//! - Rejected shadow type and sampler combinations

use glam::Vec3;

use kiln::errors::{ConfigurationError, KilnError};
use kiln::renderer::core::HeadlessDevice;
use kiln::renderer::info::FramePhase;
use kiln::renderer::lights::ShadowLightKind;
use kiln::renderer::settings::ShadowMapKind;
use kiln::renderer::shadow::{POINT_FACES, directional_view, point_views, spot_view};
use kiln::resources::geometry::Geometry;
use kiln::resources::material::{MapSlot, Material};
use kiln::resources::texture::Texture;
use kiln::scene::light::{Light, LightKind, ShadowConfig};
use kiln::scene::node::Node;
use kiln::scene::transform::Transform;
use kiln::scene::{Camera, Drawable, NodeHandle, Scene};
use kiln::{Assets, Renderer, RendererSettings};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

// ============================================================================
// Shadow Config Tests
// ============================================================================

#[test]
fn default_config_is_valid() {
    assert!(ShadowConfig::default().validate().is_ok());
}

#[test]
fn zero_map_size_is_rejected() {
    let config = ShadowConfig {
        map_size: (0, 512),
        ..ShadowConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigurationError::InvalidShadowConfiguration(_))
    ));
}

#[test]
fn empty_camera_range_is_rejected() {
    let inverted = ShadowConfig {
        near: 10.0,
        far: 1.0,
        ..ShadowConfig::default()
    };
    let zero_near = ShadowConfig {
        near: 0.0,
        ..ShadowConfig::default()
    };
    assert!(inverted.validate().is_err());
    assert!(zero_near.validate().is_err());
}

// ============================================================================
// Shadow Camera Tests
// ============================================================================

#[test]
fn directional_view_is_orthographic_over_the_extent() {
    let config = ShadowConfig {
        ortho_extent: 4.0,
        ..ShadowConfig::default()
    };
    let view = directional_view(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, &config);
    let vp = view.view_projection();

    let edge = vp.project_point3(Vec3::new(4.0, 0.0, 0.0));
    assert!(approx(edge.x.abs(), 1.0), "extent edge should map to the clip edge, got {edge:?}");
    assert!(view.frustum().contains_point(Vec3::new(3.9, 0.0, 3.9)));
    assert!(!view.frustum().contains_point(Vec3::new(4.5, 0.0, 0.0)));
}

#[test]
fn straight_down_view_picks_a_non_parallel_up() {
    let view = directional_view(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, &ShadowConfig::default());
    assert!(
        view.view.is_finite(),
        "looking along the world up axis must not produce NaNs"
    );
}

#[test]
fn spot_view_covers_twice_the_cone_angle() {
    let config = ShadowConfig::default();
    let angle = std::f32::consts::FRAC_PI_8;
    let view = spot_view(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, angle, 0.0, &config);
    let frustum = view.frustum();

    let inside = Vec3::new(5.0 * (angle * 0.9).tan(), 0.0, 0.0);
    let outside = Vec3::new(5.0 * (angle * 1.2).tan(), 0.0, 0.0);
    assert!(frustum.contains_point(inside));
    assert!(!frustum.contains_point(outside));
}

#[test]
fn point_views_tile_a_four_by_two_atlas() {
    let config = ShadowConfig {
        map_size: (64, 32),
        ..ShadowConfig::default()
    };
    let views = point_views(Vec3::ZERO, 0.0, &config);
    for (i, view) in views.iter().enumerate() {
        assert!(approx(view.viewport.x, ((i % 4) * 64) as f32));
        assert!(approx(view.viewport.y, ((i / 4) * 32) as f32));
        assert!(approx(view.viewport.width, 64.0));
        assert!(approx(view.viewport.height, 32.0));
    }
}

#[test]
fn each_point_face_sees_its_own_axis() {
    let views = point_views(Vec3::ZERO, 20.0, &ShadowConfig::default());
    for (i, (forward, _)) in POINT_FACES.iter().enumerate() {
        let point = *forward * 5.0;
        assert!(
            views[i].frustum().contains_point(point),
            "face {i} should contain a point along {forward:?}"
        );
        assert!(!views[i].frustum().contains_point(-point));
    }
}

#[test]
fn point_far_plane_uses_distance_cutoff() {
    let views = point_views(Vec3::ZERO, 10.0, &ShadowConfig::default());
    let frustum = views[0].frustum();
    assert!(frustum.contains_point(Vec3::new(9.0, 0.0, 0.0)));
    assert!(!frustum.contains_point(Vec3::new(11.0, 0.0, 0.0)));
}

// ============================================================================
// Shadow Pass Tests
// ============================================================================

struct ShadowScene {
    renderer: Renderer<HeadlessDevice>,
    scene: Scene,
    assets: Assets,
    camera: Camera,
    light: NodeHandle,
}

fn shadow_scene(light: Light) -> ShadowScene {
    let mut settings = RendererSettings::default();
    settings.shadow_map.enabled = true;
    let renderer = Renderer::with_settings(HeadlessDevice::new(64, 64), settings);

    let mut assets = Assets::new();
    let mut scene = Scene::new();
    let mut caster = Geometry::new_box(1.0, 1.0, 1.0);
    caster.compute_bounding_volumes();
    let mut ground = Geometry::new_plane(10.0, 10.0);
    ground.compute_bounding_volumes();
    let caster = assets.add_geometry(caster);
    let ground = assets.add_geometry(ground);
    let material = assets.add_material(Material::standard());

    scene.add(
        Node::drawable(Drawable::new(caster, material).with_shadows(true, false))
            .with_transform(Transform::from_position(Vec3::new(0.0, 1.0, 0.0))),
    );
    scene.add(Node::drawable(
        Drawable::new(ground, material).with_shadows(false, true),
    ));
    let light = scene.add(
        Node::light(light).with_transform(Transform::from_position(Vec3::new(3.0, 8.0, 3.0))),
    );

    let mut camera = Camera::new_perspective(50.0, 1.0, 0.1, 100.0).unwrap();
    camera.transform.position = Vec3::new(0.0, 2.0, 10.0);

    ShadowScene {
        renderer,
        scene,
        assets,
        camera,
        light,
    }
}

impl ShadowScene {
    fn render(&mut self) -> kiln::Result<kiln::renderer::info::FrameReport> {
        self.renderer
            .render(&mut self.scene, &mut self.assets, &mut self.camera)
    }

    fn light_id(&self) -> kiln::resources::ResourceId {
        self.scene
            .get(self.light)
            .and_then(Node::as_light)
            .map(Light::id)
            .unwrap()
    }
}

#[test]
fn casting_light_gets_a_map_and_a_shadow_phase() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0).with_shadow(ShadowConfig::default()));
    let report = s.render().unwrap();

    assert!(report.phases.contains(&FramePhase::RenderShadows));
    assert_eq!(s.renderer.shadow_maps().len(), 1);
    let map = s.renderer.shadow_maps().map(s.light_id()).unwrap();
    assert_eq!(map.kind, ShadowLightKind::Directional);
    assert_eq!(map.target.size(), (512, 512));
    assert_eq!(map.views.len(), 1);
}

#[test]
fn point_light_map_is_an_atlas() {
    let config = ShadowConfig {
        map_size: (128, 128),
        ..ShadowConfig::default()
    };
    let mut s = shadow_scene(Light::point(Vec3::ONE, 1.0, 0.0).with_shadow(config));
    s.render().unwrap();

    let map = s.renderer.shadow_maps().map(s.light_id()).unwrap();
    assert_eq!(map.kind, ShadowLightKind::Point);
    assert_eq!(map.target.size(), (512, 256));
    assert_eq!(map.views.len(), 6);
}

#[test]
fn disabled_shadows_skip_the_shadow_phase() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0).with_shadow(ShadowConfig::default()));
    s.renderer.settings.shadow_map.enabled = false;
    let report = s.render().unwrap();

    assert!(!report.phases.contains(&FramePhase::RenderShadows));
    assert!(s.renderer.shadow_maps().is_empty());
}

#[test]
fn light_without_shadow_allocates_nothing() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0));
    let report = s.render().unwrap();
    assert!(!report.phases.contains(&FramePhase::RenderShadows));
    assert!(s.renderer.shadow_maps().is_empty());
}

#[test]
fn static_shadows_render_once_until_requested() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0).with_shadow(ShadowConfig::default()));
    s.renderer.settings.shadow_map.auto_update = false;

    let first = s.render().unwrap().info.draw_calls;
    let second = s.render().unwrap().info.draw_calls;
    assert!(second < first, "second frame should reuse the map: {second} vs {first}");

    s.renderer.settings.shadow_map.needs_update = true;
    let third = s.render().unwrap().info.draw_calls;
    assert_eq!(third, first);
    assert!(!s.renderer.settings.shadow_map.needs_update, "the request is consumed");
}

#[test]
fn invalid_shadow_config_fails_the_frame() {
    let config = ShadowConfig {
        map_size: (0, 0),
        ..ShadowConfig::default()
    };
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0).with_shadow(config));
    let err = s.render().unwrap_err();
    assert!(matches!(
        err,
        KilnError::Configuration(ConfigurationError::InvalidShadowConfiguration(_))
    ));
}

#[test]
fn removing_the_light_retires_its_map() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0).with_shadow(ShadowConfig::default()));
    s.render().unwrap();
    assert_eq!(s.renderer.shadow_maps().len(), 1);

    s.scene.remove(s.light);
    s.render().unwrap();
    assert!(s.renderer.shadow_maps().is_empty());
}

#[test]
fn spot_light_target_comes_from_its_kind() {
    let mut light = Light::spot(Vec3::ONE, 1.0, 30.0, 0.5, 0.1).with_shadow(ShadowConfig::default());
    if let LightKind::Spot { target, .. } = &mut light.kind {
        *target = Vec3::new(0.0, 1.0, 0.0);
    }
    let mut s = shadow_scene(light);
    s.render().unwrap();

    let map = s.renderer.shadow_maps().map(s.light_id()).unwrap();
    assert_eq!(map.kind, ShadowLightKind::Spot);
    let target = map.views[0].view.transform_point3(Vec3::new(0.0, 1.0, 0.0));
    assert!(approx(target.x, 0.0) && approx(target.y, 0.0), "target should sit on the view axis, got {target:?}");
}

// ============================================================================
// Shadow Combination Tests
// ============================================================================

fn is_invalid_shadow(result: kiln::Result<kiln::renderer::info::FrameReport>) -> bool {
    matches!(
        result,
        Err(KilnError::Configuration(ConfigurationError::InvalidShadowConfiguration(_)))
    )
}

#[test]
fn variance_maps_reject_point_lights() {
    let mut s = shadow_scene(Light::point(Vec3::ONE, 1.0, 0.0).with_shadow(ShadowConfig::default()));
    s.renderer.settings.shadow_map.kind = ShadowMapKind::Vsm;
    assert!(is_invalid_shadow(s.render()));
    assert!(s.renderer.shadow_maps().is_empty());
}

#[test]
fn variance_maps_accept_directional_lights() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0).with_shadow(ShadowConfig::default()));
    s.renderer.settings.shadow_map.kind = ShadowMapKind::Vsm;
    s.render().unwrap();
    let map = s.renderer.shadow_maps().map(s.light_id()).unwrap();
    assert!(map.is_variance());
}

#[test]
fn compare_sampler_on_a_color_texture_fails_the_frame() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0));
    let mut texture = Texture::solid([255, 255, 255, 255]);
    texture.sampler.compare = Some(wgpu::CompareFunction::LessEqual);
    let texture = s.assets.add_texture(texture);
    let material = s.assets.add_material(Material::basic().with(|d| {
        d.maps.set(MapSlot::Map, Some(texture));
    }));
    let geometry = s.assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
    s.scene.add(Node::drawable(Drawable::new(geometry, material)));

    assert!(is_invalid_shadow(s.render()));
}

#[test]
fn compare_sampler_on_a_render_target_is_rejected() {
    let mut s = shadow_scene(Light::directional(Vec3::ONE, 1.0));
    let mut target = kiln::RenderTarget::new(16, 16);
    target.sampler.compare = Some(wgpu::CompareFunction::Less);
    let target = s.assets.add_render_target(target);
    s.renderer.set_render_target(Some(target));

    assert!(is_invalid_shadow(s.render()));
}
