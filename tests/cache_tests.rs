//! Cache Tests
//!
//! Tests for:
//! - Geometry buffers shared between drawables
//! - Texture upload, re-upload and disposal through the renderer
//! - Attribute version bumps and full re-uploads
//! - Cloned resources owning separate device objects

use kiln::assets::{GeometryHandle, TextureHandle};
use kiln::renderer::core::{DeviceCall, HeadlessDevice};
use kiln::resources::material::MapSlot;
use kiln::resources::texture::Texture;
use kiln::scene::Drawable;
use kiln::{Assets, Camera, Geometry, Material, Node, Renderer, Scene};

struct Setup {
    renderer: Renderer<HeadlessDevice>,
    scene: Scene,
    assets: Assets,
    camera: Camera,
    geometry: GeometryHandle,
}

fn setup() -> Setup {
    let mut assets = Assets::new();
    let geometry = assets.add_geometry(Geometry::new_box(1.0, 1.0, 1.0));
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0).unwrap();
    camera.transform.position.z = 5.0;
    Setup {
        renderer: Renderer::new(HeadlessDevice::new(16, 16)),
        scene: Scene::new(),
        assets,
        camera,
        geometry,
    }
}

impl Setup {
    fn render(&mut self) {
        self.renderer
            .render(&mut self.scene, &mut self.assets, &mut self.camera)
            .unwrap();
    }

    fn textured(&mut self, texture: TextureHandle) {
        let material = self.assets.add_material(Material::basic().with(|d| {
            d.maps.set(MapSlot::Map, Some(texture));
        }));
        self.scene
            .add(Node::drawable(Drawable::new(self.geometry, material)));
    }

    fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.renderer.device().count_calls(predicate)
    }
}

fn buffer_creates(s: &Setup) -> usize {
    s.count(|c| matches!(c, DeviceCall::CreateBuffer { .. }))
}

fn texture_creates(s: &Setup) -> usize {
    s.count(|c| matches!(c, DeviceCall::CreateTexture { .. }))
}

fn texture_writes(s: &Setup) -> usize {
    s.count(|c| matches!(c, DeviceCall::WriteTexture { .. }))
}

// ============================================================================
// Geometry Cache Tests
// ============================================================================

#[test]
fn shared_geometry_creates_its_buffers_once() {
    let mut single = setup();
    let material = single.assets.add_material(Material::basic());
    single
        .scene
        .add(Node::drawable(Drawable::new(single.geometry, material)));
    single.render();

    let mut shared = setup();
    let material = shared.assets.add_material(Material::basic());
    for _ in 0..3 {
        shared
            .scene
            .add(Node::drawable(Drawable::new(shared.geometry, material)));
    }
    shared.render();

    assert!(buffer_creates(&single) > 0);
    assert_eq!(buffer_creates(&shared), buffer_creates(&single));
    assert_eq!(shared.renderer.info().geometries, 1);
}

#[test]
fn cloned_geometry_gets_its_own_buffers() {
    let mut single = setup();
    let material = single.assets.add_material(Material::basic());
    single
        .scene
        .add(Node::drawable(Drawable::new(single.geometry, material)));
    single.render();

    let mut cloned = setup();
    let mut copy = cloned.assets.geometries[cloned.geometry].clone();
    if let Some(position) = copy.attribute_mut(Geometry::POSITION) {
        position.write(0, &[[0.5f32, 0.5, 0.5]]);
    }
    let copy = cloned.assets.add_geometry(copy);
    let material = cloned.assets.add_material(Material::basic());
    for geometry in [cloned.geometry, copy] {
        cloned
            .scene
            .add(Node::drawable(Drawable::new(geometry, material)));
    }
    cloned.render();

    assert_eq!(buffer_creates(&cloned), 2 * buffer_creates(&single));
    assert_eq!(cloned.renderer.info().geometries, 2);
}

#[test]
fn full_reupload_reuses_the_device_buffer() {
    let mut s = setup();
    let material = s.assets.add_material(Material::basic());
    s.scene.add(Node::drawable(Drawable::new(s.geometry, material)));
    s.render();
    let bytes = s.assets.geometries[s.geometry]
        .attribute(Geometry::POSITION)
        .map(|a| a.bytes().len())
        .unwrap();

    s.renderer.device_mut().clear_calls();
    if let Some(position) = s.assets.geometries[s.geometry].attribute_mut(Geometry::POSITION) {
        position.needs_update();
    }
    s.render();

    assert_eq!(buffer_creates(&s), 0);
    let writes: Vec<usize> = s
        .renderer
        .device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::WriteBuffer { bytes, .. } => Some(*bytes),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![bytes]);
}

// ============================================================================
// Texture Cache Tests
// ============================================================================

#[test]
fn texture_shared_by_materials_uploads_once() {
    let mut s = setup();
    let texture = s.assets.add_texture(Texture::solid([255, 128, 0, 255]));
    s.textured(texture);
    s.textured(texture);
    s.render();
    s.render();

    assert_eq!(texture_creates(&s), 1);
    assert_eq!(texture_writes(&s), 1);
}

#[test]
fn cloned_texture_uploads_separately() {
    let mut s = setup();
    let texture = Texture::solid([255, 255, 255, 255]);
    let copy = s.assets.add_texture(texture.clone());
    let texture = s.assets.add_texture(texture);
    s.textured(texture);
    s.textured(copy);
    s.render();

    assert_eq!(texture_creates(&s), 2);
}

#[test]
fn each_draw_binds_its_textures_from_unit_zero() {
    let mut s = setup();
    let red = s.assets.add_texture(Texture::solid([255, 0, 0, 255]));
    let blue = s.assets.add_texture(Texture::solid([0, 0, 255, 255]));
    s.textured(red);
    s.textured(blue);
    s.render();

    let units: Vec<u32> = s
        .renderer
        .device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::BindTexture {
                unit,
                texture: Some(_),
            } => Some(*unit),
            _ => None,
        })
        .collect();
    assert_eq!(units, vec![0, 0]);
}

#[test]
fn edited_texture_is_rewritten_in_place() {
    let mut s = setup();
    let texture = s.assets.add_texture(Texture::solid([0, 0, 0, 255]));
    s.textured(texture);
    s.render();

    s.renderer.device_mut().clear_calls();
    if let Some(mut image) = s.assets.textures[texture].image_mut() {
        image.data[0] = 255;
    }
    s.render();

    assert_eq!(texture_creates(&s), 0);
    assert_eq!(texture_writes(&s), 1);
}

#[test]
fn removed_texture_is_destroyed() {
    let mut s = setup();
    let texture = s.assets.add_texture(Texture::solid([9, 9, 9, 255]));
    s.textured(texture);
    s.render();
    let live = s.renderer.device().live_textures();

    for material in s.assets.materials.values_mut() {
        material.edit().maps.set(MapSlot::Map, None);
    }
    s.assets.remove_texture(texture);
    s.render();

    assert_eq!(
        s.count(|c| matches!(c, DeviceCall::DestroyTexture(_))),
        1
    );
    assert_eq!(s.renderer.device().live_textures(), live - 1);
}
