//! Render List Tests
//!
//! Tests for:
//! - Bucket selection (opaque / transmissive / transparent)
//! - Opaque front-to-back and blended back-to-front ordering
//! - Render order and group order precedence
//! - Stable ordering, material grouping and repeatable builds
//! - Multi-material geometry groups
//! - Layer tests, override materials and hidden materials
//! - Light collection

use glam::Vec3;

use kiln::assets::{Assets, GeometryHandle, MaterialHandle};
use kiln::renderer::lists::{Bucket, ListBuilder, RenderItem};
use kiln::resources::geometry::Geometry;
use kiln::resources::material::{Material, MaterialKind};
use kiln::scene::camera::Camera;
use kiln::scene::layers::Layers;
use kiln::scene::light::Light;
use kiln::scene::node::{Node, NodeKind};
use kiln::scene::transform::Transform;
use kiln::scene::{Drawable, NodeHandle, Scene};

struct Fixture {
    assets: Assets,
    scene: Scene,
    camera: Camera,
    geometry: GeometryHandle,
}

impl Fixture {
    fn new() -> Self {
        let mut assets = Assets::new();
        let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
        geometry.compute_bounding_volumes();
        let geometry = assets.add_geometry(geometry);

        let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0).unwrap();
        camera.transform.position = Vec3::new(0.0, 0.0, 10.0);
        camera.update_world_matrix();

        Self {
            assets,
            scene: Scene::new(),
            camera,
            geometry,
        }
    }

    fn material(&mut self, material: Material) -> MaterialHandle {
        self.assets.add_material(material)
    }

    fn mesh_at(&mut self, material: MaterialHandle, z: f32) -> NodeHandle {
        self.scene.add(
            Node::drawable(Drawable::new(self.geometry, material))
                .with_transform(Transform::from_position(Vec3::new(0.0, 0.0, z))),
        )
    }

    fn build(&mut self) -> ListBuilder {
        self.scene.update_world_matrices();
        let mut builder = ListBuilder::new();
        builder.build(&self.scene, &self.assets, &self.camera, true);
        builder
    }
}

fn nodes(builder: &ListBuilder, bucket: Bucket) -> Vec<NodeHandle> {
    builder.list.bucket(bucket).map(|item| item.node).collect()
}

fn transparent() -> Material {
    Material::basic().with(|d| d.settings.transparent = true)
}

fn transmissive() -> Material {
    Material::physical().with(|d| {
        if let MaterialKind::Physical(params) = &mut d.kind {
            params.transmission = 1.0;
        }
    })
}

// ============================================================================
// Bucket Tests
// ============================================================================

#[test]
fn transparent_material_lands_in_transparent_bucket_regardless_of_render_order() {
    let mut fx = Fixture::new();
    let material = fx.material(transparent());
    for order in [-10, 0, 10] {
        fx.scene.add(Node::drawable(
            Drawable::new(fx.geometry, material).with_render_order(order),
        ));
    }
    let builder = fx.build();

    assert_eq!(builder.list.bucket(Bucket::Transparent).len(), 3);
    assert_eq!(builder.list.bucket(Bucket::Opaque).len(), 0);
    assert_eq!(builder.list.bucket(Bucket::Transmissive).len(), 0);
}

#[test]
fn transmission_wins_over_transparency() {
    let material = transmissive().with(|d| d.settings.transparent = true);
    assert_eq!(Bucket::of(&material), Bucket::Transmissive);
    assert_eq!(Bucket::of(&transparent()), Bucket::Transparent);
    assert_eq!(Bucket::of(&Material::standard()), Bucket::Opaque);
    assert_eq!(Bucket::of(&Material::physical()), Bucket::Opaque);
}

#[test]
fn buckets_partition_the_visible_items() {
    let mut fx = Fixture::new();
    let opaque = fx.material(Material::lambert());
    let blended = fx.material(transparent());
    let glass = fx.material(transmissive());
    fx.mesh_at(opaque, 0.0);
    fx.mesh_at(blended, 0.0);
    fx.mesh_at(glass, 0.0);
    fx.mesh_at(opaque, -2.0);
    let builder = fx.build();

    assert_eq!(builder.list.len(), 4);
    assert_eq!(builder.list.bucket(Bucket::Opaque).len(), 2);
    assert_eq!(builder.list.bucket(Bucket::Transmissive).len(), 1);
    assert_eq!(builder.list.bucket(Bucket::Transparent).len(), 1);
}

// ============================================================================
// Ordering Tests
// ============================================================================

#[test]
fn opaque_items_of_one_material_sort_front_to_back() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let far = fx.mesh_at(material, -20.0);
    let near = fx.mesh_at(material, 5.0);
    let middle = fx.mesh_at(material, 0.0);
    let builder = fx.build();

    assert_eq!(nodes(&builder, Bucket::Opaque), vec![near, middle, far]);
}

#[test]
fn transparent_items_sort_back_to_front() {
    let mut fx = Fixture::new();
    let material = fx.material(transparent());
    let near = fx.mesh_at(material, 5.0);
    let far = fx.mesh_at(material, -20.0);
    let middle = fx.mesh_at(material, 0.0);
    let builder = fx.build();

    assert_eq!(nodes(&builder, Bucket::Transparent), vec![far, middle, near]);
}

#[test]
fn render_order_dominates_depth() {
    let mut fx = Fixture::new();
    let material = fx.material(transparent());
    let near_first = fx.scene.add(
        Node::drawable(Drawable::new(fx.geometry, material).with_render_order(-1))
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.0, 5.0))),
    );
    let far = fx.mesh_at(material, -20.0);
    let builder = fx.build();

    assert_eq!(nodes(&builder, Bucket::Transparent), vec![near_first, far]);
}

#[test]
fn group_order_sorts_subtrees_as_blocks() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let late = fx.scene.add(Node::new(NodeKind::Group { group_order: 5 }));
    let late_near = fx.scene.add_child(
        late,
        Node::drawable(Drawable::new(fx.geometry, material))
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.0, 5.0))),
    );
    let early_far = fx.mesh_at(material, -20.0);
    let builder = fx.build();

    assert_eq!(nodes(&builder, Bucket::Opaque), vec![early_far, late_near]);
    let items: Vec<RenderItem> = builder.list.bucket(Bucket::Opaque).copied().collect();
    assert_eq!(items[1].group_order, 5);
}

#[test]
fn equal_keys_keep_insertion_order() {
    let mut fx = Fixture::new();
    let solid = fx.material(Material::basic());
    let blended = fx.material(transparent());
    let opaque: Vec<NodeHandle> = (0..4).map(|_| fx.mesh_at(solid, 0.0)).collect();
    let transparent: Vec<NodeHandle> = (0..4).map(|_| fx.mesh_at(blended, 0.0)).collect();
    let builder = fx.build();

    assert_eq!(nodes(&builder, Bucket::Opaque), opaque);
    assert_eq!(nodes(&builder, Bucket::Transparent), transparent);
}

#[test]
fn interleaved_materials_are_grouped() {
    let mut fx = Fixture::new();
    let a = fx.material(Material::basic());
    let b = fx.material(Material::lambert());
    for material in [a, b, a, b] {
        fx.mesh_at(material, 0.0);
    }
    let builder = fx.build();

    let ids: Vec<_> = builder
        .list
        .bucket(Bucket::Opaque)
        .map(|item| item.material_id)
        .collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[2], ids[3]);
    assert_ne!(ids[1], ids[2]);
}

#[test]
fn repeated_builds_are_identical() {
    let mut fx = Fixture::new();
    let solid = fx.material(Material::standard());
    let blended = fx.material(transparent());
    let glass = fx.material(transmissive());
    for (i, material) in [solid, blended, glass, solid, blended].into_iter().enumerate() {
        fx.mesh_at(material, -(i as f32));
    }

    let first = fx.build();
    let second = fx.build();
    for bucket in [Bucket::Opaque, Bucket::Transmissive, Bucket::Transparent] {
        assert_eq!(nodes(&first, bucket), nodes(&second, bucket), "{bucket:?}");
    }
}

#[test]
fn unsorted_build_keeps_traversal_order() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let far = fx.mesh_at(material, -20.0);
    let near = fx.mesh_at(material, 5.0);
    fx.scene.update_world_matrices();

    let mut builder = ListBuilder::new();
    builder.build(&fx.scene, &fx.assets, &fx.camera, false);
    assert_eq!(nodes(&builder, Bucket::Opaque), vec![far, near]);
}

#[test]
fn depth_is_measured_along_the_view_axis() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    fx.mesh_at(material, 4.0);
    let builder = fx.build();
    let item = builder.list.bucket(Bucket::Opaque).next().copied().unwrap();
    assert!((item.depth - 6.0).abs() < 1e-4, "got depth {}", item.depth);
}

// ============================================================================
// Traversal Tests
// ============================================================================

#[test]
fn multi_material_geometry_emits_one_item_per_group() {
    let mut fx = Fixture::new();
    let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
    geometry.compute_bounding_volumes();
    geometry.add_group(0, 18, 0).add_group(18, 18, 1);
    let geometry = fx.assets.add_geometry(geometry);
    let solid = fx.material(Material::basic());
    let glassy = fx.material(transparent());
    fx.scene
        .add(Node::drawable(Drawable::multi(geometry, &[solid, glassy])));
    let builder = fx.build();

    let opaque: Vec<RenderItem> = builder.list.bucket(Bucket::Opaque).copied().collect();
    let blended: Vec<RenderItem> = builder.list.bucket(Bucket::Transparent).copied().collect();
    assert_eq!(opaque.len(), 1);
    assert_eq!(blended.len(), 1);
    assert_eq!(opaque[0].group.map(|g| g.start), Some(0));
    assert_eq!(blended[0].group.map(|g| g.start), Some(18));
}

#[test]
fn failed_layer_test_skips_only_the_node() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let mut parent = Node::drawable(Drawable::new(fx.geometry, material));
    parent.layers = Layers::only(3);
    let parent = fx.scene.add(parent);
    let child = fx
        .scene
        .add_child(parent, Node::drawable(Drawable::new(fx.geometry, material)));
    let builder = fx.build();

    assert_eq!(nodes(&builder, Bucket::Opaque), vec![child]);
}

#[test]
fn camera_layers_select_nodes() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let mut node = Node::drawable(Drawable::new(fx.geometry, material));
    node.layers = Layers::only(2);
    fx.scene.add(node);

    assert!(fx.build().list.is_empty());
    fx.camera.layers.enable(2);
    assert_eq!(fx.build().list.len(), 1);
}

#[test]
fn override_material_replaces_every_material() {
    let mut fx = Fixture::new();
    let own = fx.material(Material::basic());
    let replacement = fx.material(transparent());
    fx.mesh_at(own, 0.0);
    fx.mesh_at(own, -1.0);
    fx.scene.override_material = Some(replacement);
    let builder = fx.build();

    assert_eq!(builder.list.bucket(Bucket::Transparent).len(), 2);
    assert!(
        builder
            .list
            .bucket(Bucket::Transparent)
            .all(|item| item.material == replacement)
    );
}

#[test]
fn hidden_materials_are_skipped() {
    let mut fx = Fixture::new();
    let hidden = fx.material(Material::basic().with(|d| d.settings.visible = false));
    fx.mesh_at(hidden, 0.0);
    assert!(fx.build().list.is_empty());
}

#[test]
fn disabled_culling_keeps_off_screen_drawables() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let behind = fx.mesh_at(material, 50.0);
    if let Some(d) = fx.scene.get_mut(behind).and_then(Node::as_drawable_mut) {
        d.frustum_culled = false;
    }
    let builder = fx.build();
    assert_eq!(builder.list.len(), 1);
    assert_eq!(builder.culled(), 0);
}

#[test]
fn lights_are_collected_with_the_drawables() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::standard());
    fx.mesh_at(material, 0.0);
    let sun = fx
        .scene
        .add(Node::light(Light::directional(Vec3::ONE, 1.0)));
    let builder = fx.build();

    assert_eq!(builder.lights, vec![sun]);
    assert_eq!(builder.list.len(), 1);
}

#[test]
fn rebuilding_clears_the_previous_frame() {
    let mut fx = Fixture::new();
    let material = fx.material(Material::basic());
    let node = fx.mesh_at(material, 0.0);
    let mut builder = ListBuilder::new();
    fx.scene.update_world_matrices();
    builder.build(&fx.scene, &fx.assets, &fx.camera, true);
    assert_eq!(builder.list.len(), 1);

    fx.scene.remove(node);
    builder.build(&fx.scene, &fx.assets, &fx.camera, true);
    assert!(builder.list.is_empty());
}
