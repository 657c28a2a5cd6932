//! Render list building.
//!
//! [`ListBuilder::build`] walks the scene once per camera and sorts every
//! visible drawable into one of three buckets:
//!
//! - opaque: front to back, grouped by material
//! - transmissive: materials with positive transmission, back to front
//! - transparent: blended materials, back to front
//!
//! Lights that pass the layer test are collected alongside. Items live in
//! a pooled vector reused across frames.

use std::cmp::Ordering;

use glam::{Mat4, Vec3};

use crate::assets::{Assets, GeometryHandle, MaterialHandle};
use crate::resources::geometry::GeometryGroup;
use crate::resources::material::Material;
use crate::resources::version_tracker::ResourceId;
use crate::scene::camera::{Camera, Frustum};
use crate::scene::layers::Layers;
use crate::scene::node::NodeKind;
use crate::scene::{Drawable, NodeHandle, Scene};

/// One draw: a drawable, or one geometry group of a multi-material drawable.
#[derive(Debug, Clone, Copy)]
pub struct RenderItem {
    pub node: NodeHandle,
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    /// `None` draws the geometry's whole draw range.
    pub group: Option<GeometryGroup>,
    pub group_order: i32,
    pub render_order: i32,
    /// View-space distance along the camera's forward axis.
    pub depth: f32,
    pub material_id: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Opaque,
    Transmissive,
    Transparent,
}

impl Bucket {
    /// Bucket of a material: transmission wins over blending.
    #[must_use]
    pub fn of(material: &Material) -> Self {
        if material.is_transmissive() {
            Self::Transmissive
        } else if material.settings().transparent {
            Self::Transparent
        } else {
            Self::Opaque
        }
    }
}

/// Bucketed draw items of one camera.
#[derive(Debug, Default)]
pub struct RenderList {
    items: Vec<RenderItem>,
    opaque: Vec<usize>,
    transmissive: Vec<usize>,
    transparent: Vec<usize>,
}

impl RenderList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the buckets, keeping their allocations.
    pub fn clear(&mut self) {
        self.items.clear();
        self.opaque.clear();
        self.transmissive.clear();
        self.transparent.clear();
    }

    pub fn push(&mut self, item: RenderItem, bucket: Bucket) {
        let index = self.items.len();
        self.items.push(item);
        match bucket {
            Bucket::Opaque => self.opaque.push(index),
            Bucket::Transmissive => self.transmissive.push(index),
            Bucket::Transparent => self.transparent.push(index),
        }
    }

    /// Stable sort of every bucket.
    pub fn sort(&mut self) {
        let items = &self.items;
        self.opaque
            .sort_by(|&a, &b| opaque_order(&items[a], &items[b]));
        self.transmissive
            .sort_by(|&a, &b| blended_order(&items[a], &items[b]));
        self.transparent
            .sort_by(|&a, &b| blended_order(&items[a], &items[b]));
    }

    pub fn bucket(&self, bucket: Bucket) -> impl ExactSizeIterator<Item = &RenderItem> + '_ {
        let indices = match bucket {
            Bucket::Opaque => &self.opaque,
            Bucket::Transmissive => &self.transmissive,
            Bucket::Transparent => &self.transparent,
        };
        indices.iter().map(|&i| &self.items[i])
    }

    /// Copies the items of `bucket` in draw order into `out`.
    pub fn collect_into(&self, bucket: Bucket, out: &mut Vec<RenderItem>) {
        out.clear();
        out.extend(self.bucket(bucket).copied());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// `(group_order, render_order, material, depth ascending)`.
#[must_use]
pub fn opaque_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(a.material_id.cmp(&b.material_id))
        .then(a.depth.total_cmp(&b.depth))
}

/// `(group_order, render_order, depth descending)`.
#[must_use]
pub fn blended_order(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(b.depth.total_cmp(&a.depth))
}

/// Culling and depth inputs of one camera.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext {
    pub frustum: Frustum,
    pub view: Mat4,
    pub layers: Layers,
}

impl ViewContext {
    #[must_use]
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            frustum: camera.frustum(),
            view: camera.view_matrix(),
            layers: camera.layers,
        }
    }

    #[must_use]
    pub fn depth_of(&self, point: Vec3) -> f32 {
        -self.view.transform_point3(point).z
    }
}

/// Builds the render list and light list of a camera.
#[derive(Debug, Default)]
pub struct ListBuilder {
    pub list: RenderList,
    pub lights: Vec<NodeHandle>,
    culled: u32,
}

impl ListBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drawables rejected by the frustum during the last build.
    #[must_use]
    pub fn culled(&self) -> u32 {
        self.culled
    }

    pub fn build(&mut self, scene: &Scene, assets: &Assets, camera: &Camera, sort: bool) {
        self.build_view(scene, assets, &ViewContext::from_camera(camera), sort);
    }

    /// Same as [`Self::build`] for an arbitrary view, such as a shadow camera.
    pub fn build_view(&mut self, scene: &Scene, assets: &Assets, view: &ViewContext, sort: bool) {
        self.list.clear();
        self.lights.clear();
        self.culled = 0;
        for &root in scene.roots() {
            self.project_object(scene, assets, root, view, 0);
        }
        if sort {
            self.list.sort();
        }
    }

    /// Visits `node` and its subtree. Invisible nodes prune their subtree;
    /// a failed layer test skips only the node itself.
    pub fn project_object(
        &mut self,
        scene: &Scene,
        assets: &Assets,
        handle: NodeHandle,
        view: &ViewContext,
        group_order: i32,
    ) {
        let Some(node) = scene.get(handle) else {
            return;
        };
        if !node.visible {
            return;
        }

        let mut group_order = group_order;
        if node.layers.test(view.layers) {
            match &node.kind {
                NodeKind::Group { group_order: order } => {
                    if *order != 0 {
                        group_order = *order;
                    }
                }
                NodeKind::Light(_) => self.lights.push(handle),
                NodeKind::Drawable(drawable) => {
                    self.push_drawable(scene, assets, handle, drawable, view, group_order);
                }
            }
        }

        for &child in node.children() {
            self.project_object(scene, assets, child, view, group_order);
        }
    }

    fn push_drawable(
        &mut self,
        scene: &Scene,
        assets: &Assets,
        handle: NodeHandle,
        drawable: &Drawable,
        view: &ViewContext,
        group_order: i32,
    ) {
        let Some(node) = scene.get(handle) else {
            return;
        };
        let Some(geometry) = assets.geometries.get(drawable.geometry) else {
            return;
        };
        let world = node.world_matrix();

        // Instanced drawables spread past the geometry bounds.
        if drawable.frustum_culled && drawable.instances.is_none() {
            let outside = match (geometry.bounding_sphere(), geometry.bounding_box()) {
                (Some(sphere), aabb) => {
                    !view.frustum.intersects_sphere(&sphere.transform(world))
                        || aabb.is_some_and(|b| !view.frustum.intersects_box(&b.transform(world)))
                }
                (None, Some(aabb)) => !view.frustum.intersects_box(&aabb.transform(world)),
                (None, None) => false,
            };
            if outside {
                self.culled += 1;
                return;
            }
        }

        let center = geometry
            .bounding_sphere()
            .map_or_else(|| world.translation.into(), |s| world.transform_point3(s.center));
        let depth = view.depth_of(center);

        let push = |list: &mut RenderList, material: MaterialHandle, group: Option<GeometryGroup>| {
            let Some(m) = assets.materials.get(material) else {
                return;
            };
            if !m.settings().visible {
                return;
            }
            list.push(
                RenderItem {
                    node: handle,
                    geometry: drawable.geometry,
                    material,
                    group,
                    group_order,
                    render_order: drawable.render_order,
                    depth,
                    material_id: m.id(),
                },
                Bucket::of(m),
            );
        };

        if let Some(override_material) = scene.override_material {
            push(&mut self.list, override_material, None);
        } else if drawable.is_multi_material() && !geometry.groups.is_empty() {
            for group in &geometry.groups {
                if let Some(&material) = drawable.materials.get(group.material_index) {
                    push(&mut self.list, material, Some(*group));
                }
            }
        } else if let Some(&material) = drawable.materials.first() {
            push(&mut self.list, material, None);
        }
    }
}
