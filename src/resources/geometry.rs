//! Geometry: named attribute streams, optional index, draw groups and
//! cached bounding volumes.

use glam::{Affine3A, Mat4, Vec3};
use rustc_hash::FxHashMap;

use super::buffer::BufferAttribute;
use super::version_tracker::{ChangeTracker, ResourceId};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[must_use]
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |mut b, p| {
            b.min = b.min.min(p);
            b.max = b.max.max(p);
            b
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Box enclosing this box after `m` is applied.
    #[must_use]
    pub fn transform(&self, m: &Affine3A) -> Self {
        if self.is_empty() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        Self::from_points(corners.into_iter().map(|c| m.transform_point3(c)))
    }
}

/// Bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere after `m` is applied; the radius scales by the largest axis
    /// scale so non-uniform scaling stays conservative.
    #[must_use]
    pub fn transform(&self, m: &Affine3A) -> Self {
        let mat = Mat4::from(*m);
        let scale = mat
            .x_axis
            .truncate()
            .length_squared()
            .max(mat.y_axis.truncate().length_squared())
            .max(mat.z_axis.truncate().length_squared())
            .sqrt();
        Self {
            center: m.transform_point3(self.center),
            radius: self.radius * scale,
        }
    }
}

/// A contiguous range of the index (or vertex) stream drawn with one
/// material of a multi-material drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

/// Sub-range of the stream to draw; `count: None` draws to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    pub start: u32,
    pub count: Option<u32>,
}

/// Cloning yields a new geometry whose attributes are new resources too.
#[derive(Debug)]
pub struct Geometry {
    id: ResourceId,
    pub name: String,
    attributes: FxHashMap<String, BufferAttribute>,
    morph_attributes: FxHashMap<String, Vec<BufferAttribute>>,
    /// Morph deltas are relative to the base attribute.
    pub morph_targets_relative: bool,
    index: Option<BufferAttribute>,
    pub groups: Vec<GeometryGroup>,
    pub draw_range: DrawRange,
    bounding_box: Option<Aabb>,
    bounding_sphere: Option<BoundingSphere>,
    /// Bumped when the attribute set changes (not when attribute data does).
    layout: ChangeTracker,
}

impl Clone for Geometry {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            morph_attributes: self.morph_attributes.clone(),
            morph_targets_relative: self.morph_targets_relative,
            index: self.index.clone(),
            groups: self.groups.clone(),
            draw_range: self.draw_range,
            bounding_box: self.bounding_box,
            bounding_sphere: self.bounding_sphere,
            layout: ChangeTracker::new(),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    pub const POSITION: &'static str = "position";
    pub const NORMAL: &'static str = "normal";
    pub const UV: &'static str = "uv";
    pub const UV1: &'static str = "uv1";
    pub const COLOR: &'static str = "color";
    pub const TANGENT: &'static str = "tangent";
    pub const SKIN_INDEX: &'static str = "skin_index";
    pub const SKIN_WEIGHT: &'static str = "skin_weight";

    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ResourceId::next(),
            name: String::new(),
            attributes: FxHashMap::default(),
            morph_attributes: FxHashMap::default(),
            morph_targets_relative: true,
            index: None,
            groups: Vec::new(),
            draw_range: DrawRange::default(),
            bounding_box: None,
            bounding_sphere: None,
            layout: ChangeTracker::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Version of the attribute set.
    #[inline]
    #[must_use]
    pub fn layout_version(&self) -> u64 {
        self.layout.version()
    }

    /// Inserts or replaces an attribute. Setting `position` recomputes the
    /// bounding volumes.
    pub fn set_attribute(&mut self, name: &str, attribute: BufferAttribute) -> &mut Self {
        self.attributes.insert(name.to_owned(), attribute);
        if name == Self::POSITION {
            self.compute_bounding_volumes();
        }
        self.layout.changed();
        self
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<BufferAttribute> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.layout.changed();
        }
        removed
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.attributes.get(name)
    }

    /// Mutable access to an attribute's data. Call
    /// [`Geometry::compute_bounding_volumes`] after moving positions.
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut BufferAttribute> {
        self.attributes.get_mut(name)
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &BufferAttribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = (&str, &mut BufferAttribute)> {
        self.attributes.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_index(&mut self, index: BufferAttribute) -> &mut Self {
        self.index = Some(index);
        self.layout.changed();
        self
    }

    #[must_use]
    pub fn index(&self) -> Option<&BufferAttribute> {
        self.index.as_ref()
    }

    pub fn index_mut(&mut self) -> Option<&mut BufferAttribute> {
        self.index.as_mut()
    }

    /// Appends a morph target stream for `name` (`position`, `normal` or
    /// `color`).
    pub fn push_morph_attribute(&mut self, name: &str, attribute: BufferAttribute) -> &mut Self {
        self.morph_attributes
            .entry(name.to_owned())
            .or_default()
            .push(attribute);
        self.layout.changed();
        self
    }

    #[must_use]
    pub fn morph_attributes(&self, name: &str) -> &[BufferAttribute] {
        self.morph_attributes.get(name).map_or(&[], Vec::as_slice)
    }

    /// Every morph stream list, keyed by base attribute name.
    pub fn morph_streams(&self) -> impl Iterator<Item = (&str, &[BufferAttribute])> {
        self.morph_attributes
            .iter()
            .map(|(name, list)| (name.as_str(), list.as_slice()))
    }

    pub fn morph_attribute_mut(&mut self, name: &str, target: usize) -> Option<&mut BufferAttribute> {
        self.morph_attributes.get_mut(name)?.get_mut(target)
    }

    pub fn morph_attributes_mut(&mut self) -> impl Iterator<Item = &mut BufferAttribute> {
        self.morph_attributes.values_mut().flatten()
    }

    /// Number of morph targets (the longest morph stream list).
    #[must_use]
    pub fn morph_target_count(&self) -> usize {
        self.morph_attributes.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn add_group(&mut self, start: u32, count: u32, material_index: usize) -> &mut Self {
        self.groups.push(GeometryGroup {
            start,
            count,
            material_index,
        });
        self
    }

    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }

    /// Element count drawn when no group or draw range narrows it down.
    #[must_use]
    pub fn element_count(&self) -> u32 {
        match &self.index {
            Some(index) => index.count(),
            None => self.attribute(Self::POSITION).map_or(0, BufferAttribute::count),
        }
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<&Aabb> {
        self.bounding_box.as_ref()
    }

    #[must_use]
    pub fn bounding_sphere(&self) -> Option<&BoundingSphere> {
        self.bounding_sphere.as_ref()
    }

    /// Recomputes box and sphere from the `position` stream. Positions must
    /// be `Float32x3`; other formats clear the volumes (the drawable is then
    /// never frustum culled).
    pub fn compute_bounding_volumes(&mut self) {
        let Some(position) = self.attributes.get(Self::POSITION) else {
            self.bounding_box = None;
            self.bounding_sphere = None;
            return;
        };
        if position.format()
            != super::buffer::ElementFormat::Vertex(wgpu::VertexFormat::Float32x3)
        {
            self.bounding_box = None;
            self.bounding_sphere = None;
            return;
        }
        let points: Vec<Vec3> = (0..position.count() as usize)
            .filter_map(|i| position.element::<[f32; 3]>(i).map(Vec3::from))
            .collect();
        let aabb = Aabb::from_points(points.iter().copied());
        if aabb.is_empty() {
            self.bounding_box = None;
            self.bounding_sphere = None;
            return;
        }
        let center = aabb.center();
        let radius = points
            .iter()
            .map(|p| p.distance_squared(center))
            .fold(0.0f32, f32::max)
            .sqrt();
        self.bounding_box = Some(aabb);
        self.bounding_sphere = Some(BoundingSphere { center, radius });
    }

    // ========================================================================
    // Primitive builders
    // ========================================================================

    /// Axis-aligned box centred on the origin with normals and uvs.
    #[must_use]
    pub fn new_box(width: f32, height: f32, depth: f32) -> Self {
        let (hx, hy, hz) = (width * 0.5, height * 0.5, depth * 0.5);
        // (normal, u axis, v axis)
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let half = Vec3::new(hx, hy, hz);
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (n, u, v) in faces {
            let base = positions.len() as u16;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * su + v * sv) * half;
                positions.push(p.to_array());
                normals.push(n.to_array());
                uvs.push([(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        let mut geometry = Self::new();
        geometry
            .set_attribute(
                Self::POSITION,
                BufferAttribute::new(&positions, wgpu::VertexFormat::Float32x3),
            )
            .set_attribute(
                Self::NORMAL,
                BufferAttribute::new(&normals, wgpu::VertexFormat::Float32x3),
            )
            .set_attribute(Self::UV, BufferAttribute::new(&uvs, wgpu::VertexFormat::Float32x2))
            .set_index(BufferAttribute::index_u16(&indices));
        geometry
    }

    /// Unit quad in the XY plane, facing +Z.
    #[must_use]
    pub fn new_plane(width: f32, height: f32) -> Self {
        let (hx, hy) = (width * 0.5, height * 0.5);
        let positions = [[-hx, -hy, 0.0], [hx, -hy, 0.0], [hx, hy, 0.0], [-hx, hy, 0.0]];
        let normals = [[0.0f32, 0.0, 1.0]; 4];
        let uvs = [[0.0f32, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        let mut geometry = Self::new();
        geometry
            .set_attribute(
                Self::POSITION,
                BufferAttribute::new(&positions, wgpu::VertexFormat::Float32x3),
            )
            .set_attribute(
                Self::NORMAL,
                BufferAttribute::new(&normals, wgpu::VertexFormat::Float32x3),
            )
            .set_attribute(Self::UV, BufferAttribute::new(&uvs, wgpu::VertexFormat::Float32x2))
            .set_index(BufferAttribute::index_u16(&[0, 1, 2, 0, 2, 3]));
        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_gets_fresh_ids_for_itself_and_its_streams() {
        let g = Geometry::new_box(1.0, 1.0, 1.0);
        let copy = g.clone();
        assert_ne!(copy.id(), g.id());
        let ids = |geometry: &Geometry| {
            let position = geometry.attribute(Geometry::POSITION).map(BufferAttribute::id);
            let index = geometry.index().map(BufferAttribute::id);
            (position, index)
        };
        let (position, index) = ids(&g);
        let (copy_position, copy_index) = ids(&copy);
        assert_ne!(position, copy_position);
        assert_ne!(index, copy_index);
        assert_eq!(copy.element_count(), g.element_count());
    }

    #[test]
    fn box_bounds_cover_extents() {
        let g = Geometry::new_box(2.0, 4.0, 6.0);
        let aabb = g.bounding_box().copied().unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
        let sphere = g.bounding_sphere().copied().unwrap();
        assert!((sphere.radius - Vec3::new(1.0, 2.0, 3.0).length()).abs() < 1e-5);
        assert_eq!(g.element_count(), 36);
    }

    #[test]
    fn layout_version_tracks_attribute_set_only() {
        let mut g = Geometry::new_plane(1.0, 1.0);
        let v = g.layout_version();
        g.attribute_mut(Geometry::POSITION)
            .unwrap()
            .write(0, &[[0.0f32, 0.0, 0.0]]);
        assert_eq!(g.layout_version(), v);
        g.set_attribute(
            Geometry::COLOR,
            BufferAttribute::new(&[[1.0f32; 3]; 4], wgpu::VertexFormat::Float32x3),
        );
        assert_eq!(g.layout_version(), v + 1);
    }
}
