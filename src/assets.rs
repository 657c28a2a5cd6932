//! Asset storage.
//!
//! Geometries, materials, textures and render targets live in slot maps
//! and are referenced from the scene by handle. Removing an asset queues a
//! [`Disposal`] that the renderer drains at the start of its next frame to
//! free the matching device resources.

use slotmap::{SlotMap, new_key_type};

use crate::resources::{Geometry, Material, RenderTarget, ResourceId, Texture};

new_key_type! {
    /// Handle to a [`Geometry`] in [`Assets`].
    pub struct GeometryHandle;
    /// Handle to a [`Material`] in [`Assets`].
    pub struct MaterialHandle;
    /// Handle to a [`Texture`] in [`Assets`].
    pub struct TextureHandle;
    /// Handle to a [`RenderTarget`] in [`Assets`].
    pub struct RenderTargetHandle;
}

/// A removed asset whose device resources must be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposal {
    Geometry(ResourceId),
    Material(ResourceId),
    Texture(ResourceId),
    RenderTarget(ResourceId),
}

#[derive(Debug, Default)]
pub struct Assets {
    pub geometries: SlotMap<GeometryHandle, Geometry>,
    pub materials: SlotMap<MaterialHandle, Material>,
    pub textures: SlotMap<TextureHandle, Texture>,
    pub render_targets: SlotMap<RenderTargetHandle, RenderTarget>,
    disposed: Vec<Disposal>,
}

impl Assets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryHandle {
        self.geometries.insert(geometry)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.insert(material)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureHandle {
        self.textures.insert(texture)
    }

    pub fn add_render_target(&mut self, target: RenderTarget) -> RenderTargetHandle {
        self.render_targets.insert(target)
    }

    pub fn remove_geometry(&mut self, handle: GeometryHandle) -> Option<Geometry> {
        let geometry = self.geometries.remove(handle)?;
        self.disposed.push(Disposal::Geometry(geometry.id()));
        Some(geometry)
    }

    pub fn remove_material(&mut self, handle: MaterialHandle) -> Option<Material> {
        let material = self.materials.remove(handle)?;
        self.disposed.push(Disposal::Material(material.id()));
        Some(material)
    }

    pub fn remove_texture(&mut self, handle: TextureHandle) -> Option<Texture> {
        let texture = self.textures.remove(handle)?;
        self.disposed.push(Disposal::Texture(texture.id()));
        Some(texture)
    }

    pub fn remove_render_target(&mut self, handle: RenderTargetHandle) -> Option<RenderTarget> {
        let target = self.render_targets.remove(handle)?;
        self.disposed.push(Disposal::RenderTarget(target.id()));
        Some(target)
    }

    /// Takes the pending disposals, oldest first.
    pub fn drain_disposed(&mut self) -> Vec<Disposal> {
        std::mem::take(&mut self.disposed)
    }

    #[must_use]
    pub fn has_pending_disposals(&self) -> bool {
        !self.disposed.is_empty()
    }
}
