//! CPU-side resource definitions.
//!
//! Nothing here talks to the device. Every resource carries a
//! [`ResourceId`] and a version; renderer caches compare the version they
//! last serviced against the current one.
//!
//! - [`BufferAttribute`]: vertex and index streams
//! - [`Geometry`]: attribute sets, groups and bounds
//! - [`Texture`]: texel data and sampling
//! - [`RenderTarget`]: offscreen framebuffers
//! - [`Material`]: shading family, maps and fixed-function state

pub mod buffer;
pub mod geometry;
pub mod material;
pub mod render_target;
pub mod shader_defines;
pub mod texture;
pub mod uniforms;
pub mod version_tracker;

pub use buffer::{BufferAttribute, BufferUsage, ElementFormat, StepMode, UpdateRange};
pub use geometry::{Aabb, BoundingSphere, DrawRange, Geometry, GeometryGroup};
pub use material::{
    Blending, DepthPacking, MapSlot, Material, MaterialCapabilities, MaterialFamily,
    MaterialFeatures, MaterialKind, MaterialSettings, ShaderMaterial, Side,
};
pub use render_target::{DepthBuffer, RenderTarget};
pub use shader_defines::ShaderDefines;
pub use texture::{ColorSpace, SamplerDesc, Texture, TextureDimension, TextureImage, TextureSource};
pub use uniforms::UniformValue;
pub use version_tracker::{ChangeTracker, MutGuard, ResourceId};
