//! Device resource caches.
//!
//! Each cache maps a CPU-side resource (by [`ResourceId`](crate::resources::ResourceId))
//! to the device handle created for it, creates lazily on first use,
//! re-uploads when the resource version moves and frees on explicit
//! removal. `invalidate` drops every entry without device calls after a
//! device loss.

pub mod buffer;
pub mod geometry;
pub mod render_target;
pub mod texture;

pub use buffer::{BufferCache, GpuBuffer};
pub use geometry::GeometryCache;
pub use render_target::{GpuRenderTarget, RenderTargetCache};
pub use texture::{GpuTexture, TextureCache};
