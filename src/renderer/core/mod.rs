//! Device layer.
//!
//! - [`device`]: the [`GpuDevice`] trait and its call vocabulary
//! - [`capabilities`]: device limits probed once per (re)initialisation
//! - [`headless`]: a recording software device
//! - [`wgpu_device`]: the wgpu backend

pub mod capabilities;
pub mod device;
pub mod headless;
mod mipmap;
pub mod wgpu_device;

pub use capabilities::Capabilities;
pub use device::{
    BufferDesc, BufferId, BufferKind, ClearRequest, DrawCall, FenceStatus, Framebuffer,
    FramebufferDesc, FramebufferId, GpuDevice, ProgramId, ProgramSource, ReadRect, ReadbackFence,
    ScissorRect, StencilFunc, StencilOps, TextureDesc, TextureId, UniformData, VertexBinding,
    Viewport,
};
pub use headless::{DeviceCall, HeadlessDevice, UniformRecord};
pub use wgpu_device::WgpuDevice;
