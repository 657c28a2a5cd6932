//! The device seam.
//!
//! [`GpuDevice`] is the single place where device calls are issued. The
//! renderer never talks to a graphics API directly: every state change,
//! upload and draw goes through this trait, which keeps the call stream
//! observable (see [`super::headless::HeadlessDevice`]) and lets the wgpu
//! backend bake immutable pipelines from the mutable state it receives.
//!
//! The call vocabulary is deliberately that of a mutable-state API:
//! blending, depth, stencil and rasterizer state are set independently,
//! and the state tracker in front of the device is responsible for
//! issuing each call only when the value changes.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::errors::ProgramDiagnostics;
use crate::renderer::pipeline::layout::ProgramLayout;
use crate::resources::buffer::{BufferUsage, StepMode};
use crate::resources::material::PolygonOffset;
use crate::resources::texture::{SamplerDesc, TextureDimension};

use super::capabilities::Capabilities;

macro_rules! device_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

device_handle! {
    /// Device buffer handle.
    BufferId,
    /// Device texture handle (including framebuffer attachments).
    TextureId,
    /// Framebuffer (set of attachments) handle.
    FramebufferId,
    /// Compiled program handle.
    ProgramId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub kind: BufferKind,
    pub usage: BufferUsage,
    pub contents: &'a [u8],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub mip_levels: u32,
    pub format: wgpu::TextureFormat,
    pub dimension: TextureDimension,
    pub sampler: SamplerDesc,
    pub render_attachment: bool,
    pub samples: u32,
}

impl TextureDesc {
    /// Full mip chain length for a `width` x `height` image.
    #[must_use]
    pub fn mip_count(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Sample count of the render attachments. Greater than one adds
    /// single-sampled resolve textures that are the ones sampled later.
    pub samples: u32,
    pub color_formats: SmallVec<[wgpu::TextureFormat; 4]>,
    pub depth_format: Option<wgpu::TextureFormat>,
    /// Mip levels of the (resolved) color textures.
    pub mip_levels: u32,
    pub sampler: SamplerDesc,
}

/// Attachments of a created framebuffer. The color textures are the
/// sampleable (resolved) ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pub id: FramebufferId,
    pub color_textures: SmallVec<[TextureId; 4]>,
    pub depth_texture: Option<TextureId>,
}

/// Generated source plus the interface it declares.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: String,
    pub source: String,
    pub layout: ProgramLayout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Attachments cleared by [`GpuDevice::clear`]; `None` leaves one intact.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFunc {
    pub compare: wgpu::CompareFunction,
    pub reference: u32,
    pub mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOps {
    pub fail: wgpu::StencilOperation,
    pub depth_fail: wgpu::StencilOperation,
    pub pass: wgpu::StencilOperation,
}

/// What feeds one vertex input location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub buffer: BufferId,
    pub format: wgpu::VertexFormat,
    pub stride: u32,
    pub offset: u32,
    pub step: StepMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformData<'a> {
    Float(&'a [f32]),
    Int(&'a [i32]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawCall {
    pub topology: wgpu::PrimitiveTopology,
    pub indexed: bool,
    pub first: u32,
    pub count: u32,
    pub instances: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Observed state of a readback fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceStatus {
    Pending,
    /// Tightly packed RGBA8 rows.
    Ready(Vec<u8>),
    Failed(String),
}

/// Device-side completion signal of a pixel readback.
pub trait ReadbackFence: Send + Sync {
    /// Non-blocking check. Once `Ready` or `Failed` has been returned the
    /// fence keeps returning `Failed`.
    fn poll(&self) -> FenceStatus;
}

/// Mutable-state device interface consumed by the renderer.
pub trait GpuDevice {
    /// Queries device limits. Called at start-up and after restoration.
    fn probe(&mut self) -> Capabilities;

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> BufferId;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId;
    /// Uploads one mip level of one layer.
    fn write_texture(&mut self, texture: TextureId, layer: u32, mip_level: u32, data: &[u8]);
    fn generate_mipmaps(&mut self, texture: TextureId);
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Framebuffer;
    /// Resolves multisampled attachments into their sampleable textures.
    fn resolve_framebuffer(&mut self, framebuffer: FramebufferId);
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    fn create_program(&mut self, program: &ProgramSource) -> Result<ProgramId, ProgramDiagnostics>;
    fn destroy_program(&mut self, program: ProgramId);

    // ------------------------------------------------------------------
    // Pipeline state
    // ------------------------------------------------------------------

    fn use_program(&mut self, program: ProgramId);
    /// `None` binds the default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, rect: ScissorRect);
    fn set_scissor_test(&mut self, enabled: bool);

    /// `None` disables blending.
    fn set_blend(&mut self, blend: Option<wgpu::BlendState>);
    fn set_blend_constant(&mut self, color: [f32; 4]);

    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_depth_compare(&mut self, compare: wgpu::CompareFunction);

    fn set_stencil_test(&mut self, enabled: bool);
    fn set_stencil_write_mask(&mut self, mask: u32);
    fn set_stencil_func(&mut self, func: StencilFunc);
    fn set_stencil_op(&mut self, ops: StencilOps);

    /// `None` disables culling.
    fn set_cull_mode(&mut self, face: Option<wgpu::Face>);
    fn set_front_face(&mut self, front_face: wgpu::FrontFace);
    fn set_color_write_mask(&mut self, mask: wgpu::ColorWrites);
    fn set_polygon_offset(&mut self, offset: Option<PolygonOffset>);
    fn set_alpha_to_coverage(&mut self, enabled: bool);

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    fn clear(&mut self, request: ClearRequest);

    fn set_uniform(&mut self, program: ProgramId, slot: u32, data: UniformData<'_>);
    /// Points texture slot `slot` of `program` at texture unit `unit`.
    fn set_texture_slot(&mut self, program: ProgramId, slot: u32, unit: u32);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    fn set_vertex_attribute(&mut self, location: u32, binding: VertexBinding);
    fn disable_vertex_attribute(&mut self, location: u32);
    fn set_index_buffer(&mut self, index: Option<(BufferId, wgpu::IndexFormat)>);

    fn draw(&mut self, call: &DrawCall);
    /// Submits all recorded work.
    fn flush(&mut self);
    /// Drops clears and draws recorded since the last flush. Resource
    /// uploads already issued stay in effect.
    fn discard_frame(&mut self);

    // ------------------------------------------------------------------
    // Readback and lifecycle
    // ------------------------------------------------------------------

    /// Queues a copy of `rect` of the first color attachment (or the
    /// default framebuffer) and returns its completion fence.
    fn read_pixels(
        &mut self,
        framebuffer: Option<FramebufferId>,
        rect: ReadRect,
    ) -> Result<Arc<dyn ReadbackFence>, String>;

    /// Drives pending device callbacks without blocking.
    fn poll(&mut self) {}

    fn is_context_lost(&self) -> bool;
    /// Attempts to recreate the device after a loss. All previously issued
    /// handles are invalid afterwards.
    fn restore_context(&mut self) -> bool;
    /// Size of the default framebuffer.
    fn default_framebuffer_size(&self) -> (u32, u32);
    /// Color format of the default framebuffer.
    fn default_framebuffer_format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_covers_full_chain() {
        assert_eq!(TextureDesc::mip_count(1, 1), 1);
        assert_eq!(TextureDesc::mip_count(256, 256), 9);
        assert_eq!(TextureDesc::mip_count(300, 17), 9);
    }
}
