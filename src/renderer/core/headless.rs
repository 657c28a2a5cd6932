//! Recording software device.
//!
//! [`HeadlessDevice`] implements [`GpuDevice`] without a GPU. It keeps
//! just enough state to answer readbacks and lifecycle queries, and logs
//! every call it receives as a [`DeviceCall`]. Tests, tools and CI use the
//! log to assert on the exact call stream the renderer produces.
//!
//! Compile failures are injected through a validator hook, device loss
//! through [`HeadlessDevice::simulate_context_loss`], and readback latency
//! through [`HeadlessDevice::set_fence_latency`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::ProgramDiagnostics;
use crate::renderer::pipeline::layout::ProgramLayout;
use crate::resources::material::PolygonOffset;

use super::capabilities::Capabilities;
use super::device::{
    BufferDesc, BufferId, ClearRequest, DrawCall, FenceStatus, Framebuffer, FramebufferDesc,
    FramebufferId, GpuDevice, ProgramId, ProgramSource, ReadRect, ReadbackFence, ScissorRect,
    StencilFunc, StencilOps, TextureDesc, TextureId, UniformData, VertexBinding, Viewport,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { buffer: BufferId, bytes: usize },
    WriteBuffer { buffer: BufferId, offset: u64, bytes: usize },
    DestroyBuffer(BufferId),
    CreateTexture { texture: TextureId, width: u32, height: u32, format: wgpu::TextureFormat },
    WriteTexture { texture: TextureId, layer: u32, mip_level: u32, bytes: usize },
    GenerateMipmaps(TextureId),
    DestroyTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    ResolveFramebuffer(FramebufferId),
    DestroyFramebuffer(FramebufferId),
    CreateProgram { program: ProgramId, label: String },
    DestroyProgram(ProgramId),

    UseProgram(ProgramId),
    BindFramebuffer(Option<FramebufferId>),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetScissorTest(bool),
    SetBlend(Option<wgpu::BlendState>),
    SetBlendConstant([f32; 4]),
    SetDepthTest(bool),
    SetDepthWrite(bool),
    SetDepthCompare(wgpu::CompareFunction),
    SetStencilTest(bool),
    SetStencilWriteMask(u32),
    SetStencilFunc(StencilFunc),
    SetStencilOp(StencilOps),
    SetCullMode(Option<wgpu::Face>),
    SetFrontFace(wgpu::FrontFace),
    SetColorWriteMask(wgpu::ColorWrites),
    SetPolygonOffset(Option<PolygonOffset>),
    SetAlphaToCoverage(bool),

    Clear(ClearRequest),
    SetUniform { program: ProgramId, slot: u32 },
    SetTextureSlot { program: ProgramId, slot: u32, unit: u32 },
    BindTexture { unit: u32, texture: Option<TextureId> },
    SetVertexAttribute { location: u32, binding: VertexBinding },
    DisableVertexAttribute(u32),
    SetIndexBuffer(Option<(BufferId, wgpu::IndexFormat)>),
    Draw(DrawCall),
    Flush,
    DiscardFrame,
    ReadPixels { framebuffer: Option<FramebufferId>, rect: ReadRect },
}

impl DeviceCall {
    /// Calls that create, upload or destroy device resources.
    #[must_use]
    pub fn is_resource_call(&self) -> bool {
        matches!(
            self,
            Self::CreateBuffer { .. }
                | Self::WriteBuffer { .. }
                | Self::DestroyBuffer(_)
                | Self::CreateTexture { .. }
                | Self::WriteTexture { .. }
                | Self::GenerateMipmaps(_)
                | Self::DestroyTexture(_)
                | Self::CreateFramebuffer(_)
                | Self::DestroyFramebuffer(_)
                | Self::CreateProgram { .. }
                | Self::DestroyProgram(_)
        )
    }

    /// Pipeline and binding state changes (everything a state tracker is
    /// expected to deduplicate).
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        !self.is_resource_call()
            && !matches!(
                self,
                Self::Clear(_)
                    | Self::Draw(_)
                    | Self::Flush
                    | Self::DiscardFrame
                    | Self::ReadPixels { .. }
                    | Self::ResolveFramebuffer(_)
            )
    }
}

/// Last value written to a uniform slot.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformRecord {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

type CompileValidator = Box<dyn FnMut(&ProgramSource) -> Option<ProgramDiagnostics>>;

struct FramebufferState {
    desc: FramebufferDesc,
    attachments: smallvec::SmallVec<[TextureId; 5]>,
    color: [f32; 4],
}

pub struct HeadlessDevice {
    caps: Capabilities,
    next_id: u64,
    log: Vec<DeviceCall>,
    recording: bool,
    buffers: FxHashMap<BufferId, Vec<u8>>,
    textures: FxHashMap<TextureId, TextureDesc>,
    framebuffers: FxHashMap<FramebufferId, FramebufferState>,
    programs: FxHashMap<ProgramId, ProgramLayout>,
    uniforms: FxHashMap<(ProgramId, u32), UniformRecord>,
    bound_framebuffer: Option<FramebufferId>,
    default_size: (u32, u32),
    default_color: [f32; 4],
    /// Clear colors recorded since the last flush, applied on submit.
    pending_clears: Vec<(Option<FramebufferId>, [f32; 4])>,
    validator: Option<CompileValidator>,
    context_lost: bool,
    restorable: bool,
    fence_latency: u32,
    programs_compiled: u64,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            caps: Capabilities::default(),
            next_id: 1,
            log: Vec::new(),
            recording: true,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            programs: FxHashMap::default(),
            uniforms: FxHashMap::default(),
            bound_framebuffer: None,
            default_size: (width.max(1), height.max(1)),
            default_color: [0.0; 4],
            pending_clears: Vec::new(),
            validator: None,
            context_lost: false,
            restorable: true,
            fence_latency: 0,
            programs_compiled: 0,
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Installs a hook that may reject programs with diagnostics.
    pub fn set_compile_validator(
        &mut self,
        validator: impl FnMut(&ProgramSource) -> Option<ProgramDiagnostics> + 'static,
    ) {
        self.validator = Some(Box::new(validator));
    }

    pub fn clear_compile_validator(&mut self) {
        self.validator = None;
    }

    /// Marks the context lost. Calls keep being recorded but have no effect.
    pub fn simulate_context_loss(&mut self) {
        log::debug!("Headless device: simulated context loss");
        self.context_lost = true;
    }

    /// Whether the next [`GpuDevice::restore_context`] succeeds.
    pub fn set_restorable(&mut self, restorable: bool) {
        self.restorable = restorable;
    }

    /// Number of pending polls before a readback fence signals.
    pub fn set_fence_latency(&mut self, polls: u32) {
        self.fence_latency = polls;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.default_size = (width.max(1), height.max(1));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn calls(&self) -> &[DeviceCall] {
        &self.log
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.log)
    }

    pub fn clear_calls(&mut self) {
        self.log.clear();
    }

    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.log.iter().filter(|c| predicate(c)).count()
    }

    #[must_use]
    pub fn draw_calls(&self) -> Vec<DrawCall> {
        self.log
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw(call) => Some(*call),
                _ => None,
            })
            .collect()
    }

    /// Programs compiled successfully since creation.
    #[must_use]
    pub fn programs_compiled(&self) -> u64 {
        self.programs_compiled
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    #[must_use]
    pub fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&texture)
    }

    #[must_use]
    pub fn program_layout(&self, program: ProgramId) -> Option<&ProgramLayout> {
        self.programs.get(&program)
    }

    #[must_use]
    pub fn uniform(&self, program: ProgramId, slot: u32) -> Option<&UniformRecord> {
        self.uniforms.get(&(program, slot))
    }

    /// Last value uploaded to the uniform called `name` of `program`.
    #[must_use]
    pub fn uniform_by_name(&self, program: ProgramId, name: &str) -> Option<&UniformRecord> {
        let slot = self.programs.get(&program)?.uniform_slot(name)?;
        self.uniforms.get(&(program, slot))
    }

    fn record(&mut self, call: DeviceCall) {
        if self.recording {
            self.log.push(call);
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn apply_pending_clears(&mut self) {
        for (target, color) in self.pending_clears.drain(..) {
            match target {
                Some(fb) => {
                    if let Some(state) = self.framebuffers.get_mut(&fb) {
                        state.color = color;
                    }
                }
                None => self.default_color = color,
            }
        }
    }
}

impl GpuDevice for HeadlessDevice {
    fn probe(&mut self) -> Capabilities {
        self.caps
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> BufferId {
        let id = BufferId(self.allocate());
        self.buffers.insert(id, desc.contents.to_vec());
        self.record(DeviceCall::CreateBuffer {
            buffer: id,
            bytes: desc.contents.len(),
        });
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        if let Some(contents) = self.buffers.get_mut(&buffer) {
            let start = offset as usize;
            let end = (start + data.len()).min(contents.len());
            if start < end {
                contents[start..end].copy_from_slice(&data[..end - start]);
            }
        }
        self.record(DeviceCall::WriteBuffer {
            buffer,
            offset,
            bytes: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        self.record(DeviceCall::DestroyBuffer(buffer));
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.allocate());
        self.textures.insert(id, desc.clone());
        self.record(DeviceCall::CreateTexture {
            texture: id,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        id
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, mip_level: u32, data: &[u8]) {
        self.record(DeviceCall::WriteTexture {
            texture,
            layer,
            mip_level,
            bytes: data.len(),
        });
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        self.record(DeviceCall::GenerateMipmaps(texture));
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.record(DeviceCall::DestroyTexture(texture));
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Framebuffer {
        let id = FramebufferId(self.allocate());
        let mut color_textures = smallvec::SmallVec::new();
        for (i, &format) in desc.color_formats.iter().enumerate() {
            let texture = TextureId(self.allocate());
            self.textures.insert(
                texture,
                TextureDesc {
                    label: format!("{} color {i}", desc.label),
                    width: desc.width,
                    height: desc.height,
                    layers: 1,
                    mip_levels: desc.mip_levels,
                    format,
                    dimension: crate::resources::texture::TextureDimension::D2,
                    sampler: desc.sampler,
                    render_attachment: true,
                    samples: 1,
                },
            );
            color_textures.push(texture);
        }
        let depth_texture = desc.depth_format.map(|format| {
            let texture = TextureId(self.allocate());
            self.textures.insert(
                texture,
                TextureDesc {
                    label: format!("{} depth", desc.label),
                    width: desc.width,
                    height: desc.height,
                    layers: 1,
                    mip_levels: 1,
                    format,
                    dimension: crate::resources::texture::TextureDimension::D2,
                    sampler: desc.sampler,
                    render_attachment: true,
                    samples: desc.samples,
                },
            );
            texture
        });
        let attachments = color_textures.iter().copied().chain(depth_texture).collect();
        self.framebuffers.insert(
            id,
            FramebufferState {
                desc: desc.clone(),
                attachments,
                color: [0.0; 4],
            },
        );
        self.record(DeviceCall::CreateFramebuffer(id));
        Framebuffer {
            id,
            color_textures,
            depth_texture,
        }
    }

    fn resolve_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.record(DeviceCall::ResolveFramebuffer(framebuffer));
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(state) = self.framebuffers.remove(&framebuffer) {
            for texture in state.attachments {
                self.textures.remove(&texture);
            }
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
        self.record(DeviceCall::DestroyFramebuffer(framebuffer));
    }

    fn create_program(&mut self, program: &ProgramSource) -> Result<ProgramId, ProgramDiagnostics> {
        if let Some(validator) = self.validator.as_mut()
            && let Some(diagnostics) = validator(program)
        {
            return Err(diagnostics);
        }
        let id = ProgramId(self.allocate());
        self.programs.insert(id, program.layout.clone());
        self.programs_compiled += 1;
        self.record(DeviceCall::CreateProgram {
            program: id,
            label: program.label.clone(),
        });
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.uniforms.retain(|(p, _), _| *p != program);
        self.record(DeviceCall::DestroyProgram(program));
    }

    fn use_program(&mut self, program: ProgramId) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound_framebuffer = framebuffer;
        self.record(DeviceCall::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(DeviceCall::SetViewport(viewport));
    }

    fn set_scissor(&mut self, rect: ScissorRect) {
        self.record(DeviceCall::SetScissor(rect));
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.record(DeviceCall::SetScissorTest(enabled));
    }

    fn set_blend(&mut self, blend: Option<wgpu::BlendState>) {
        self.record(DeviceCall::SetBlend(blend));
    }

    fn set_blend_constant(&mut self, color: [f32; 4]) {
        self.record(DeviceCall::SetBlendConstant(color));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.record(DeviceCall::SetDepthTest(enabled));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.record(DeviceCall::SetDepthWrite(enabled));
    }

    fn set_depth_compare(&mut self, compare: wgpu::CompareFunction) {
        self.record(DeviceCall::SetDepthCompare(compare));
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.record(DeviceCall::SetStencilTest(enabled));
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.record(DeviceCall::SetStencilWriteMask(mask));
    }

    fn set_stencil_func(&mut self, func: StencilFunc) {
        self.record(DeviceCall::SetStencilFunc(func));
    }

    fn set_stencil_op(&mut self, ops: StencilOps) {
        self.record(DeviceCall::SetStencilOp(ops));
    }

    fn set_cull_mode(&mut self, face: Option<wgpu::Face>) {
        self.record(DeviceCall::SetCullMode(face));
    }

    fn set_front_face(&mut self, front_face: wgpu::FrontFace) {
        self.record(DeviceCall::SetFrontFace(front_face));
    }

    fn set_color_write_mask(&mut self, mask: wgpu::ColorWrites) {
        self.record(DeviceCall::SetColorWriteMask(mask));
    }

    fn set_polygon_offset(&mut self, offset: Option<PolygonOffset>) {
        self.record(DeviceCall::SetPolygonOffset(offset));
    }

    fn set_alpha_to_coverage(&mut self, enabled: bool) {
        self.record(DeviceCall::SetAlphaToCoverage(enabled));
    }

    fn clear(&mut self, request: ClearRequest) {
        if let Some(color) = request.color {
            self.pending_clears.push((self.bound_framebuffer, color));
        }
        self.record(DeviceCall::Clear(request));
    }

    fn set_uniform(&mut self, program: ProgramId, slot: u32, data: UniformData<'_>) {
        let record = match data {
            UniformData::Float(values) => UniformRecord::Float(values.to_vec()),
            UniformData::Int(values) => UniformRecord::Int(values.to_vec()),
        };
        self.uniforms.insert((program, slot), record);
        self.record(DeviceCall::SetUniform { program, slot });
    }

    fn set_texture_slot(&mut self, program: ProgramId, slot: u32, unit: u32) {
        self.record(DeviceCall::SetTextureSlot { program, slot, unit });
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.record(DeviceCall::BindTexture { unit, texture });
    }

    fn set_vertex_attribute(&mut self, location: u32, binding: VertexBinding) {
        self.record(DeviceCall::SetVertexAttribute { location, binding });
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.record(DeviceCall::DisableVertexAttribute(location));
    }

    fn set_index_buffer(&mut self, index: Option<(BufferId, wgpu::IndexFormat)>) {
        self.record(DeviceCall::SetIndexBuffer(index));
    }

    fn draw(&mut self, call: &DrawCall) {
        self.record(DeviceCall::Draw(*call));
    }

    fn flush(&mut self) {
        self.apply_pending_clears();
        self.record(DeviceCall::Flush);
    }

    fn discard_frame(&mut self) {
        if !self.pending_clears.is_empty() {
            log::debug!("Headless device: dropping {} unsubmitted clears", self.pending_clears.len());
        }
        self.pending_clears.clear();
        self.record(DeviceCall::DiscardFrame);
    }

    fn read_pixels(
        &mut self,
        framebuffer: Option<FramebufferId>,
        rect: ReadRect,
    ) -> Result<Arc<dyn ReadbackFence>, String> {
        self.apply_pending_clears();
        let color = match framebuffer {
            Some(fb) => {
                self.framebuffers
                    .get(&fb)
                    .ok_or_else(|| format!("unknown framebuffer {fb:?}"))?
                    .color
            }
            None => self.default_color,
        };
        let (width, height) = match framebuffer.and_then(|fb| self.framebuffers.get(&fb)) {
            Some(state) => (state.desc.width, state.desc.height),
            None => self.default_size,
        };
        if rect.x + rect.width > width || rect.y + rect.height > height {
            return Err(format!(
                "read rect {}x{} at ({}, {}) exceeds {width}x{height}",
                rect.width, rect.height, rect.x, rect.y
            ));
        }
        let texel = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let pixels = texel.repeat((rect.width * rect.height) as usize);
        self.record(DeviceCall::ReadPixels { framebuffer, rect });
        Ok(Arc::new(HeadlessFence {
            remaining: AtomicU32::new(self.fence_latency),
            data: Mutex::new(Some(pixels)),
        }))
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn restore_context(&mut self) -> bool {
        if !self.restorable {
            return false;
        }
        self.buffers.clear();
        self.textures.clear();
        self.framebuffers.clear();
        self.programs.clear();
        self.uniforms.clear();
        self.pending_clears.clear();
        self.bound_framebuffer = None;
        self.context_lost = false;
        log::debug!("Headless device: context restored");
        true
    }

    fn default_framebuffer_size(&self) -> (u32, u32) {
        self.default_size
    }
}

struct HeadlessFence {
    remaining: AtomicU32,
    data: Mutex<Option<Vec<u8>>>,
}

impl ReadbackFence for HeadlessFence {
    fn poll(&self) -> FenceStatus {
        let pending = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if pending {
            return FenceStatus::Pending;
        }
        match self.data.lock().take() {
            Some(pixels) => FenceStatus::Ready(pixels),
            None => FenceStatus::Failed("fence already consumed".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::buffer::BufferUsage;
    use crate::renderer::core::device::BufferKind;

    #[test]
    fn write_buffer_patches_contents() {
        let mut device = HeadlessDevice::new(4, 4);
        let id = device.create_buffer(&BufferDesc {
            label: "test",
            kind: BufferKind::Vertex,
            usage: BufferUsage::Static,
            contents: &[0, 0, 0, 0],
        });
        device.write_buffer(id, 2, &[7, 8]);
        assert_eq!(device.buffer_contents(id), Some(&[0, 0, 7, 8][..]));
        assert_eq!(device.calls().len(), 2);
    }

    #[test]
    fn fence_signals_after_latency() {
        let mut device = HeadlessDevice::new(2, 2);
        device.set_fence_latency(2);
        device.clear(ClearRequest {
            color: Some([1.0, 0.0, 0.0, 1.0]),
            ..ClearRequest::default()
        });
        let fence = device
            .read_pixels(None, ReadRect { x: 0, y: 0, width: 1, height: 1 })
            .expect("fence");
        assert_eq!(fence.poll(), FenceStatus::Pending);
        assert_eq!(fence.poll(), FenceStatus::Pending);
        assert_eq!(fence.poll(), FenceStatus::Ready(vec![255, 0, 0, 255]));
        assert!(matches!(fence.poll(), FenceStatus::Failed(_)));
    }

    #[test]
    fn discarded_clears_never_reach_the_framebuffer() {
        let mut device = HeadlessDevice::new(2, 2);
        device.clear(ClearRequest {
            color: Some([0.0, 1.0, 0.0, 1.0]),
            ..ClearRequest::default()
        });
        device.flush();
        device.clear(ClearRequest {
            color: Some([0.0, 0.0, 1.0, 1.0]),
            ..ClearRequest::default()
        });
        device.discard_frame();

        let fence = device
            .read_pixels(None, ReadRect { x: 0, y: 0, width: 1, height: 1 })
            .expect("fence");
        assert_eq!(fence.poll(), FenceStatus::Ready(vec![0, 255, 0, 255]));
    }

    #[test]
    fn validator_rejects_programs() {
        let mut device = HeadlessDevice::new(1, 1);
        device.set_compile_validator(|src| {
            src.label.contains("bad").then(|| {
                ProgramDiagnostics::new(&src.label, crate::errors::ShaderStage::Fragment, "boom", None, "")
            })
        });
        let ok = device.create_program(&ProgramSource {
            label: "good".into(),
            source: String::new(),
            layout: ProgramLayout::new(),
        });
        let bad = device.create_program(&ProgramSource {
            label: "bad".into(),
            source: String::new(),
            layout: ProgramLayout::new(),
        });
        assert!(ok.is_ok());
        assert!(bad.is_err());
        assert_eq!(device.live_programs(), 1);
    }

    #[test]
    fn restore_drops_every_resource() {
        let mut device = HeadlessDevice::new(1, 1);
        device.create_buffer(&BufferDesc {
            label: "b",
            kind: BufferKind::Index,
            usage: BufferUsage::Static,
            contents: &[1, 2],
        });
        device.simulate_context_loss();
        assert!(device.is_context_lost());
        assert!(device.restore_context());
        assert!(!device.is_context_lost());
        assert_eq!(device.live_buffers(), 0);

        device.set_restorable(false);
        device.simulate_context_loss();
        assert!(!device.restore_context());
    }
}
