//! wgpu backend.
//!
//! [`WgpuDevice`] maps the mutable-state call stream onto wgpu. State calls
//! only update a shadow copy of the pipeline state; every draw snapshots it
//! together with the program's uniform block, which is appended to a
//! per-frame uniform ring. [`GpuDevice::flush`] uploads the ring, groups
//! consecutive commands on one framebuffer into render passes, bakes one
//! render pipeline per distinct state combination and submits.
//!
//! Buffer and texture writes go through the queue and take effect at the
//! next submission. The default framebuffer is an offscreen RGBA8 texture.

use std::borrow::Cow;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{KilnError, ProgramDiagnostics, Result};
use crate::renderer::pipeline::layout::{ProgramLayout, UniformKind};
use crate::renderer::pipeline::shader_gen::validate_wgsl;
use crate::resources::buffer::StepMode;
use crate::resources::material::PolygonOffset;
use crate::resources::texture::{SamplerDesc, TextureDimension};

use super::capabilities::Capabilities;
use super::device::{
    BufferDesc, BufferId, BufferKind, ClearRequest, DrawCall, FenceStatus, Framebuffer,
    FramebufferDesc, FramebufferId, GpuDevice, ProgramId, ProgramSource, ReadRect, ReadbackFence,
    ScissorRect, StencilFunc, StencilOps, TextureDesc, TextureId, UniformData, VertexBinding,
    Viewport,
};
use super::mipmap::MipmapGenerator;

const DEFAULT_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEFAULT_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

// ─── Resources ───────────────────────────────────────────────────────────

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct ColorAttachment {
    /// Multisampled render view; `None` renders straight into `view`.
    msaa: Option<wgpu::TextureView>,
    /// Mip 0 of the sampleable texture.
    view: wgpu::TextureView,
    texture: wgpu::Texture,
    format: wgpu::TextureFormat,
}

struct FramebufferEntry {
    width: u32,
    height: u32,
    samples: u32,
    colors: SmallVec<[ColorAttachment; 4]>,
    depth: Option<(wgpu::TextureView, wgpu::TextureFormat)>,
    /// Sampleable color textures, in attachment order.
    textures: SmallVec<[TextureId; 4]>,
    mip_levels: u32,
}

struct ProgramEntry {
    module: wgpu::ShaderModule,
    bind_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    layout: ProgramLayout,
    /// Host copy of the uniform block.
    block: Vec<u8>,
    /// Texture unit of each texture slot.
    texture_units: Vec<u32>,
}

/// White 1x1 textures bound where a slot has no texture.
struct Fallbacks {
    d2: TextureEntry,
    cube: TextureEntry,
    d2_array: TextureEntry,
}

// ─── Recorded state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RasterState {
    blend: Option<wgpu::BlendState>,
    color_writes: wgpu::ColorWrites,
    depth_test: bool,
    depth_write: bool,
    depth_compare: wgpu::CompareFunction,
    stencil_test: bool,
    stencil_write_mask: u32,
    stencil_func: StencilFunc,
    stencil_ops: StencilOps,
    cull_mode: Option<wgpu::Face>,
    front_face: wgpu::FrontFace,
    polygon_offset: Option<PolygonOffset>,
    alpha_to_coverage: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            blend: None,
            color_writes: wgpu::ColorWrites::ALL,
            depth_test: false,
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil_test: false,
            stencil_write_mask: 0xff,
            stencil_func: StencilFunc {
                compare: wgpu::CompareFunction::Always,
                reference: 0,
                mask: 0xff,
            },
            stencil_ops: StencilOps {
                fail: wgpu::StencilOperation::Keep,
                depth_fail: wgpu::StencilOperation::Keep,
                pass: wgpu::StencilOperation::Keep,
            },
            cull_mode: None,
            front_face: wgpu::FrontFace::Ccw,
            polygon_offset: None,
            alpha_to_coverage: false,
        }
    }
}

#[derive(Default)]
struct BoundState {
    program: Option<ProgramId>,
    framebuffer: Option<FramebufferId>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    scissor_test: bool,
    blend_constant: [f32; 4],
    raster: RasterState,
    units: Vec<Option<TextureId>>,
    attributes: FxHashMap<u32, VertexBinding>,
    index: Option<(BufferId, wgpu::IndexFormat)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexSlot {
    buffer: BufferId,
    /// Byte offset the slot's buffer slice starts at.
    base: u32,
    stride: u32,
    step: StepMode,
    attributes: SmallVec<[(u32, wgpu::VertexFormat, u32); 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    colors: SmallVec<[wgpu::TextureFormat; 4]>,
    depth: Option<wgpu::TextureFormat>,
    samples: u32,
    topology: wgpu::PrimitiveTopology,
    strip_index: Option<wgpu::IndexFormat>,
    raster: RasterState,
    /// Vertex layout without the buffer bindings.
    vertex: SmallVec<[(u32, StepMode, SmallVec<[(u32, wgpu::VertexFormat, u32); 4]>); 8]>,
}

type BindGroupKey = (ProgramId, SmallVec<[Option<TextureId>; 8]>);

struct RecordedDraw {
    pipeline: PipelineKey,
    program: ProgramId,
    uniform_offset: u32,
    textures: SmallVec<[Option<TextureId>; 8]>,
    slots: SmallVec<[(BufferId, u64); 8]>,
    index: Option<(BufferId, wgpu::IndexFormat)>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    blend_constant: [f32; 4],
    stencil_reference: u32,
    call: DrawCall,
}

enum Command {
    Clear {
        target: Option<FramebufferId>,
        request: ClearRequest,
    },
    Draw {
        target: Option<FramebufferId>,
        draw: Box<RecordedDraw>,
    },
    Mipmaps(TextureId),
}

impl Command {
    fn target(&self) -> Option<Option<FramebufferId>> {
        match self {
            Self::Clear { target, .. } | Self::Draw { target, .. } => Some(*target),
            Self::Mipmaps(_) => None,
        }
    }
}

// ─── Connection ──────────────────────────────────────────────────────────

struct Connection {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
}

async fn connect(instance: &wgpu::Instance) -> std::result::Result<Connection, String> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| e.to_string())?;

    let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("kiln"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| e.to_string())?;

    let lost = Arc::new(AtomicBool::new(false));
    let flag = lost.clone();
    device.set_device_lost_callback(move |reason, message| {
        log::error!("wgpu device lost ({reason:?}): {message}");
        flag.store(true, Ordering::Release);
    });

    let info = adapter.get_info();
    log::info!("Using adapter {} ({:?})", info.name, info.backend);
    Ok(Connection {
        adapter,
        device,
        queue,
        lost,
    })
}

// ─── Device ──────────────────────────────────────────────────────────────

pub struct WgpuDevice {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,

    next_id: u64,
    buffers: FxHashMap<BufferId, wgpu::Buffer>,
    textures: FxHashMap<TextureId, TextureEntry>,
    framebuffers: FxHashMap<FramebufferId, FramebufferEntry>,
    default_target: FramebufferEntry,
    programs: FxHashMap<ProgramId, ProgramEntry>,
    fallbacks: Fallbacks,
    mipmaps: MipmapGenerator,

    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    bind_groups: FxHashMap<BindGroupKey, wgpu::BindGroup>,
    ring: Vec<u8>,
    ring_buffer: Option<wgpu::Buffer>,
    ring_alignment: u32,

    state: BoundState,
    commands: Vec<Command>,
}

impl WgpuDevice {
    /// Connects to the preferred adapter with an offscreen default
    /// framebuffer of `width` x `height`.
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let connection = connect(&instance).await.map_err(KilnError::DeviceInit)?;
        Ok(Self::from_connection(instance, connection, width, height))
    }

    /// Blocking variant of [`Self::new`].
    pub fn new_blocking(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::new(width, height))
    }

    fn from_connection(instance: wgpu::Instance, connection: Connection, width: u32, height: u32) -> Self {
        let Connection {
            adapter,
            device,
            queue,
            lost,
        } = connection;
        let default_target = create_default_target(&device, width.max(1), height.max(1));
        let fallbacks = create_fallbacks(&device, &queue);
        let mipmaps = MipmapGenerator::new(&device);
        let ring_alignment = device.limits().min_uniform_buffer_offset_alignment;
        Self {
            instance,
            adapter,
            device,
            queue,
            lost,
            next_id: 1,
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            default_target,
            programs: FxHashMap::default(),
            fallbacks,
            mipmaps,
            pipelines: FxHashMap::default(),
            bind_groups: FxHashMap::default(),
            ring: Vec::new(),
            ring_buffer: None,
            ring_alignment,
            state: BoundState::default(),
            commands: Vec::new(),
        }
    }

    #[must_use]
    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Color texture of the default framebuffer.
    #[must_use]
    pub fn output_texture(&self) -> &wgpu::Texture {
        &self.default_target.colors[0].texture
    }

    /// Recreates the default framebuffer. Pending work is submitted first.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.flush();
        self.default_target = create_default_target(&self.device, width.max(1), height.max(1));
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn target(&self, framebuffer: Option<FramebufferId>) -> Option<&FramebufferEntry> {
        match framebuffer {
            None => Some(&self.default_target),
            Some(id) => self.framebuffers.get(&id),
        }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> wgpu::Sampler {
        let linear = desc.mag_filter == wgpu::FilterMode::Linear
            && desc.min_filter == wgpu::FilterMode::Linear
            && desc.mipmap_filter == wgpu::MipmapFilterMode::Linear;
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: None,
            address_mode_u: desc.wrap_u,
            address_mode_v: desc.wrap_v,
            address_mode_w: desc.wrap_v,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_filter: desc.mipmap_filter,
            anisotropy_clamp: if linear { desc.anisotropy.max(1) } else { 1 },
            ..Default::default()
        })
    }

    fn remove_bind_groups_with(&mut self, texture: TextureId) {
        self.bind_groups
            .retain(|(_, textures), _| !textures.contains(&Some(texture)));
    }

    // ─── Flush ───────────────────────────────────────────────────────────

    fn upload_ring(&mut self) {
        if self.ring.is_empty() {
            return;
        }
        let needed = self.ring.len() as u64;
        if self.ring_buffer.as_ref().is_none_or(|b| b.size() < needed) {
            let size = needed.next_power_of_two().max(4096);
            self.ring_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Uniform Ring"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.bind_groups.clear();
        }
        if let Some(buffer) = &self.ring_buffer {
            self.queue.write_buffer(buffer, 0, &self.ring);
        }
    }

    /// Bakes the pipelines and bind groups the recorded draws need.
    fn prepare_draws(&mut self) {
        let Some(ring) = self.ring_buffer.clone() else {
            return;
        };
        for command in &self.commands {
            let Command::Draw { draw, .. } = command else {
                continue;
            };
            let Some(program) = self.programs.get(&draw.program) else {
                continue;
            };
            if !self.pipelines.contains_key(&draw.pipeline) {
                let pipeline = create_pipeline(&self.device, program, &draw.pipeline);
                self.pipelines.insert(draw.pipeline.clone(), pipeline);
            }
            let key = (draw.program, draw.textures.clone());
            if !self.bind_groups.contains_key(&key) {
                let group = create_bind_group(
                    &self.device,
                    program,
                    &ring,
                    &draw.textures,
                    &self.textures,
                    &self.fallbacks,
                );
                self.bind_groups.insert(key, group);
            }
        }
    }

    fn submit(&mut self) {
        if self.commands.is_empty() {
            return;
        }
        self.upload_ring();
        self.prepare_draws();

        let commands = std::mem::take(&mut self.commands);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let mut start = 0;
        while start < commands.len() {
            let Some(target) = commands[start].target() else {
                if let Command::Mipmaps(texture) = &commands[start]
                    && let Some(entry) = self.textures.get(texture)
                {
                    self.mipmaps.generate(&self.device, &mut encoder, &entry.texture);
                }
                start += 1;
                continue;
            };
            // A pass covers leading clears plus the draws that follow them.
            let mut end = start;
            let mut clear = ClearRequest::default();
            while end < commands.len() {
                match &commands[end] {
                    Command::Clear { target: t, request } if *t == target => {
                        if end > start && matches!(commands[end - 1], Command::Draw { .. }) {
                            break;
                        }
                        clear = merge_clear(clear, *request);
                    }
                    Command::Draw { target: t, .. } if *t == target => {}
                    _ => break,
                }
                end += 1;
            }
            self.encode_pass(&mut encoder, target, clear, &commands[start..end]);
            start = end;
        }

        self.queue.submit(Some(encoder.finish()));
        self.ring.clear();
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: Option<FramebufferId>,
        clear: ClearRequest,
        commands: &[Command],
    ) {
        let Some(fb) = self.target(target) else {
            log::warn!("Skipping commands for destroyed framebuffer {target:?}");
            return;
        };
        let color_load = clear.color.map_or(wgpu::LoadOp::Load, |[r, g, b, a]| {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            })
        });
        let colors: SmallVec<[Option<wgpu::RenderPassColorAttachment<'_>>; 4]> = fb
            .colors
            .iter()
            .map(|color| {
                Some(wgpu::RenderPassColorAttachment {
                    view: color.msaa.as_ref().unwrap_or(&color.view),
                    resolve_target: color.msaa.as_ref().map(|_| &color.view),
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil = fb.depth.as_ref().map(|(view, format)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: clear.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: format.has_stencil_aspect().then(|| wgpu::Operations {
                load: clear.stencil.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            }),
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Kiln Pass"),
            color_attachments: &colors,
            depth_stencil_attachment: depth_stencil,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for command in commands {
            let Command::Draw { draw, .. } = command else {
                continue;
            };
            let (Some(pipeline), Some(group)) = (
                self.pipelines.get(&draw.pipeline),
                self.bind_groups.get(&(draw.program, draw.textures.clone())),
            ) else {
                continue;
            };
            let mut buffers: SmallVec<[(&wgpu::Buffer, u64); 8]> = SmallVec::new();
            for (buffer, offset) in &draw.slots {
                match self.buffers.get(buffer) {
                    Some(b) => buffers.push((b, *offset)),
                    None => break,
                }
            }
            if buffers.len() != draw.slots.len() {
                log::warn!("Skipping draw with a destroyed vertex buffer");
                continue;
            }
            let index = match draw.index {
                Some((buffer, format)) => match self.buffers.get(&buffer) {
                    Some(b) => Some((b, format)),
                    None => continue,
                },
                None => None,
            };

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, group, &[draw.uniform_offset]);
            for (slot, (buffer, offset)) in buffers.iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, buffer.slice(*offset..));
            }
            let viewport = clamp_viewport(draw.viewport, fb.width, fb.height);
            pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
            let scissor = draw
                .scissor
                .map_or((0, 0, fb.width, fb.height), |s| clamp_scissor(s, fb.width, fb.height));
            pass.set_scissor_rect(scissor.0, scissor.1, scissor.2, scissor.3);
            let [r, g, b, a] = draw.blend_constant;
            pass.set_blend_constant(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            });
            pass.set_stencil_reference(draw.stencil_reference);

            let call = draw.call;
            let instances = 0..call.instances.max(1);
            match index {
                Some((buffer, format)) if call.indexed => {
                    pass.set_index_buffer(buffer.slice(..), format);
                    pass.draw_indexed(call.first..call.first + call.count, 0, instances);
                }
                _ => pass.draw(call.first..call.first + call.count, instances),
            }
        }
    }

    fn vertex_slots(&self, layout: &ProgramLayout) -> Option<SmallVec<[VertexSlot; 8]>> {
        let mut slots: SmallVec<[VertexSlot; 8]> = SmallVec::new();
        for decl in &layout.attributes {
            let Some(binding) = self.state.attributes.get(&decl.location) else {
                log::warn!("Skipping draw: vertex input `{}` is not bound", decl.name);
                return None;
            };
            let size = binding.format.size() as u32;
            let stride = if binding.stride == 0 { size } else { binding.stride };
            let shared = slots.iter_mut().find(|slot| {
                slot.buffer == binding.buffer
                    && slot.stride == stride
                    && slot.step == binding.step
                    && binding.offset >= slot.base
                    && binding.offset - slot.base + size <= stride
            });
            match shared {
                Some(slot) => slot
                    .attributes
                    .push((decl.location, binding.format, binding.offset - slot.base)),
                None => {
                    let (base, offset) = if binding.offset + size <= stride {
                        (0, binding.offset)
                    } else {
                        (binding.offset, 0)
                    };
                    slots.push(VertexSlot {
                        buffer: binding.buffer,
                        base,
                        stride,
                        step: binding.step,
                        attributes: smallvec::smallvec![(decl.location, binding.format, offset)],
                    });
                }
            }
        }
        Some(slots)
    }
}

fn merge_clear(into: ClearRequest, next: ClearRequest) -> ClearRequest {
    ClearRequest {
        color: next.color.or(into.color),
        depth: next.depth.or(into.depth),
        stencil: next.stencil.or(into.stencil),
    }
}

fn clamp_viewport(viewport: Option<Viewport>, width: u32, height: u32) -> Viewport {
    let (w, h) = (width as f32, height as f32);
    let v = viewport.unwrap_or(Viewport {
        x: 0.0,
        y: 0.0,
        width: w,
        height: h,
    });
    let x = v.x.clamp(0.0, w);
    let y = v.y.clamp(0.0, h);
    Viewport {
        x,
        y,
        width: v.width.clamp(0.0, w - x).max(1.0).min(w - x).max(0.0),
        height: v.height.clamp(0.0, h - y).max(1.0).min(h - y).max(0.0),
    }
}

fn clamp_scissor(rect: ScissorRect, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    (x, y, rect.width.min(width - x), rect.height.min(height - y))
}

/// Writes `data` into the block at `offset`, padding `mat3` columns to
/// their 16-byte stride.
fn write_uniform(block: &mut [u8], kind: UniformKind, offset: u32, data: UniformData<'_>) {
    let bytes: &[u8] = match data {
        UniformData::Float(values) => bytemuck::cast_slice(values),
        UniformData::Int(values) => bytemuck::cast_slice(values),
    };
    let offset = offset as usize;
    if kind == UniformKind::Mat3 {
        for (column, chunk) in bytes.chunks(12).take(3).enumerate() {
            let start = offset + column * 16;
            if let Some(dst) = block.get_mut(start..start + chunk.len()) {
                dst.copy_from_slice(chunk);
            }
        }
        return;
    }
    let len = bytes.len().min(kind.size() as usize);
    if let Some(dst) = block.get_mut(offset..offset + len) {
        dst.copy_from_slice(&bytes[..len]);
    }
}

fn create_default_target(device: &wgpu::Device, width: u32, height: u32) -> FramebufferEntry {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Default Framebuffer"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEFAULT_COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Default Depth"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEFAULT_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    FramebufferEntry {
        width,
        height,
        samples: 1,
        colors: smallvec::smallvec![ColorAttachment {
            msaa: None,
            view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            texture,
            format: DEFAULT_COLOR_FORMAT,
        }],
        depth: Some((
            depth.create_view(&wgpu::TextureViewDescriptor::default()),
            DEFAULT_DEPTH_FORMAT,
        )),
        textures: SmallVec::new(),
        mip_levels: 1,
    }
}

fn create_fallbacks(device: &wgpu::Device, queue: &wgpu::Queue) -> Fallbacks {
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Fallback Sampler"),
        ..Default::default()
    });
    let make = |label: &str, layers: u32, dimension: wgpu::TextureViewDimension| {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let white = vec![255u8; 4 * layers as usize];
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &white,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: layers,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        });
        TextureEntry {
            texture,
            view,
            sampler: sampler.clone(),
        }
    };
    Fallbacks {
        d2: make("Fallback 2D", 1, wgpu::TextureViewDimension::D2),
        cube: make("Fallback Cube", 6, wgpu::TextureViewDimension::Cube),
        d2_array: make("Fallback 2D Array", 1, wgpu::TextureViewDimension::D2Array),
    }
}

fn create_program_layouts(device: &wgpu::Device, label: &str, layout: &ProgramLayout) -> (wgpu::BindGroupLayout, wgpu::PipelineLayout) {
    let visibility = wgpu::ShaderStages::VERTEX_FRAGMENT;
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(u64::from(layout.block_size)),
        },
        count: None,
    }];
    for texture in &layout.textures {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture.binding,
            visibility,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: texture.kind.view_dimension(),
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: texture.binding + 1,
            visibility,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[Some(&bind_layout)],
        immediate_size: 0,
    });
    (bind_layout, pipeline_layout)
}

fn create_bind_group(
    device: &wgpu::Device,
    program: &ProgramEntry,
    ring: &wgpu::Buffer,
    textures: &[Option<TextureId>],
    entries: &FxHashMap<TextureId, TextureEntry>,
    fallbacks: &Fallbacks,
) -> wgpu::BindGroup {
    let mut resources: Vec<wgpu::BindGroupEntry<'_>> = vec![wgpu::BindGroupEntry {
        binding: 0,
        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: ring,
            offset: 0,
            size: NonZeroU64::new(u64::from(program.layout.block_size)),
        }),
    }];
    for (slot, decl) in program.layout.textures.iter().enumerate() {
        let fallback = match decl.kind.view_dimension() {
            wgpu::TextureViewDimension::Cube => &fallbacks.cube,
            wgpu::TextureViewDimension::D2Array => &fallbacks.d2_array,
            _ => &fallbacks.d2,
        };
        let entry = textures
            .get(slot)
            .copied()
            .flatten()
            .and_then(|id| entries.get(&id))
            .unwrap_or(fallback);
        resources.push(wgpu::BindGroupEntry {
            binding: decl.binding,
            resource: wgpu::BindingResource::TextureView(&entry.view),
        });
        resources.push(wgpu::BindGroupEntry {
            binding: decl.binding + 1,
            resource: wgpu::BindingResource::Sampler(&entry.sampler),
        });
    }
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: None,
        layout: &program.bind_layout,
        entries: &resources,
    })
}

fn create_pipeline(device: &wgpu::Device, program: &ProgramEntry, key: &PipelineKey) -> wgpu::RenderPipeline {
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
        .vertex
        .iter()
        .map(|(_, _, attrs)| {
            attrs
                .iter()
                .map(|&(location, format, offset)| wgpu::VertexAttribute {
                    format,
                    offset: u64::from(offset),
                    shader_location: location,
                })
                .collect()
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .vertex
        .iter()
        .zip(&attributes)
        .map(|((stride, step, _), attributes)| wgpu::VertexBufferLayout {
            array_stride: u64::from(*stride),
            step_mode: match step {
                StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                StepMode::Instance => wgpu::VertexStepMode::Instance,
            },
            attributes,
        })
        .collect();

    let raster = &key.raster;
    let targets: SmallVec<[Option<wgpu::ColorTargetState>; 4]> = key
        .colors
        .iter()
        .map(|&format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: raster.blend,
                write_mask: raster.color_writes,
            })
        })
        .collect();

    let depth_stencil = key.depth.map(|format| {
        let face = wgpu::StencilFaceState {
            compare: raster.stencil_func.compare,
            fail_op: raster.stencil_ops.fail,
            depth_fail_op: raster.stencil_ops.depth_fail,
            pass_op: raster.stencil_ops.pass,
        };
        let stencil = if raster.stencil_test && format.has_stencil_aspect() {
            wgpu::StencilState {
                front: face,
                back: face,
                read_mask: raster.stencil_func.mask,
                write_mask: raster.stencil_write_mask,
            }
        } else {
            wgpu::StencilState::default()
        };
        let bias = raster.polygon_offset.map_or_else(wgpu::DepthBiasState::default, |offset| {
            wgpu::DepthBiasState {
                constant: offset.units as i32,
                slope_scale: offset.factor,
                clamp: 0.0,
            }
        });
        wgpu::DepthStencilState {
            format,
            depth_write_enabled: Some(raster.depth_test && raster.depth_write),
            depth_compare: if raster.depth_test {
                Some(raster.depth_compare)
            } else {
                Some(wgpu::CompareFunction::Always)
            },
            stencil,
            bias,
        }
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: None,
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some("fs_main"),
            targets: &targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            strip_index_format: key.strip_index,
            front_face: raster.front_face,
            cull_mode: raster.cull_mode,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: key.samples,
            mask: !0,
            alpha_to_coverage_enabled: raster.alpha_to_coverage && key.samples > 1,
        },
        multiview_mask: None,
        cache: None,
    })
}

// ─── Readback ────────────────────────────────────────────────────────────

struct WgpuFence {
    buffer: wgpu::Buffer,
    receiver: flume::Receiver<std::result::Result<(), wgpu::BufferAsyncError>>,
    width: usize,
    height: usize,
    padded_row: usize,
    swap_rb: bool,
    done: AtomicBool,
}

impl ReadbackFence for WgpuFence {
    fn poll(&self) -> FenceStatus {
        if self.done.load(Ordering::Acquire) {
            return FenceStatus::Failed("readback already resolved".to_owned());
        }
        match self.receiver.try_recv() {
            Ok(Ok(())) => {
                self.done.store(true, Ordering::Release);
                let row = self.width * 4;
                let mut rgba = vec![0u8; row * self.height];
                {
                    let data = self.buffer.slice(..).get_mapped_range();
                    for y in 0..self.height {
                        let src = &data[y * self.padded_row..y * self.padded_row + row];
                        let dst = &mut rgba[y * row..(y + 1) * row];
                        dst.copy_from_slice(src);
                        if self.swap_rb {
                            for texel in dst.chunks_exact_mut(4) {
                                texel.swap(0, 2);
                            }
                        }
                    }
                }
                self.buffer.unmap();
                FenceStatus::Ready(rgba)
            }
            Ok(Err(err)) => {
                self.done.store(true, Ordering::Release);
                FenceStatus::Failed(err.to_string())
            }
            Err(flume::TryRecvError::Empty) => FenceStatus::Pending,
            Err(flume::TryRecvError::Disconnected) => {
                self.done.store(true, Ordering::Release);
                FenceStatus::Failed("device dropped the readback".to_owned())
            }
        }
    }
}

// ─── GpuDevice ───────────────────────────────────────────────────────────

impl GpuDevice for WgpuDevice {
    fn probe(&mut self) -> Capabilities {
        let mut caps = Capabilities::from_limits(&self.device.limits(), self.device.features());
        let counts = self
            .adapter
            .get_texture_format_features(DEFAULT_COLOR_FORMAT)
            .flags
            .supported_sample_counts();
        caps.max_samples = counts.into_iter().filter(|&c| c <= 4).max().unwrap_or(1);
        caps.half_float_render_targets = self
            .adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba16Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);
        caps
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> BufferId {
        let id = BufferId(self.allocate());
        let kind = match desc.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        let size = (desc.contents.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT).max(4);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage: kind | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        write_padded(&self.queue, &buffer, 0, desc.contents);
        self.buffers.insert(id, buffer);
        id
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(target) => write_padded(&self.queue, target, offset, data),
            None => log::warn!("write to unknown buffer {buffer:?}"),
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = TextureId(self.allocate());
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC;
        if desc.render_attachment || desc.mip_levels > 1 {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let layers = match desc.dimension {
            TextureDimension::Cube => 6,
            TextureDimension::D2 | TextureDimension::D2Array => desc.layers.max(1),
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: layers,
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: desc.samples.max(1),
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: &[],
        });
        let dimension = match desc.dimension {
            TextureDimension::D2 => wgpu::TextureViewDimension::D2,
            TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(dimension),
            ..Default::default()
        });
        let sampler = self.create_sampler(&desc.sampler);
        self.textures.insert(id, TextureEntry {
            texture,
            view,
            sampler,
        });
        id
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, mip_level: u32, data: &[u8]) {
        let Some(entry) = self.textures.get(&texture) else {
            log::warn!("write to unknown texture {texture:?}");
            return;
        };
        let format = entry.texture.format();
        let (block_w, block_h) = format.block_dimensions();
        let Some(block_size) = format.block_copy_size(None) else {
            log::warn!("texture format {format:?} cannot be written");
            return;
        };
        let width = (entry.texture.width() >> mip_level).max(1);
        let height = (entry.texture.height() >> mip_level).max(1);
        let bytes_per_row = width.div_ceil(block_w) * block_size;
        let rows = height.div_ceil(block_h);
        if data.len() < (bytes_per_row * rows) as usize {
            log::warn!(
                "texture {texture:?} level {mip_level}: expected {} bytes, got {}",
                bytes_per_row * rows,
                data.len()
            );
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(rows),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        self.commands.push(Command::Mipmaps(texture));
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.remove_bind_groups_with(texture);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Framebuffer {
        let id = FramebufferId(self.allocate());
        let size = wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: 1,
        };
        let samples = desc.samples.max(1);
        let mip_levels = desc.mip_levels.max(1);

        let mut colors = SmallVec::new();
        let mut textures = SmallVec::new();
        for (i, &format) in desc.color_formats.iter().enumerate() {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{} color {i}", desc.label)),
                size,
                mip_level_count: mip_levels,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let msaa = (samples > 1).then(|| {
                self.device
                    .create_texture(&wgpu::TextureDescriptor {
                        label: Some(&format!("{} msaa {i}", desc.label)),
                        size,
                        mip_level_count: 1,
                        sample_count: samples,
                        dimension: wgpu::TextureDimension::D2,
                        format,
                        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                        view_formats: &[],
                    })
                    .create_view(&wgpu::TextureViewDescriptor::default())
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: 0,
                mip_level_count: Some(1),
                ..Default::default()
            });
            let sampled = TextureEntry {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                sampler: self.create_sampler(&desc.sampler),
                texture: texture.clone(),
            };
            let texture_id = TextureId(self.allocate());
            self.textures.insert(texture_id, sampled);
            textures.push(texture_id);
            colors.push(ColorAttachment {
                msaa,
                view,
                texture,
                format,
            });
        }

        let depth = desc.depth_format.map(|format| {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{} depth", desc.label)),
                size,
                mip_level_count: 1,
                sample_count: samples,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            (texture.create_view(&wgpu::TextureViewDescriptor::default()), format)
        });

        let framebuffer = Framebuffer {
            id,
            color_textures: textures.clone(),
            depth_texture: None,
        };
        self.framebuffers.insert(id, FramebufferEntry {
            width: size.width,
            height: size.height,
            samples,
            colors,
            depth,
            textures,
            mip_levels,
        });
        framebuffer
    }

    fn resolve_framebuffer(&mut self, framebuffer: FramebufferId) {
        // Multisampled attachments resolve at the end of every pass; only
        // the mip chain is left to build.
        if let Some(entry) = self.framebuffers.get(&framebuffer)
            && entry.mip_levels > 1
        {
            let textures = entry.textures.clone();
            self.commands.extend(textures.into_iter().map(Command::Mipmaps));
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(entry) = self.framebuffers.remove(&framebuffer) {
            for texture in entry.textures {
                self.destroy_texture(texture);
            }
        }
        if self.state.framebuffer == Some(framebuffer) {
            self.state.framebuffer = None;
        }
    }

    fn create_program(&mut self, program: &ProgramSource) -> std::result::Result<ProgramId, ProgramDiagnostics> {
        validate_wgsl(&program.label, &program.source)?;
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&program.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(program.source.clone())),
        });
        let (bind_layout, pipeline_layout) = create_program_layouts(&self.device, &program.label, &program.layout);
        let id = ProgramId(self.allocate());
        self.programs.insert(id, ProgramEntry {
            module,
            bind_layout,
            pipeline_layout,
            block: vec![0; program.layout.block_size as usize],
            texture_units: (0..program.layout.textures.len() as u32).collect(),
            layout: program.layout.clone(),
        });
        log::debug!("Created program {id:?} `{}`", program.label);
        Ok(id)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        self.bind_groups.retain(|(p, _), _| *p != program);
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        self.state.program = Some(program);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
    }

    fn set_scissor(&mut self, rect: ScissorRect) {
        self.state.scissor = Some(rect);
    }

    fn set_scissor_test(&mut self, enabled: bool) {
        self.state.scissor_test = enabled;
    }

    fn set_blend(&mut self, blend: Option<wgpu::BlendState>) {
        self.state.raster.blend = blend;
    }

    fn set_blend_constant(&mut self, color: [f32; 4]) {
        self.state.blend_constant = color;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.state.raster.depth_test = enabled;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.raster.depth_write = enabled;
    }

    fn set_depth_compare(&mut self, compare: wgpu::CompareFunction) {
        self.state.raster.depth_compare = compare;
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.state.raster.stencil_test = enabled;
    }

    fn set_stencil_write_mask(&mut self, mask: u32) {
        self.state.raster.stencil_write_mask = mask;
    }

    fn set_stencil_func(&mut self, func: StencilFunc) {
        self.state.raster.stencil_func = func;
    }

    fn set_stencil_op(&mut self, ops: StencilOps) {
        self.state.raster.stencil_ops = ops;
    }

    fn set_cull_mode(&mut self, face: Option<wgpu::Face>) {
        self.state.raster.cull_mode = face;
    }

    fn set_front_face(&mut self, front_face: wgpu::FrontFace) {
        self.state.raster.front_face = front_face;
    }

    fn set_color_write_mask(&mut self, mask: wgpu::ColorWrites) {
        self.state.raster.color_writes = mask;
    }

    fn set_polygon_offset(&mut self, offset: Option<PolygonOffset>) {
        self.state.raster.polygon_offset = offset;
    }

    fn set_alpha_to_coverage(&mut self, enabled: bool) {
        self.state.raster.alpha_to_coverage = enabled;
    }

    fn clear(&mut self, request: ClearRequest) {
        self.commands.push(Command::Clear {
            target: self.state.framebuffer,
            request,
        });
    }

    fn set_uniform(&mut self, program: ProgramId, slot: u32, data: UniformData<'_>) {
        let Some(entry) = self.programs.get_mut(&program) else {
            return;
        };
        let Some(decl) = entry.layout.uniforms.get(slot as usize) else {
            return;
        };
        write_uniform(&mut entry.block, decl.kind, decl.offset, data);
    }

    fn set_texture_slot(&mut self, program: ProgramId, slot: u32, unit: u32) {
        if let Some(entry) = self.programs.get_mut(&program)
            && let Some(current) = entry.texture_units.get_mut(slot as usize)
        {
            *current = unit;
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        let unit = unit as usize;
        if self.state.units.len() <= unit {
            self.state.units.resize(unit + 1, None);
        }
        self.state.units[unit] = texture;
    }

    fn set_vertex_attribute(&mut self, location: u32, binding: VertexBinding) {
        self.state.attributes.insert(location, binding);
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.state.attributes.remove(&location);
    }

    fn set_index_buffer(&mut self, index: Option<(BufferId, wgpu::IndexFormat)>) {
        self.state.index = index;
    }

    fn draw(&mut self, call: &DrawCall) {
        let Some(program) = self.state.program else {
            log::warn!("Skipping draw without a program");
            return;
        };
        let Some(entry) = self.programs.get(&program) else {
            return;
        };
        let Some(slots) = self.vertex_slots(&entry.layout) else {
            return;
        };
        let Some(target) = self.target(self.state.framebuffer) else {
            log::warn!("Skipping draw into destroyed framebuffer");
            return;
        };

        let strip = matches!(
            call.topology,
            wgpu::PrimitiveTopology::TriangleStrip | wgpu::PrimitiveTopology::LineStrip
        );
        let index = if call.indexed { self.state.index } else { None };
        let pipeline = PipelineKey {
            program,
            colors: target.colors.iter().map(|c| c.format).collect(),
            depth: target.depth.as_ref().map(|(_, format)| *format),
            samples: target.samples,
            topology: call.topology,
            strip_index: if strip { index.map(|(_, format)| format) } else { None },
            raster: self.state.raster,
            vertex: slots
                .iter()
                .map(|slot| (slot.stride, slot.step, slot.attributes.clone()))
                .collect(),
        };
        let textures = entry
            .texture_units
            .iter()
            .map(|&unit| self.state.units.get(unit as usize).copied().flatten())
            .collect();

        let uniform_offset = self.ring.len().next_multiple_of(self.ring_alignment as usize);
        self.ring.resize(uniform_offset, 0);
        self.ring.extend_from_slice(&entry.block);

        let draw = RecordedDraw {
            pipeline,
            program,
            uniform_offset: uniform_offset as u32,
            textures,
            slots: slots
                .iter()
                .map(|slot| (slot.buffer, u64::from(slot.base)))
                .collect(),
            index,
            viewport: self.state.viewport,
            scissor: self.state.scissor_test.then_some(self.state.scissor).flatten(),
            blend_constant: self.state.blend_constant,
            stencil_reference: self.state.raster.stencil_func.reference,
            call: *call,
        };
        self.commands.push(Command::Draw {
            target: self.state.framebuffer,
            draw: Box::new(draw),
        });
    }

    fn flush(&mut self) {
        self.submit();
    }

    fn discard_frame(&mut self) {
        let before = self.commands.len();
        self.commands.retain(|command| matches!(command, Command::Mipmaps(_)));
        self.ring.clear();
        log::debug!("Discarded {} unsubmitted commands", before - self.commands.len());
    }

    fn read_pixels(
        &mut self,
        framebuffer: Option<FramebufferId>,
        rect: ReadRect,
    ) -> std::result::Result<Arc<dyn ReadbackFence>, String> {
        self.submit();
        let target = self
            .target(framebuffer)
            .ok_or_else(|| format!("unknown framebuffer {framebuffer:?}"))?;
        let color = target
            .colors
            .first()
            .ok_or_else(|| "framebuffer has no color attachment".to_owned())?;
        if rect.x + rect.width > target.width || rect.y + rect.height > target.height {
            return Err(format!(
                "read rect {}x{} at ({}, {}) exceeds {}x{}",
                rect.width, rect.height, rect.x, rect.y, target.width, target.height
            ));
        }
        let swap_rb = match color.format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => false,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => true,
            other => return Err(format!("cannot read back {other:?} as RGBA8")),
        };

        let row = rect.width * 4;
        let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: u64::from(padded_row) * u64::from(rect.height.max(1)),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = flume::bounded(1);
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        Ok(Arc::new(WgpuFence {
            buffer,
            receiver,
            width: rect.width as usize,
            height: rect.height as usize,
            padded_row: padded_row as usize,
            swap_rb,
            done: AtomicBool::new(false),
        }))
    }

    fn poll(&mut self) {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("wgpu poll failed: {err}");
        }
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn restore_context(&mut self) -> bool {
        match pollster::block_on(connect(&self.instance)) {
            Ok(connection) => {
                let (width, height) = self.default_framebuffer_size();
                let instance = self.instance.clone();
                *self = Self::from_connection(instance, connection, width, height);
                true
            }
            Err(err) => {
                log::error!("Failed to restore wgpu device: {err}");
                false
            }
        }
    }

    fn default_framebuffer_size(&self) -> (u32, u32) {
        (self.default_target.width, self.default_target.height)
    }

    fn default_framebuffer_format(&self) -> wgpu::TextureFormat {
        DEFAULT_COLOR_FORMAT
    }
}

/// Queue writes must be 4-byte multiples; the tail is zero padded.
fn write_padded(queue: &wgpu::Queue, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        log::warn!("unaligned buffer write at offset {offset} dropped");
        return;
    }
    if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
        queue.write_buffer(buffer, offset, data);
    } else {
        let mut padded = data.to_vec();
        padded.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
        let room = buffer.size().saturating_sub(offset) as usize;
        padded.truncate(room - room % wgpu::COPY_BUFFER_ALIGNMENT as usize);
        queue.write_buffer(buffer, offset, &padded);
    }
}
