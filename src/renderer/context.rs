//! Device-side state of a renderer and the per-draw path.
//!
//! [`GpuContext`] owns the device together with every cache and binder in
//! front of it. [`GpuContext::draw`] turns one drawable into device calls:
//! it resolves the program variant, synchronises buffers, applies the
//! material state, uploads uniforms, binds textures and issues the draw.
//!
//! Program variants are held per material, one cache reference per
//! distinct key. A version change retires the previous variants; they are
//! released at the end of the frame, after the new variants were acquired,
//! so an unchanged key never drops to zero users in between.

use glam::{Affine3A, Mat3, Mat4, Vec2, Vec3};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::binder::{AttributeBinder, UniformBinder};
use super::core::capabilities::Capabilities;
use super::core::device::{
    BufferKind, DrawCall, GpuDevice, ProgramId, TextureId, VertexBinding,
};
use super::info::{CompileFailure, RenderInfo};
use super::lights::{LightsState, ShadowLightKind};
use super::pipeline::{
    Builtin, Clipping, CompiledProgram, CustomBinding, DrawContext, ProgramCache, ProgramHandle,
    ProgramKey, ProgramParameters, VertexSource, derive_parameters,
};
use super::resources::{BufferCache, GeometryCache, RenderTargetCache, TextureCache};
use super::settings::RendererSettings;
use super::shadow::ShadowUniforms;
use super::state::StateTracker;
use super::uniform_upload::UniformWriter;
use crate::assets::{RenderTargetHandle, TextureHandle};
use crate::errors::{ConfigurationError, ProgramDiagnostics, Result};
use crate::resources::buffer::{BufferAttribute, ElementFormat, StepMode};
use crate::resources::geometry::{Geometry, GeometryGroup};
use crate::resources::material::{MapSlot, Material, MaterialKind, MaterialSettings, Side};
use crate::resources::render_target::RenderTarget;
use crate::resources::texture::{Texture, TextureSource};
use crate::resources::uniforms::UniformValue;
use crate::resources::version_tracker::ResourceId;
use crate::scene::drawable::{DrawMode, Drawable, Instances};
use crate::scene::fog::Fog;
use crate::scene::node::Node;
use crate::scene::{NodeHandle, Scene};

/// Kind of pass a draw belongs to. Draw bindings are cached per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Main,
    Transmission,
    Shadow,
    Fullscreen,
}

/// Camera inputs of one pass.
#[derive(Debug, Clone, Copy)]
pub struct ViewInputs {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub to_screen: bool,
    pub pass: PassKind,
}

/// Frame-wide inputs shared by every draw of a pass.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub settings: &'a RendererSettings,
    pub lights: &'a LightsState,
    pub shadows: &'a ShadowUniforms,
    pub fog: Option<Fog>,
    pub environment: Option<TextureHandle>,
    /// Transmission background and its size in texels.
    pub transmission: Option<(TextureId, Vec2)>,
    /// Bound to custom texture uniforms that carry no texture.
    pub source_texture: Option<TextureId>,
    /// Resolve programs without issuing draws.
    pub compile_only: bool,
}

/// Texture storage a draw may sample from.
#[derive(Clone, Copy)]
pub struct TextureSources<'a> {
    pub textures: &'a SlotMap<TextureHandle, Texture>,
    pub render_targets: &'a SlotMap<RenderTargetHandle, RenderTarget>,
}

/// One draw of a geometry with a material.
#[derive(Clone, Copy)]
pub struct DrawRequest<'m> {
    pub world: Affine3A,
    pub node: Option<NodeHandle>,
    /// Program, uniforms and fixed-function state.
    pub material: &'m Material,
    /// Local clipping planes; the drawn material's in every pass but the
    /// shadow pass, which clips with the caster's planes.
    pub clip_source: &'m MaterialSettings,
    pub side: Option<Side>,
    pub group: Option<GeometryGroup>,
}

#[derive(Debug, Default)]
struct MaterialPrograms {
    version: Option<u64>,
    variants: SmallVec<[(ProgramKey, ProgramHandle); 2]>,
    retired: SmallVec<[ProgramHandle; 2]>,
    /// Failed programs hit again after the version change compile once more.
    retry_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DrawSlot {
    material: ResourceId,
    geometry: ResourceId,
    node: Option<NodeHandle>,
    pass: PassKind,
}

/// Every input of key derivation; equal signatures derive equal keys.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DrawSignature {
    material_version: u64,
    lights_version: u64,
    settings_hash: u64,
    geometry_layout: u64,
    mode: DrawMode,
    bones: usize,
    morph_targets: usize,
    instancing: bool,
    instance_colors: bool,
    receive_shadow: bool,
    fog: Option<bool>,
    environment: bool,
    to_screen: bool,
    reversed_depth: bool,
    clipping: Clipping,
}

#[derive(Debug, Clone, Copy)]
struct DrawBinding {
    signature: DrawSignature,
    program: ProgramHandle,
}

pub struct GpuContext<D: GpuDevice> {
    pub device: D,
    pub capabilities: Capabilities,
    pub state: StateTracker,
    pub uniforms: UniformBinder,
    pub attributes: AttributeBinder,
    pub programs: ProgramCache,
    pub buffers: BufferCache,
    pub geometries: GeometryCache,
    pub textures: TextureCache,
    pub render_targets: RenderTargetCache,
    pub info: RenderInfo,
    /// Frame number, for once-per-frame buffer synchronisation.
    pub frame: u64,
    materials: FxHashMap<ResourceId, MaterialPrograms>,
    draws: FxHashMap<DrawSlot, DrawBinding>,
    diagnostics: FxHashMap<ResourceId, ProgramDiagnostics>,
    failures: Vec<CompileFailure>,
    clipping: Vec<glam::Vec4>,
    /// Instance streams uploaded for each node; released once the node or
    /// its stream is gone.
    instance_streams: FxHashMap<NodeHandle, SmallVec<[ResourceId; 2]>>,
}

impl<D: GpuDevice> GpuContext<D> {
    pub fn new(mut device: D) -> Self {
        let capabilities = device.probe();
        capabilities.log_summary();
        Self {
            uniforms: UniformBinder::new(capabilities.max_texture_units),
            device,
            capabilities,
            state: StateTracker::new(),
            attributes: AttributeBinder::new(),
            programs: ProgramCache::new(),
            buffers: BufferCache::new(),
            geometries: GeometryCache::new(),
            textures: TextureCache::new(),
            render_targets: RenderTargetCache::new(),
            info: RenderInfo::default(),
            frame: 0,
            materials: FxHashMap::default(),
            draws: FxHashMap::default(),
            diagnostics: FxHashMap::default(),
            failures: Vec::new(),
            clipping: Vec::new(),
            instance_streams: FxHashMap::default(),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Forgets every device object without device calls. Caches rebuild
    /// lazily on the next frame.
    pub fn invalidate(&mut self) {
        self.programs.invalidate();
        self.buffers.invalidate();
        self.geometries.invalidate();
        self.textures.invalidate();
        self.render_targets.invalidate();
        self.materials.clear();
        self.draws.clear();
        self.diagnostics.clear();
        self.instance_streams.clear();
        self.state.reset();
        self.attributes.reset();
        self.uniforms.reset(self.capabilities.max_texture_units);
    }

    /// Re-probes capabilities after the device came back.
    pub fn reprobe(&mut self) {
        self.capabilities = self.device.probe();
        self.capabilities.log_summary();
        self.uniforms.reset(self.capabilities.max_texture_units);
    }

    /// Releases the variants retired during the frame.
    pub fn end_frame(&mut self) {
        let mut released = Vec::new();
        for entry in self.materials.values_mut() {
            released.extend(entry.retired.drain(..));
            entry.retry_failed = false;
        }
        for handle in released {
            self.release_program(handle);
        }
    }

    /// Destroys instance buffers whose node was removed or whose
    /// [`Instances`] were replaced.
    pub fn release_instance_streams(&mut self, scene: &Scene) {
        let (buffers, device) = (&mut self.buffers, &mut self.device);
        self.instance_streams.retain(|&node, streams| {
            let live: SmallVec<[ResourceId; 2]> = scene
                .get(node)
                .and_then(Node::as_drawable)
                .and_then(|d| d.instances.as_ref())
                .map(|instances| instances.streams().map(BufferAttribute::id).collect())
                .unwrap_or_default();
            streams.retain(|id| {
                let keep = live.contains(id);
                if !keep {
                    buffers.remove(device, *id);
                }
                keep
            });
            !streams.is_empty()
        });
    }

    fn track_instance_streams(&mut self, node: NodeHandle, streams: SmallVec<[ResourceId; 2]>) {
        let Some(previous) = self.instance_streams.insert(node, streams) else {
            return;
        };
        let current = &self.instance_streams[&node];
        for id in previous {
            if !current.contains(&id) {
                self.buffers.remove(&mut self.device, id);
            }
        }
    }

    pub fn take_failures(&mut self) -> Vec<CompileFailure> {
        std::mem::take(&mut self.failures)
    }

    #[must_use]
    pub fn material_diagnostics(&self, material: ResourceId) -> Option<&ProgramDiagnostics> {
        self.diagnostics.get(&material)
    }

    fn release_program(&mut self, handle: ProgramHandle) {
        let id = self.programs.program(handle).map(|p| p.id);
        self.programs.release(&mut self.device, handle);
        if let Some(id) = id
            && self.programs.get(handle).is_none()
        {
            self.uniforms.forget_program(id);
        }
    }

    // ─── Disposal ────────────────────────────────────────────────────────

    pub fn dispose_material(&mut self, material: ResourceId) {
        if let Some(entry) = self.materials.remove(&material) {
            let handles: Vec<_> = entry
                .variants
                .iter()
                .map(|(_, h)| *h)
                .chain(entry.retired.iter().copied())
                .collect();
            for handle in handles {
                self.release_program(handle);
            }
        }
        self.draws.retain(|slot, _| slot.material != material);
        self.diagnostics.remove(&material);
        log::debug!("Material {material}: disposed");
    }

    pub fn dispose_geometry(&mut self, geometry: ResourceId) {
        self.geometries
            .dispose(&mut self.device, &mut self.buffers, geometry);
        self.draws.retain(|slot, _| slot.geometry != geometry);
    }

    pub fn dispose_texture(&mut self, texture: ResourceId) {
        if let Some(id) = self.textures.remove(&mut self.device, texture) {
            self.state.forget_texture(id);
        }
    }

    pub fn dispose_render_target(&mut self, target: ResourceId) {
        if let Some(entry) = self.render_targets.get(target) {
            for &texture in &entry.framebuffer.color_textures {
                self.state.forget_texture(texture);
            }
        }
        self.render_targets.remove(&mut self.device, target);
    }

    // ─── Programs ────────────────────────────────────────────────────────

    fn material_program(&mut self, material: &Material, params: &ProgramParameters) -> ProgramHandle {
        let id = material.id();
        let key = params.key();
        let shader = match material.kind() {
            MaterialKind::Shader(shader) => Some(shader),
            _ => None,
        };

        let entry = self.materials.entry(id).or_default();
        if entry.version != Some(material.version()) {
            if entry.version.is_some() {
                entry.retired.extend(entry.variants.drain(..).map(|(_, h)| h));
                entry.retry_failed = true;
                self.diagnostics.remove(&id);
            }
            entry.version = Some(material.version());
        }

        let handle = match entry.variants.iter().find(|(k, _)| *k == key) {
            Some(&(_, handle)) => handle,
            None => {
                let cached = self.programs.find(&key);
                let handle = self.programs.acquire(&mut self.device, params, shader);
                entry.variants.push((key, handle));
                if entry.retry_failed
                    && cached.is_some()
                    && self.programs.diagnostics(handle).is_some()
                {
                    self.programs.recompile(&mut self.device, handle, shader);
                }
                handle
            }
        };

        if let Some(diagnostics) = self.programs.diagnostics(handle)
            && self.diagnostics.get(&id) != Some(diagnostics)
        {
            log::error!("Material {id}: {diagnostics}");
            self.diagnostics.insert(id, diagnostics.clone());
            self.failures.push(CompileFailure {
                material: id,
                diagnostics: diagnostics.clone(),
            });
        }
        handle
    }

    fn resolve_texture(&mut self, sources: &TextureSources<'_>, handle: TextureHandle) -> Result<Option<TextureId>> {
        let Some(texture) = sources.textures.get(handle) else {
            return Ok(None);
        };
        Ok(match texture.source() {
            TextureSource::RenderTarget { target, attachment } => sources
                .render_targets
                .get(*target)
                .and_then(|target| self.render_targets.get(target.id()))
                .and_then(|target| target.color_texture(*attachment)),
            TextureSource::Image(_) => {
                texture.sampler.validate_for(texture.device_format())?;
                self.textures.update(&mut self.device, texture, &self.capabilities)
            }
        })
    }

    // ─── Draw ────────────────────────────────────────────────────────────

    /// Draws `geometry` with `request.material`. A program that failed to
    /// compile skips the draw; resource errors abort it.
    pub fn draw(
        &mut self,
        mut drawable: Option<&mut Drawable>,
        geometry: &mut Geometry,
        sources: &TextureSources<'_>,
        request: &DrawRequest<'_>,
        view: &ViewInputs,
        frame: &FrameInputs<'_>,
    ) -> Result<()> {
        if !geometry.has_attribute(Geometry::POSITION) {
            return Err(ConfigurationError::MissingAttribute {
                attribute: Geometry::POSITION,
            }
            .into());
        }
        let material = request.material;
        let drawn = drawable.as_deref();
        let mode = drawn.map_or(DrawMode::Triangles, |d| d.mode);
        let bones = drawn
            .and_then(|d| d.skin.as_ref())
            .map_or(0, |s| s.bone_matrices.len());
        let morph_targets = drawn.map_or(0, |d| {
            d.morph_influences.len().min(geometry.morph_target_count())
        });
        let instances = drawn.and_then(|d| d.instances.as_ref());
        let receive_shadow = drawn.is_some_and(|d| d.receive_shadow);
        let rendering_shadows = view.pass == PassKind::Shadow;
        let clipping = Clipping::gather(
            frame.settings,
            request.clip_source,
            rendering_shadows,
            &mut self.clipping,
        );

        let signature = DrawSignature {
            material_version: material.version(),
            lights_version: frame.lights.version(),
            settings_hash: frame.settings.program_hash(),
            geometry_layout: geometry.layout_version(),
            mode,
            bones,
            morph_targets,
            instancing: instances.is_some(),
            instance_colors: instances.is_some_and(|i| i.colors().is_some()),
            receive_shadow,
            fog: frame.fog.map(|f| matches!(f, Fog::Exp2 { .. })),
            environment: frame.environment.is_some(),
            to_screen: view.to_screen,
            reversed_depth: self.state.reversed_depth(),
            clipping,
        };
        let slot = DrawSlot {
            material: material.id(),
            geometry: geometry.id(),
            node: request.node,
            pass: view.pass,
        };

        let cached = self
            .draws
            .get(&slot)
            .filter(|b| b.signature == signature && self.programs.get(b.program).is_some())
            .map(|b| b.program);
        let handle = match cached {
            Some(handle) => handle,
            None => {
                let context = DrawContext {
                    geometry,
                    mode,
                    bones,
                    morph_targets,
                    instancing: signature.instancing,
                    instance_colors: signature.instance_colors,
                    receive_shadow,
                    fog: frame.fog.as_ref(),
                    environment: signature.environment,
                    to_screen: view.to_screen,
                    rendering_shadows,
                    reversed_depth: signature.reversed_depth,
                    clipping,
                    max_vertex_attributes: self.capabilities.max_vertex_attributes,
                    max_vertex_buffers: self.capabilities.max_vertex_buffers,
                };
                let params = derive_parameters(material, &frame.lights.hash(), &context, frame.settings);
                let handle = self.material_program(material, &params);
                self.draws.insert(slot, DrawBinding { signature, program: handle });
                handle
            }
        };
        if frame.compile_only {
            return Ok(());
        }
        let (Some(program), Some(key)) = (
            self.programs.program(handle).cloned(),
            self.programs.key(handle).copied(),
        ) else {
            self.info.skipped_draws += 1;
            return Ok(());
        };

        let indexed = self.bind_geometry(drawable.as_deref_mut(), request.node, geometry, &program)?;

        let flip_sided = request.world.matrix3.determinant() < 0.0;
        self.state
            .set_material(&mut self.device, material.settings(), flip_sided, request.side);
        self.state.use_program(&mut self.device, program.id);
        self.uniforms.reset_texture_units();

        self.upload_uniforms(drawable.as_deref(), geometry, request, view, frame, &program, &key);
        self.bind_textures(sources, material, frame, &program)?;

        let element_count = geometry.element_count();
        let range_start = geometry.draw_range.start.min(element_count);
        let range_end = geometry
            .draw_range
            .count
            .map_or(element_count, |c| range_start.saturating_add(c).min(element_count));
        let (start, end) = match request.group {
            Some(group) => (
                group.start.max(range_start),
                group.start.saturating_add(group.count).min(range_end),
            ),
            None => (range_start, range_end),
        };
        let instances = drawable
            .as_deref()
            .and_then(|d| d.instances.as_ref())
            .map_or(1, Instances::count);
        if end <= start || instances == 0 {
            return Ok(());
        }

        let call = DrawCall {
            topology: mode.topology(),
            indexed,
            first: start,
            count: end - start,
            instances,
        };
        self.device.draw(&call);
        self.info.record_draw(call.topology, call.count, instances);
        Ok(())
    }

    /// Synchronises and binds every vertex input and the index buffer.
    /// Returns whether the draw is indexed.
    fn bind_geometry(
        &mut self,
        mut drawable: Option<&mut Drawable>,
        node: Option<NodeHandle>,
        geometry: &mut Geometry,
        program: &CompiledProgram,
    ) -> Result<bool> {
        let frame = self.frame;
        self.geometries
            .track(&mut self.device, &mut self.buffers, geometry);

        let mut instance_buffers = (None, None);
        if let Some(instances) = drawable.as_mut().and_then(|d| d.instances.as_mut()) {
            if let Some(node) = node {
                self.track_instance_streams(node, instances.streams().map(BufferAttribute::id).collect());
            }
            let mut streams = instances.streams_mut();
            if let Some(matrices) = streams.next() {
                let gpu = self
                    .buffers
                    .update(&mut self.device, matrices, BufferKind::Vertex, frame)?;
                instance_buffers.0 = Some(gpu.id);
            }
            if let Some(colors) = streams.next() {
                let gpu = self
                    .buffers
                    .update(&mut self.device, colors, BufferKind::Vertex, frame)?;
                instance_buffers.1 = Some((gpu.id, colors.stride()));
            }
        }

        self.attributes.begin();
        for (location, source) in program.bindings.vertex.iter().enumerate() {
            let location = location as u32;
            let binding = match *source {
                VertexSource::InstanceMatrix(column) => instance_buffers.0.map(|buffer| VertexBinding {
                    buffer,
                    format: wgpu::VertexFormat::Float32x4,
                    stride: Instances::MATRIX_STRIDE,
                    offset: 16 * u32::from(column),
                    step: StepMode::Instance,
                }),
                VertexSource::InstanceColor => instance_buffers.1.map(|(buffer, stride)| VertexBinding {
                    buffer,
                    format: wgpu::VertexFormat::Float32x3,
                    stride,
                    offset: 0,
                    step: StepMode::Instance,
                }),
                VertexSource::Attribute(name) => match geometry.attribute_mut(name) {
                    Some(attribute) => self.vertex_binding(attribute, frame)?,
                    None => None,
                },
                VertexSource::Morph { attribute, target } => {
                    match geometry.morph_attribute_mut(attribute, usize::from(target)) {
                        Some(attribute) => self.vertex_binding(attribute, frame)?,
                        None => None,
                    }
                }
            };
            if let Some(binding) = binding {
                self.attributes.bind(&mut self.device, location, binding);
            }
        }
        self.attributes.disable_unused(&mut self.device);

        let index = match geometry.index_mut() {
            Some(index) => {
                let gpu = self
                    .buffers
                    .update(&mut self.device, index, BufferKind::Index, frame)?;
                match index.format() {
                    ElementFormat::Index(format) => Some((gpu.id, format)),
                    ElementFormat::Vertex(_) => None,
                }
            }
            None => None,
        };
        self.attributes.bind_index(&mut self.device, index);
        Ok(index.is_some())
    }

    fn vertex_binding(&mut self, attribute: &mut BufferAttribute, frame: u64) -> Result<Option<VertexBinding>> {
        let ElementFormat::Vertex(format) = attribute.format() else {
            return Ok(None);
        };
        let gpu = self
            .buffers
            .update(&mut self.device, attribute, BufferKind::Vertex, frame)?;
        Ok(Some(VertexBinding {
            buffer: gpu.id,
            format,
            stride: attribute.stride(),
            offset: 0,
            step: attribute.step(),
        }))
    }

    fn upload_uniforms(
        &mut self,
        drawable: Option<&Drawable>,
        geometry: &Geometry,
        request: &DrawRequest<'_>,
        view: &ViewInputs,
        frame: &FrameInputs<'_>,
        program: &CompiledProgram,
        key: &ProgramKey,
    ) {
        let model = Mat4::from(request.world);
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let mut w = UniformWriter {
            binder: &mut self.uniforms,
            device: &mut self.device,
            program: program.id,
            bindings: &program.bindings,
        };

        w.mat4(Builtin::ModelMatrix, &model);
        w.mat3(Builtin::NormalMatrix, &normal);
        w.mat4(Builtin::ViewMatrix, &view.view);
        w.mat4(Builtin::ProjectionMatrix, &view.projection);
        w.vec3(Builtin::CameraPosition, view.position);
        w.float(Builtin::ToneMappingExposure, frame.settings.tone_mapping_exposure);
        w.material(request.material);
        w.lights(frame.lights);
        if let Some(fog) = &frame.fog {
            w.fog(fog);
        }

        if let Some(drawable) = drawable {
            let morphs = usize::from(key.morph_targets);
            if morphs > 0 {
                let influences = &drawable.morph_influences[..morphs.min(drawable.morph_influences.len())];
                let base = if geometry.morph_targets_relative {
                    1.0
                } else {
                    1.0 - influences.iter().sum::<f32>()
                };
                w.float(Builtin::MorphBaseInfluence, base);
                w.packed_scalars(Builtin::MorphInfluences, influences, morphs);
            }
            if key.bones > 0
                && let Some(skin) = &drawable.skin
            {
                w.mat4_array(Builtin::BoneMatrices, &skin.bone_matrices, usize::from(key.bones));
            }
        }

        let planes = usize::from(key.clipping_planes);
        if planes > 0 {
            w.vec4_array(Builtin::ClippingPlanes, &self.clipping, planes);
        }

        let bindings = &program.bindings;
        let directional = bindings.shadow_maps(ShadowLightKind::Directional).len();
        let spot = bindings.shadow_maps(ShadowLightKind::Spot).len();
        let point = bindings.shadow_maps(ShadowLightKind::Point).len();
        w.mat4_array(Builtin::DirectionalShadowMatrices, &frame.shadows.directional_matrices, directional);
        w.vec4_array(Builtin::DirectionalShadowParams, &frame.shadows.directional_params, directional * 2);
        w.mat4_array(Builtin::SpotShadowMatrices, &frame.shadows.spot_matrices, spot);
        w.vec4_array(Builtin::SpotShadowParams, &frame.shadows.spot_params, spot * 2);
        w.vec4_array(Builtin::PointShadowParams, &frame.shadows.point_params, point * 2);

        if let Some((_, size)) = frame.transmission {
            w.vec2(Builtin::TransmissionSamplerSize, size);
        }
    }

    fn bind_textures(
        &mut self,
        sources: &TextureSources<'_>,
        material: &Material,
        frame: &FrameInputs<'_>,
        program: &CompiledProgram,
    ) -> Result<()> {
        let id: ProgramId = program.id;
        let bindings = &program.bindings;

        if let MaterialKind::Shader(shader) = material.kind() {
            for ((_, value), binding) in shader.uniforms().iter().zip(&bindings.custom) {
                if let (UniformValue::Texture(handle), CustomBinding::Texture(slot)) = (value, *binding) {
                    let texture = match handle {
                        Some(handle) => self.resolve_texture(sources, *handle)?,
                        None => frame.source_texture,
                    };
                    self.uniforms
                        .set_texture(&mut self.device, &mut self.state, id, slot, texture);
                }
            }
        }

        for map in MapSlot::ALL {
            let Some(slot) = bindings.map(map) else {
                continue;
            };
            let handle = material.maps().get(map).or(match map {
                MapSlot::EnvMap => frame.environment,
                _ => None,
            });
            let texture = match handle {
                Some(handle) => self.resolve_texture(sources, handle)?,
                None => None,
            };
            self.uniforms
                .set_texture(&mut self.device, &mut self.state, id, slot, texture);
        }

        for kind in [ShadowLightKind::Directional, ShadowLightKind::Spot, ShadowLightKind::Point] {
            let maps = frame.shadows.maps(kind);
            for (i, &slot) in bindings.shadow_maps(kind).iter().enumerate() {
                let texture = maps.get(i).copied().flatten();
                self.uniforms
                    .set_texture(&mut self.device, &mut self.state, id, slot, texture);
            }
        }

        if let Some(slot) = bindings.transmission {
            let texture = frame.transmission.map(|(t, _)| t);
            self.uniforms
                .set_texture(&mut self.device, &mut self.state, id, slot, texture);
        }
        Ok(())
    }
}
