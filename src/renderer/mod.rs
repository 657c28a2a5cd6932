//! The renderer.
//!
//! A [`Renderer`] drives one [`GpuDevice`] through a fixed sequence of
//! phases per frame:
//!
//! ```text
//! Idle -> BuildLists -> RenderShadows? -> RenderTransmissive? -> RenderMain -> Resolve -> Idle
//! ```
//!
//! Shadow maps render only when some light casts one, the transmission
//! pre-pass only when a transmissive draw is visible. A fatal error aborts
//! the frame without submitting it; the next call starts from `Idle`.
//!
//! Device loss is detected at the start of a frame and before submission.
//! Every cache is invalidated without device calls, pending readbacks
//! resolve as abandoned, and the next [`Renderer::render`] restores the
//! device and rebuilds resources lazily.

pub mod binder;
pub mod context;
pub mod core;
pub mod info;
pub mod lights;
pub mod lists;
pub mod pipeline;
pub mod readback;
pub mod resources;
pub mod settings;
pub mod shadow;
pub mod state;
pub mod uniform_upload;

use std::sync::Arc;

use glam::{Affine3A, Vec2};
use smallvec::SmallVec;

use self::context::{DrawRequest, FrameInputs, GpuContext, PassKind, TextureSources, ViewInputs};
use self::core::capabilities::Capabilities;
use self::core::device::{ClearRequest, FramebufferId, GpuDevice, ReadRect, TextureId, Viewport};
use self::info::{CompileFailure, FramePhase, FrameReport, RenderInfo};
use self::lights::{LightsState, ShadowLightKind};
use self::lists::{Bucket, ListBuilder, RenderItem, ViewContext};
use self::pipeline::ProgramCacheStats;
use self::readback::{FrameClock, PixelReadback};
use self::settings::{RendererSettings, ShadowMapKind};
use self::shadow::{ShadowMapper, ShadowUniforms};
use crate::assets::{Assets, Disposal, RenderTargetHandle};
use crate::errors::{ConfigurationError, KilnError, ProgramDiagnostics, Result};
use crate::resources::material::{Material, MaterialSettings, Side};
use crate::resources::render_target::RenderTarget;
use crate::resources::version_tracker::ResourceId;
use crate::scene::camera::{Camera, CoordinateSystem};
use crate::scene::layers::Layers;
use crate::scene::Scene;

pub use self::core::{HeadlessDevice, WgpuDevice};

/// Camera matrices of one rendered view and its viewport.
struct ViewPass {
    inputs: ViewInputs,
    viewport: Viewport,
}

pub struct Renderer<D: GpuDevice> {
    gpu: GpuContext<D>,
    pub settings: RendererSettings,
    lists: ListBuilder,
    shadow_lists: ListBuilder,
    lights: LightsState,
    shadows: ShadowMapper,
    shadow_uniforms: ShadowUniforms,
    items: Vec<RenderItem>,
    render_target: Option<RenderTargetHandle>,
    transmission: Option<RenderTarget>,
    phases: Vec<FramePhase>,
    pub(crate) clock: Arc<FrameClock>,
    context_lost: bool,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D) -> Self {
        Self::with_settings(device, RendererSettings::default())
    }

    pub fn with_settings(device: D, settings: RendererSettings) -> Self {
        Self {
            gpu: GpuContext::new(device),
            settings,
            lists: ListBuilder::new(),
            shadow_lists: ListBuilder::new(),
            lights: LightsState::new(),
            shadows: ShadowMapper::new(),
            shadow_uniforms: ShadowUniforms::default(),
            items: Vec::new(),
            render_target: None,
            transmission: None,
            phases: Vec::new(),
            clock: Arc::new(FrameClock::default()),
            context_lost: false,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    #[must_use]
    pub fn device(&self) -> &D {
        &self.gpu.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.gpu.device
    }

    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.gpu.capabilities
    }

    /// Statistics of the last frame.
    #[must_use]
    pub fn info(&self) -> &RenderInfo {
        &self.gpu.info
    }

    #[must_use]
    pub fn program_stats(&self) -> ProgramCacheStats {
        self.gpu.programs.stats()
    }

    /// Diagnostics of the last failed program of `material`, if any.
    #[must_use]
    pub fn material_diagnostics(&self, material: &Material) -> Option<&ProgramDiagnostics> {
        self.gpu.material_diagnostics(material.id())
    }

    #[must_use]
    pub fn lights(&self) -> &LightsState {
        &self.lights
    }

    #[must_use]
    pub fn shadow_maps(&self) -> &ShadowMapper {
        &self.shadows
    }

    /// Renders into `target` instead of the default framebuffer.
    pub fn set_render_target(&mut self, target: Option<RenderTargetHandle>) {
        self.render_target = target;
    }

    #[must_use]
    pub fn render_target(&self) -> Option<RenderTargetHandle> {
        self.render_target
    }

    // ─── Disposal ────────────────────────────────────────────────────────

    pub fn dispose_geometry(&mut self, geometry: ResourceId) {
        self.gpu.dispose_geometry(geometry);
    }

    pub fn dispose_material(&mut self, material: ResourceId) {
        self.gpu.dispose_material(material);
    }

    pub fn dispose_texture(&mut self, texture: ResourceId) {
        self.gpu.dispose_texture(texture);
    }

    pub fn dispose_render_target(&mut self, target: ResourceId) {
        self.gpu.dispose_render_target(target);
    }

    fn process_disposals(&mut self, assets: &mut Assets) {
        for disposal in assets.drain_disposed() {
            match disposal {
                Disposal::Geometry(id) => self.gpu.dispose_geometry(id),
                Disposal::Material(id) => self.gpu.dispose_material(id),
                Disposal::Texture(id) => self.gpu.dispose_texture(id),
                Disposal::RenderTarget(id) => self.gpu.dispose_render_target(id),
            }
        }
    }

    // ─── Device lifecycle ────────────────────────────────────────────────

    /// Lets the device make progress on pending work; handles device loss.
    pub fn poll_device(&mut self) {
        self.gpu.device.poll();
        if !self.context_lost && self.gpu.device.is_context_lost() {
            self.lose_device();
        }
    }

    fn lose_device(&mut self) {
        log::warn!("GPU device lost; invalidating device resources");
        self.gpu.invalidate();
        self.shadows.invalidate();
        self.clock.device_lost();
        self.context_lost = true;
    }

    fn ensure_device(&mut self) -> Result<()> {
        if !self.context_lost && self.gpu.device.is_context_lost() {
            self.lose_device();
        }
        if self.context_lost {
            if !self.gpu.device.restore_context() {
                return Err(KilnError::DeviceLost);
            }
            self.context_lost = false;
            self.gpu.reprobe();
            log::info!("GPU device restored");
        }
        Ok(())
    }

    // ─── Frame ───────────────────────────────────────────────────────────

    /// Renders `scene` from `camera` into the current render target.
    pub fn render(&mut self, scene: &mut Scene, assets: &mut Assets, camera: &mut Camera) -> Result<FrameReport> {
        self.ensure_device()?;
        self.gpu.frame += 1;
        self.gpu.info.reset_frame(self.gpu.frame);
        self.phases.clear();
        self.process_disposals(assets);

        let result = self.render_frame(scene, assets, camera);
        if result.is_err() {
            self.gpu.device.discard_frame();
        }
        self.gpu.release_instance_streams(scene);
        self.gpu.end_frame();
        self.refresh_totals();
        self.phases.push(FramePhase::Idle);
        let phases = std::mem::take(&mut self.phases);
        let compile_failures = self.gpu.take_failures();
        self.clock.advance();
        if let Err(err) = result {
            log::error!("Frame {} aborted: {err}", self.gpu.frame);
            return Err(err);
        }

        log::trace!(
            "Frame {}: {} draws, {} skipped",
            self.gpu.frame,
            self.gpu.info.draw_calls,
            self.gpu.info.skipped_draws
        );
        Ok(FrameReport {
            phases,
            compile_failures,
            info: self.gpu.info,
        })
    }

    /// Resolves the program of every visible draw without drawing.
    /// Returns the programs that failed.
    pub fn compile(&mut self, scene: &mut Scene, assets: &mut Assets, camera: &mut Camera) -> Result<Vec<CompileFailure>> {
        self.ensure_device()?;
        self.process_disposals(assets);
        self.build_lists(scene, assets, camera)?;

        let view = ViewInputs {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            position: camera.world_position(),
            to_screen: self.render_target.is_none(),
            pass: PassKind::Main,
        };
        let frame = FrameInputs {
            settings: &self.settings,
            lights: &self.lights,
            shadows: &self.shadow_uniforms,
            fog: scene.fog,
            environment: scene.environment,
            transmission: None,
            source_texture: None,
            compile_only: true,
        };
        for bucket in [Bucket::Opaque, Bucket::Transmissive, Bucket::Transparent] {
            self.lists.list.collect_into(bucket, &mut self.items);
            draw_items(&mut self.gpu, scene, assets, &self.items, &view, &frame, false)?;
        }
        self.gpu.end_frame();
        Ok(self.gpu.take_failures())
    }

    fn refresh_totals(&mut self) {
        let gpu = &mut self.gpu;
        gpu.info.geometries = gpu.geometries.len();
        gpu.info.textures = gpu.textures.len();
        gpu.info.programs = gpu.programs.len();
        gpu.info.warnings += gpu.textures.take_warnings();
        gpu.info.state_changes = gpu.state.issued_calls() + gpu.attributes.issued_calls();
        gpu.info.uniform_uploads = gpu.uniforms.uploads();
    }

    fn build_lists(&mut self, scene: &mut Scene, assets: &Assets, camera: &mut Camera) -> Result<()> {
        camera.projection().validate()?;
        for view in &camera.views {
            view.camera.projection().validate()?;
        }
        let reversed = self.settings.reversed_depth;
        camera.set_coordinate_system(CoordinateSystem::WebGpu, reversed);
        self.gpu.state.set_reversed_depth(reversed);
        if scene.auto_update {
            scene.update_world_matrices();
        }
        camera.update_world_matrix();

        self.lists
            .build(scene, assets, camera, self.settings.sort_objects);
        self.lights
            .setup(scene, &self.lists.lights, self.settings.shadow_map.enabled);
        self.shadows
            .prepare(scene, &self.lights.shadow_casters, self.settings.shadow_map.kind)?;
        for target in self.shadows.take_retired() {
            self.gpu.dispose_render_target(target);
        }
        Ok(())
    }

    fn render_frame(&mut self, scene: &mut Scene, assets: &mut Assets, camera: &mut Camera) -> Result<()> {
        self.phases.push(FramePhase::BuildLists);
        self.build_lists(scene, assets, camera)?;

        let shadow_settings = self.settings.shadow_map;
        if shadow_settings.enabled && !self.shadows.is_empty() {
            self.phases.push(FramePhase::RenderShadows);
            if self
                .shadows
                .needs_render(shadow_settings.auto_update, shadow_settings.needs_update)
            {
                render_shadow_maps(
                    &mut self.gpu,
                    &mut self.shadows,
                    &mut self.shadow_lists,
                    &mut self.items,
                    scene,
                    assets,
                    &self.settings,
                    &self.lights,
                    &self.shadow_uniforms,
                )?;
                self.settings.shadow_map.needs_update = false;
            }
        }
        self.shadows
            .fill_uniforms(&self.gpu.render_targets, &mut self.shadow_uniforms);

        let (framebuffer, size) = self.bind_output(assets)?;
        let to_screen = framebuffer.is_none();
        let views = view_passes(camera, size, to_screen);

        let mut frame = FrameInputs {
            settings: &self.settings,
            lights: &self.lights,
            shadows: &self.shadow_uniforms,
            fog: scene.fog,
            environment: scene.environment,
            transmission: None,
            source_texture: None,
            compile_only: false,
        };

        if self.lists.list.bucket(Bucket::Transmissive).len() > 0 {
            self.phases.push(FramePhase::RenderTransmissive);
            if let Some(first) = views.first() {
                frame.transmission = Some(render_transmission(
                    &mut self.gpu,
                    &mut self.transmission,
                    &self.lists,
                    &mut self.items,
                    scene,
                    assets,
                    size,
                    &ViewInputs {
                        to_screen: false,
                        pass: PassKind::Transmission,
                        ..first.inputs
                    },
                    &frame,
                )?);
            }
        }

        self.phases.push(FramePhase::RenderMain);
        self.gpu.state.bind_framebuffer(&mut self.gpu.device, framebuffer);
        self.gpu.state.set_viewport(&mut self.gpu.device, full_viewport(size));
        clear_output(&mut self.gpu, &self.settings, scene);

        for view in &views {
            self.gpu.state.set_viewport(&mut self.gpu.device, view.viewport);
            for (bucket, two_pass) in [
                (Bucket::Opaque, false),
                (Bucket::Transmissive, false),
                (Bucket::Transparent, true),
            ] {
                self.lists.list.collect_into(bucket, &mut self.items);
                draw_items(&mut self.gpu, scene, assets, &self.items, &view.inputs, &frame, two_pass)?;
            }
        }

        self.phases.push(FramePhase::Resolve);
        if let Some(target) = self.render_target.and_then(|h| assets.render_targets.get(h)) {
            self.gpu.render_targets.resolve(&mut self.gpu.device, target.id());
        }

        if self.gpu.device.is_context_lost() {
            self.lose_device();
            return Err(KilnError::DeviceLost);
        }
        self.gpu.device.flush();
        Ok(())
    }

    /// Framebuffer of the current output and its size.
    fn bind_output(&mut self, assets: &Assets) -> Result<(Option<FramebufferId>, (u32, u32))> {
        match self.render_target {
            None => Ok((None, self.gpu.device.default_framebuffer_size())),
            Some(handle) => {
                let target = assets.render_targets.get(handle).ok_or_else(|| {
                    ConfigurationError::InvalidRenderTarget("render target was removed".to_owned())
                })?;
                let gpu = &mut self.gpu;
                let entry = gpu
                    .render_targets
                    .update(&mut gpu.device, target, &gpu.capabilities)?;
                Ok((Some(entry.framebuffer.id), target.size()))
            }
        }
    }

    // ─── Readback ────────────────────────────────────────────────────────

    /// Copies `rect` of `target` (the default framebuffer when `None`) and
    /// returns a handle resolving to RGBA8 rows.
    pub fn read_pixels_async(&mut self, target: Option<&RenderTarget>, rect: ReadRect) -> PixelReadback {
        let framebuffer = match target {
            Some(target) => match self.gpu.render_targets.get(target.id()) {
                Some(entry) => Some(entry.framebuffer.id),
                None => {
                    return PixelReadback::new(
                        Err(format!("render target {} was never rendered", target.id())),
                        self.clock.clone(),
                        self.settings.readback,
                    );
                }
            },
            None => None,
        };
        let submitted = self.gpu.device.read_pixels(framebuffer, rect);
        PixelReadback::new(submitted, self.clock.clone(), self.settings.readback)
    }
}

fn full_viewport((width, height): (u32, u32)) -> Viewport {
    Viewport {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
    }
}

/// The camera itself, or every sub-view of an array camera.
fn view_passes(camera: &Camera, size: (u32, u32), to_screen: bool) -> SmallVec<[ViewPass; 2]> {
    let pass = |camera: &Camera, viewport: Option<glam::Vec4>| ViewPass {
        inputs: ViewInputs {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            position: camera.world_position(),
            to_screen,
            pass: PassKind::Main,
        },
        viewport: viewport.map_or_else(
            || full_viewport(size),
            |v| Viewport {
                x: v.x,
                y: v.y,
                width: v.z,
                height: v.w,
            },
        ),
    };
    if camera.is_array_camera() {
        camera
            .views
            .iter()
            .map(|view| pass(&view.camera, Some(view.viewport)))
            .collect()
    } else {
        std::iter::once(pass(camera, camera.viewport)).collect()
    }
}

fn clear_output<D: GpuDevice>(gpu: &mut GpuContext<D>, settings: &RendererSettings, scene: &Scene) {
    let auto = settings.auto_clear;
    if !(auto.color || auto.depth || auto.stencil) {
        return;
    }
    let color = scene
        .background
        .map_or_else(|| settings.clear_color_f32(), |c| c.to_array());
    gpu.device.clear(ClearRequest {
        color: auto.color.then_some(color),
        depth: auto.depth.then(|| gpu.state.depth_clear_value()),
        stencil: auto.stencil.then_some(0),
    });
}

/// Side a caster renders its shadow with.
fn shadow_side(settings: &MaterialSettings) -> Side {
    settings.shadow_side.unwrap_or(match settings.side {
        Side::Front => Side::Back,
        Side::Back => Side::Front,
        Side::Double => Side::Double,
    })
}

fn draw_items<D: GpuDevice>(
    gpu: &mut GpuContext<D>,
    scene: &mut Scene,
    assets: &mut Assets,
    items: &[RenderItem],
    view: &ViewInputs,
    frame: &FrameInputs<'_>,
    two_pass: bool,
) -> Result<()> {
    for item in items {
        draw_item(gpu, scene, assets, item, None, view, frame, two_pass)?;
    }
    Ok(())
}

/// Draws one item, with its own material or with a replacement (shadow
/// passes) given as `(material, side)`.
fn draw_item<D: GpuDevice>(
    gpu: &mut GpuContext<D>,
    scene: &mut Scene,
    assets: &mut Assets,
    item: &RenderItem,
    replacement: Option<(&Material, Side)>,
    view: &ViewInputs,
    frame: &FrameInputs<'_>,
    two_pass: bool,
) -> Result<()> {
    let Some(node) = scene.get_mut(item.node) else {
        return Ok(());
    };
    let world: Affine3A = *node.world_matrix();
    let Some(drawable) = node.as_drawable_mut() else {
        return Ok(());
    };
    let Some(geometry) = assets.geometries.get_mut(item.geometry) else {
        return Ok(());
    };
    let Some(material) = assets.materials.get(item.material) else {
        return Ok(());
    };
    let sources = TextureSources {
        textures: &assets.textures,
        render_targets: &assets.render_targets,
    };

    let settings = material.settings();
    let request = DrawRequest {
        world,
        node: Some(item.node),
        material,
        clip_source: settings,
        side: None,
        group: item.group,
    };
    match replacement {
        Some((replacement, side)) => {
            let request = DrawRequest {
                material: replacement,
                side: Some(side),
                ..request
            };
            gpu.draw(Some(drawable), geometry, &sources, &request, view, frame)
        }
        None if two_pass && settings.side == Side::Double && !settings.force_single_pass => {
            let back = DrawRequest {
                side: Some(Side::Back),
                ..request
            };
            gpu.draw(Some(&mut *drawable), geometry, &sources, &back, view, frame)?;
            let front = DrawRequest {
                side: Some(Side::Front),
                ..request
            };
            gpu.draw(Some(drawable), geometry, &sources, &front, view, frame)
        }
        None => gpu.draw(Some(drawable), geometry, &sources, &request, view, frame),
    }
}

/// Renders every map that is due. Shadow cameras use a non-reversed depth
/// range whatever the main pass uses.
fn render_shadow_maps<D: GpuDevice>(
    gpu: &mut GpuContext<D>,
    shadows: &mut ShadowMapper,
    lists: &mut ListBuilder,
    items: &mut Vec<RenderItem>,
    scene: &mut Scene,
    assets: &mut Assets,
    settings: &RendererSettings,
    lights: &LightsState,
    shadow_uniforms: &ShadowUniforms,
) -> Result<()> {
    let reversed = gpu.state.reversed_depth();
    gpu.state.set_reversed_depth(false);
    let frame = FrameInputs {
        settings,
        lights,
        shadows: shadow_uniforms,
        fog: None,
        environment: None,
        transmission: None,
        source_texture: None,
        compile_only: false,
    };
    let result = render_shadow_maps_with(gpu, shadows, lists, items, scene, assets, &frame);
    gpu.state.set_reversed_depth(reversed);
    result
}

fn render_shadow_maps_with<D: GpuDevice>(
    gpu: &mut GpuContext<D>,
    shadows: &mut ShadowMapper,
    lists: &mut ListBuilder,
    items: &mut Vec<RenderItem>,
    scene: &mut Scene,
    assets: &mut Assets,
    frame: &FrameInputs<'_>,
) -> Result<()> {
    let order: SmallVec<[ResourceId; 8]> = shadows.order().iter().copied().collect();
    for light in order {
        let Some(map) = shadows.map(light) else {
            continue;
        };
        let kind = map.kind;
        let variance = map.is_variance();
        let views = map.views.clone();
        let params = map.params;
        let (blur_radius, blur_samples) = (map.blur_radius, map.blur_samples);
        let size = map.target.size();

        let (map_framebuffer, map_texture) = {
            let entry = gpu
                .render_targets
                .update(&mut gpu.device, &map.target, &gpu.capabilities)?;
            (entry.framebuffer.id, entry.color_texture(0))
        };
        let blur = match &map.blur_target {
            Some(target) => {
                let entry = gpu
                    .render_targets
                    .update(&mut gpu.device, target, &gpu.capabilities)?;
                Some((entry.framebuffer.id, entry.color_texture(0)))
            }
            None => None,
        };

        gpu.state.bind_framebuffer(&mut gpu.device, Some(map_framebuffer));
        gpu.state.set_viewport(&mut gpu.device, full_viewport(size));
        gpu.device.clear(ClearRequest {
            color: Some(if variance { [1.0, 1.0, 0.0, 1.0] } else { [1.0; 4] }),
            depth: Some(gpu.state.depth_clear_value()),
            stencil: None,
        });

        for view in &views {
            gpu.state.set_viewport(&mut gpu.device, view.viewport);
            if kind == ShadowLightKind::Point {
                shadows.set_distance_reference(view.position, params[1].z, params[1].w);
            }
            let context = ViewContext {
                frustum: view.frustum(),
                view: view.view,
                layers: Layers::all(),
            };
            lists.build_view(scene, assets, &context, false);
            items.clear();
            for bucket in [Bucket::Opaque, Bucket::Transmissive, Bucket::Transparent] {
                items.extend(lists.list.bucket(bucket).copied());
            }

            let inputs = ViewInputs {
                view: view.view,
                projection: view.projection,
                position: view.position,
                to_screen: false,
                pass: PassKind::Shadow,
            };
            for item in items.iter() {
                let casts = scene
                    .get(item.node)
                    .and_then(|n| n.as_drawable())
                    .is_some_and(|d| d.cast_shadow);
                let Some(side) = assets.materials.get(item.material).map(|m| shadow_side(m.settings())) else {
                    continue;
                };
                if !casts {
                    continue;
                }
                let caster = shadows.caster_material(kind, variance);
                draw_item(gpu, scene, assets, item, Some((caster, side)), &inputs, frame, false)?;
            }
        }

        if let Some((blur_framebuffer, blur_texture)) = blur {
            let resolution = Vec2::new(size.0 as f32, size.1 as f32);
            let passes = [
                (blur_framebuffer, map_texture, Vec2::Y),
                (map_framebuffer, blur_texture, Vec2::X),
            ];
            for (framebuffer, source, direction) in passes {
                gpu.state.bind_framebuffer(&mut gpu.device, Some(framebuffer));
                gpu.state.set_viewport(&mut gpu.device, full_viewport(size));
                let (geometry, material) = shadows.blur_pass(direction, resolution, blur_radius, blur_samples);
                let sources = TextureSources {
                    textures: &assets.textures,
                    render_targets: &assets.render_targets,
                };
                let request = DrawRequest {
                    world: Affine3A::IDENTITY,
                    node: None,
                    material,
                    clip_source: material.settings(),
                    side: None,
                    group: None,
                };
                let inputs = ViewInputs {
                    view: glam::Mat4::IDENTITY,
                    projection: glam::Mat4::IDENTITY,
                    position: glam::Vec3::ZERO,
                    to_screen: false,
                    pass: PassKind::Fullscreen,
                };
                let blur_frame = FrameInputs {
                    source_texture: source,
                    ..*frame
                };
                gpu.draw(None, geometry, &sources, &request, &inputs, &blur_frame)?;
            }
        }
        shadows.mark_rendered(light);
    }
    Ok(())
}

/// Renders opaque and transparent draws into the transmission target and
/// returns its color texture with its size.
fn render_transmission<D: GpuDevice>(
    gpu: &mut GpuContext<D>,
    slot: &mut Option<RenderTarget>,
    lists: &ListBuilder,
    items: &mut Vec<RenderItem>,
    scene: &mut Scene,
    assets: &mut Assets,
    output: (u32, u32),
    view: &ViewInputs,
    frame: &FrameInputs<'_>,
) -> Result<(TextureId, Vec2)> {
    let scale = frame.settings.transmission_resolution_scale.max(0.01);
    let width = ((output.0 as f32 * scale) as u32).max(1);
    let height = ((output.1 as f32 * scale) as u32).max(1);
    let format = if gpu.capabilities.half_float_render_targets {
        wgpu::TextureFormat::Rgba16Float
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    };
    let target = slot.get_or_insert_with(|| {
        let mut target = RenderTarget::new(width, height)
            .with_format(format)
            .with_samples(frame.settings.msaa_samples);
        target.name = "transmission".to_owned();
        target.generate_mipmaps = true;
        target
    });
    if target.size() != (width, height) {
        target.set_size(width, height);
    }

    let (framebuffer, texture) = {
        let entry = gpu
            .render_targets
            .update(&mut gpu.device, target, &gpu.capabilities)?;
        (entry.framebuffer.id, entry.color_texture(0))
    };
    let texture = texture.ok_or_else(|| {
        ConfigurationError::InvalidRenderTarget("transmission target has no color attachment".to_owned())
    })?;

    gpu.state.bind_framebuffer(&mut gpu.device, Some(framebuffer));
    gpu.state.set_viewport(&mut gpu.device, full_viewport((width, height)));
    gpu.device.clear(ClearRequest {
        color: Some(frame.settings.clear_color_f32()),
        depth: Some(gpu.state.depth_clear_value()),
        stencil: Some(0),
    });
    for (bucket, two_pass) in [(Bucket::Opaque, false), (Bucket::Transparent, true)] {
        lists.list.collect_into(bucket, items);
        draw_items(gpu, scene, assets, items, view, frame, two_pass)?;
    }
    gpu.render_targets.resolve(&mut gpu.device, target.id());
    Ok((texture, Vec2::new(width as f32, height as f32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_side_defaults_to_the_opposite_face() {
        let mut settings = MaterialSettings::default();
        assert_eq!(shadow_side(&settings), Side::Back);
        settings.side = Side::Double;
        assert_eq!(shadow_side(&settings), Side::Double);
        settings.shadow_side = Some(Side::Front);
        assert_eq!(shadow_side(&settings), Side::Front);
    }

    #[test]
    fn array_cameras_render_each_view() {
        let mut camera = Camera::new_perspective(50.0, 1.0, 0.1, 10.0).unwrap();
        assert_eq!(view_passes(&camera, (64, 32), true).len(), 1);
        for x in [0.0, 32.0] {
            camera.views.push(crate::scene::camera::CameraView {
                camera: camera.clone(),
                viewport: glam::Vec4::new(x, 0.0, 32.0, 32.0),
            });
        }
        let passes = view_passes(&camera, (64, 32), true);
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].viewport.x, 32.0);
    }
}
