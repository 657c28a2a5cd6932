//! Renderer Tests
//!
//! Tests for:
//! - Frame phase sequence
//! - Frame-to-frame call log stability
//! - Device loss, restoration and program rebuilds
//! - Compile failures (skipped draws, diagnostics, retry on edit)
//! - Configuration errors (missing attributes, resized buffers)
//! - Render targets, clearing and pixel readback
//! - Resource disposal

use std::cell::Cell;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use kiln::assets::{GeometryHandle, MaterialHandle};
use kiln::errors::{ConfigurationError, KilnError, ProgramDiagnostics, ShaderStage};
use kiln::renderer::core::{DeviceCall, HeadlessDevice, ReadRect};
use kiln::renderer::info::{FramePhase, FrameReport};
use kiln::resources::buffer::BufferAttribute;
use kiln::resources::geometry::Geometry;
use kiln::resources::material::{Material, MaterialKind};
use kiln::resources::RenderTarget;
use kiln::scene::node::Node;
use kiln::scene::transform::Transform;
use kiln::scene::{Camera, Drawable, Instances, NodeHandle, Scene};
use kiln::{Assets, Renderer, RendererSettings};

// ============================================================================
// Fixture
// ============================================================================

struct Frame {
    renderer: Renderer<HeadlessDevice>,
    scene: Scene,
    assets: Assets,
    camera: Camera,
    geometry: GeometryHandle,
}

impl Frame {
    fn new() -> Self {
        Self::with_settings(RendererSettings::default())
    }

    fn with_settings(settings: RendererSettings) -> Self {
        let mut assets = Assets::new();
        let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
        geometry.compute_bounding_volumes();
        let geometry = assets.add_geometry(geometry);

        let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0).unwrap();
        camera.transform.position = Vec3::new(0.0, 0.0, 5.0);

        Self {
            renderer: Renderer::with_settings(HeadlessDevice::new(32, 32), settings),
            scene: Scene::new(),
            assets,
            camera,
            geometry,
        }
    }

    fn mesh(&mut self, material: Material) -> MaterialHandle {
        self.mesh_at(material, Vec3::ZERO)
    }

    fn mesh_at(&mut self, material: Material, position: Vec3) -> MaterialHandle {
        let material = self.assets.add_material(material);
        self.scene.add(
            Node::drawable(Drawable::new(self.geometry, material))
                .with_transform(Transform::from_position(position)),
        );
        material
    }

    fn render(&mut self) -> kiln::Result<FrameReport> {
        self.renderer
            .render(&mut self.scene, &mut self.assets, &mut self.camera)
    }

    fn device(&mut self) -> &mut HeadlessDevice {
        self.renderer.device_mut()
    }
}

fn transmissive() -> Material {
    Material::physical().with(|d| {
        if let MaterialKind::Physical(params) = &mut d.kind {
            params.transmission = 1.0;
        }
    })
}

fn reject_everything(device: &mut HeadlessDevice) -> Rc<Cell<u32>> {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    device.set_compile_validator(move |program| {
        counter.set(counter.get() + 1);
        Some(ProgramDiagnostics::new(
            program.label.clone(),
            ShaderStage::Fragment,
            "rejected by test validator",
            Some(2),
            &program.source,
        ))
    });
    calls
}

// ============================================================================
// Phase Tests
// ============================================================================

#[test]
fn plain_frame_runs_build_main_resolve() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    let report = f.render().unwrap();
    assert_eq!(
        report.phases,
        vec![
            FramePhase::BuildLists,
            FramePhase::RenderMain,
            FramePhase::Resolve,
            FramePhase::Idle,
        ]
    );
}

#[test]
fn transmissive_draw_adds_the_transmission_pass() {
    let mut f = Frame::new();
    f.mesh(Material::standard());
    f.mesh_at(transmissive(), Vec3::new(0.0, 0.0, 1.0));
    let report = f.render().unwrap();
    assert_eq!(
        report.phases,
        vec![
            FramePhase::BuildLists,
            FramePhase::RenderTransmissive,
            FramePhase::RenderMain,
            FramePhase::Resolve,
            FramePhase::Idle,
        ]
    );
}

#[test]
fn empty_scene_still_clears() {
    let mut f = Frame::new();
    let report = f.render().unwrap();
    assert_eq!(report.info.draw_calls, 0);
    assert_eq!(
        f.device()
            .count_calls(|c| matches!(c, DeviceCall::Clear(_))),
        1
    );
    assert_eq!(f.device().count_calls(|c| matches!(c, DeviceCall::Flush)), 1);
}

#[test]
fn frame_counter_and_draw_stats_are_reported() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    let first = f.render().unwrap();
    let second = f.render().unwrap();

    assert_eq!(first.info.frame + 1, second.info.frame);
    assert_eq!(second.info.draw_calls, 1);
    assert_eq!(second.info.triangles, 12, "a box has twelve triangles");
    assert_eq!(second.info.geometries, 1);
    assert_eq!(second.info.programs, 1);
    assert_eq!(f.renderer.info(), &second.info);
}

// ============================================================================
// Call Log Stability Tests
// ============================================================================

#[test]
fn identical_frames_issue_identical_call_logs() {
    let mut f = Frame::new();
    f.mesh(Material::lambert());
    f.mesh_at(
        Material::basic().with(|d| d.settings.transparent = true),
        Vec3::new(1.0, 0.0, 0.0),
    );

    f.render().unwrap();
    f.device().clear_calls();
    f.render().unwrap();
    let second = f.device().take_calls();
    f.render().unwrap();
    let third = f.device().take_calls();

    assert!(!second.is_empty());
    assert_eq!(second, third, "an unchanged scene must replay the same device calls");
}

#[test]
fn steady_frames_create_no_resources() {
    let mut f = Frame::new();
    f.mesh(Material::standard());
    f.render().unwrap();
    f.device().clear_calls();
    f.render().unwrap();

    assert_eq!(
        f.device().count_calls(DeviceCall::is_resource_call),
        0,
        "nothing changed, so nothing may be created or uploaded"
    );
}

#[test]
fn equal_materials_share_one_program() {
    let mut f = Frame::new();
    f.mesh(Material::phong());
    f.mesh_at(Material::phong(), Vec3::new(1.0, 0.0, 0.0));
    f.render().unwrap();

    let stats = f.renderer.program_stats();
    assert_eq!(stats.live_programs, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(f.device().programs_compiled(), 1);
}

// ============================================================================
// Device Loss Tests
// ============================================================================

#[test]
fn restored_device_recompiles_each_distinct_program_once() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.mesh_at(Material::lambert(), Vec3::new(1.0, 0.0, 0.0));
    f.mesh_at(Material::lambert(), Vec3::new(-1.0, 0.0, 0.0));
    f.render().unwrap();
    let before = f.renderer.program_stats();
    assert_eq!(before.live_programs, 2);

    f.device().simulate_context_loss();
    f.render().unwrap();
    let after = f.renderer.program_stats();

    assert_eq!(after.misses - before.misses, 2, "one miss per distinct program key");
    assert_eq!(after.live_programs, 2);
    assert_eq!(f.device().live_programs(), 2);
}

#[test]
fn restored_device_rebuilds_buffers() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.render().unwrap();
    let buffers = f.device().live_buffers();
    assert!(buffers > 0);

    f.device().simulate_context_loss();
    f.device().clear_calls();
    f.render().unwrap();
    assert_eq!(f.device().live_buffers(), buffers);
    assert!(
        f.device()
            .count_calls(|c| matches!(c, DeviceCall::CreateBuffer { .. }))
            > 0
    );
}

#[test]
fn unrestorable_device_fails_until_it_comes_back() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.render().unwrap();

    f.device().set_restorable(false);
    f.device().simulate_context_loss();
    assert_eq!(f.render().unwrap_err(), KilnError::DeviceLost);
    assert_eq!(f.render().unwrap_err(), KilnError::DeviceLost);

    f.device().set_restorable(true);
    let report = f.render().unwrap();
    assert_eq!(report.info.draw_calls, 1);
}

// ============================================================================
// Compile Failure Tests
// ============================================================================

#[test]
fn failed_program_skips_the_draw_and_reports_once() {
    let mut f = Frame::new();
    let handle = f.mesh(Material::basic());
    let attempts = reject_everything(f.device());

    let first = f.render().unwrap();
    assert_eq!(first.info.draw_calls, 0);
    assert_eq!(first.info.skipped_draws, 1);
    assert_eq!(first.compile_failures.len(), 1);
    let material_id = f.assets.materials[handle].id();
    assert_eq!(first.compile_failures[0].material, material_id);
    assert_eq!(first.compile_failures[0].diagnostics.line, Some(2));

    let second = f.render().unwrap();
    assert!(second.compile_failures.is_empty(), "failures are reported once");
    assert_eq!(second.info.skipped_draws, 1);
    assert_eq!(attempts.get(), 1, "a failed program is not recompiled");
    assert_eq!(f.renderer.program_stats().failed_programs, 1);
}

#[test]
fn failed_material_exposes_diagnostics() {
    let mut f = Frame::new();
    let handle = f.mesh(Material::basic());
    reject_everything(f.device());
    f.render().unwrap();

    let material = &f.assets.materials[handle];
    let diagnostics = f.renderer.material_diagnostics(material).unwrap();
    assert_eq!(diagnostics.stage, ShaderStage::Fragment);
    assert!(diagnostics.message.contains("rejected"));
    assert!(!diagnostics.excerpt.is_empty(), "the excerpt shows the failing line");
}

#[test]
fn editing_a_failed_material_retries_it() {
    let mut f = Frame::new();
    let handle = f.mesh(Material::basic());
    reject_everything(f.device());
    f.render().unwrap();

    f.device().clear_compile_validator();
    f.assets.materials[handle].needs_update();
    let report = f.render().unwrap();
    assert_eq!(report.info.draw_calls, 1);
    assert_eq!(report.info.skipped_draws, 0);
    let material = &f.assets.materials[handle];
    assert!(f.renderer.material_diagnostics(material).is_none());
}

#[test]
fn one_failing_material_does_not_block_others() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.mesh_at(Material::lambert(), Vec3::new(1.0, 0.0, 0.0));
    f.device().set_compile_validator(|program| {
        program.label.contains("lambert").then(|| {
            ProgramDiagnostics::new(program.label.clone(), ShaderStage::Module, "no", None, "")
        })
    });

    let report = f.render().unwrap();
    assert_eq!(report.info.draw_calls, 1);
    assert_eq!(report.info.skipped_draws, 1);
}

#[test]
fn compile_resolves_programs_without_drawing() {
    let mut f = Frame::new();
    f.mesh(Material::standard());
    let failures = f
        .renderer
        .compile(&mut f.scene, &mut f.assets, &mut f.camera)
        .unwrap();

    assert!(failures.is_empty());
    assert_eq!(f.device().programs_compiled(), 1);
    assert!(f.device().draw_calls().is_empty());

    f.render().unwrap();
    assert_eq!(f.device().programs_compiled(), 1, "the frame reuses the compiled program");
}

// ============================================================================
// Configuration Error Tests
// ============================================================================

#[test]
fn geometry_without_position_is_rejected() {
    let mut f = Frame::new();
    let mut geometry = Geometry::new_box(1.0, 1.0, 1.0);
    geometry.remove_attribute(Geometry::POSITION);
    let geometry = f.assets.add_geometry(geometry);
    let material = f.assets.add_material(Material::basic());
    f.scene
        .add(Node::drawable(Drawable::new(geometry, material)));

    let err = f.render().unwrap_err();
    assert_eq!(
        err,
        KilnError::Configuration(ConfigurationError::MissingAttribute {
            attribute: Geometry::POSITION,
        })
    );
    assert_eq!(f.renderer.info().draw_calls, 0);
}

#[test]
fn resized_attribute_fails_the_frame_and_keeps_the_buffer() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.render().unwrap();
    let buffers = f.device().live_buffers();

    let geometry = &mut f.assets.geometries[f.geometry];
    let attribute = geometry.attribute_mut(Geometry::POSITION).unwrap();
    let grown = vec![0.0f32; attribute.bytes().len() / 4 * 2];
    attribute.set_data(&grown);

    let err = f.render().unwrap_err();
    assert!(
        matches!(
            err,
            KilnError::Configuration(ConfigurationError::BufferResized { .. })
        ),
        "got {err:?}"
    );
    assert_eq!(f.device().live_buffers(), buffers);
}

#[test]
fn partial_attribute_writes_upload_only_the_range() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.render().unwrap();
    f.device().clear_calls();

    let geometry = &mut f.assets.geometries[f.geometry];
    let attribute = geometry.attribute_mut(Geometry::POSITION).unwrap();
    attribute.write(2, &[[0.5f32, 0.5, 0.5]]);
    f.render().unwrap();

    let writes: Vec<(u64, usize)> = f
        .device()
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::WriteBuffer { offset, bytes, .. } => Some((*offset, *bytes)),
            _ => None,
        })
        .collect();
    assert!(writes.contains(&(24, 12)), "expected a 12 byte write at 24, got {writes:?}");
}

#[test]
fn array_camera_draws_once_per_view() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.camera.update_world_matrix();
    for x in [0.0, 16.0] {
        let view = f.camera.clone();
        f.camera.views.push(kiln::scene::CameraView {
            camera: view,
            viewport: Vec4::new(x, 0.0, 16.0, 32.0),
        });
    }
    let report = f.render().unwrap();

    assert_eq!(report.info.draw_calls, 2);
    let viewports = f
        .device()
        .count_calls(|c| matches!(c, DeviceCall::SetViewport(v) if (v.width - 16.0).abs() < 1e-6));
    assert!(viewports >= 1, "each view renders into its own viewport");
}

// ============================================================================
// Clear and Readback Tests
// ============================================================================

#[test]
fn clear_color_reaches_the_default_framebuffer() {
    let mut settings = RendererSettings::default();
    settings.clear_color = [1.0, 0.0, 0.0, 1.0];
    let mut f = Frame::with_settings(settings);
    f.render().unwrap();

    let pixels = f
        .renderer
        .read_pixels_async(
            None,
            ReadRect {
                x: 0,
                y: 0,
                width: 2,
                height: 1,
            },
        )
        .wait(&mut f.renderer)
        .unwrap();
    assert_eq!(pixels, vec![255, 0, 0, 255, 255, 0, 0, 255]);
}

#[test]
fn failed_frame_leaves_the_previous_image_on_screen() {
    let mut settings = RendererSettings::default();
    settings.clear_color = [1.0, 0.0, 0.0, 1.0];
    let mut f = Frame::with_settings(settings);
    f.mesh(Material::basic());
    f.render().unwrap();

    f.renderer.settings.clear_color = [0.0, 0.0, 1.0, 1.0];
    let geometry = &mut f.assets.geometries[f.geometry];
    let attribute = geometry.attribute_mut(Geometry::POSITION).unwrap();
    let grown = vec![0.0f32; attribute.bytes().len() / 4 * 2];
    attribute.set_data(&grown);
    assert!(f.render().is_err());
    assert_eq!(f.device().count_calls(|c| matches!(c, DeviceCall::DiscardFrame)), 1);

    let pixels = f
        .renderer
        .read_pixels_async(
            None,
            ReadRect {
                x: 0,
                y: 0,
                width: 1,
                height: 1,
            },
        )
        .wait(&mut f.renderer)
        .unwrap();
    assert_eq!(pixels, vec![255, 0, 0, 255]);
}

#[test]
fn scene_background_overrides_clear_color() {
    let mut f = Frame::new();
    f.scene.background = Some(Vec4::new(0.0, 0.0, 1.0, 1.0));
    f.render().unwrap();
    let cleared = f.device().calls().iter().find_map(|c| match c {
        DeviceCall::Clear(request) => request.color,
        _ => None,
    });
    assert_eq!(cleared, Some([0.0, 0.0, 1.0, 1.0]));
}

#[test]
fn disabled_auto_clear_issues_no_clear() {
    let mut settings = RendererSettings::default();
    settings.auto_clear.color = false;
    settings.auto_clear.depth = false;
    settings.auto_clear.stencil = false;
    let mut f = Frame::with_settings(settings);
    f.render().unwrap();
    assert_eq!(f.device().count_calls(|c| matches!(c, DeviceCall::Clear(_))), 0);
}

#[test]
fn render_target_receives_the_frame_and_reads_back() {
    let mut settings = RendererSettings::default();
    settings.clear_color = [0.0, 1.0, 0.0, 1.0];
    let mut f = Frame::with_settings(settings);
    f.mesh(Material::basic());
    let target = f.assets.add_render_target(RenderTarget::new(16, 8));
    f.renderer.set_render_target(Some(target));
    f.render().unwrap();

    assert_eq!(f.device().live_framebuffers(), 1);
    let rect = ReadRect {
        x: 14,
        y: 6,
        width: 2,
        height: 2,
    };
    let readback = f
        .renderer
        .read_pixels_async(Some(&f.assets.render_targets[target]), rect);
    let pixels = readback.wait(&mut f.renderer).unwrap();
    assert_eq!(pixels, [0u8, 255, 0, 255].repeat(4));
}

#[test]
fn reading_an_unrendered_target_fails() {
    let mut f = Frame::new();
    let target = RenderTarget::new(4, 4);
    let rect = ReadRect {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    };
    let err = f
        .renderer
        .read_pixels_async(Some(&target), rect)
        .wait(&mut f.renderer)
        .unwrap_err();
    assert!(
        matches!(&err, KilnError::ReadbackFailed(message) if message.contains("never rendered")),
        "got {err:?}"
    );
}

#[test]
fn out_of_bounds_readback_fails() {
    let mut f = Frame::new();
    f.render().unwrap();
    let rect = ReadRect {
        x: 30,
        y: 0,
        width: 4,
        height: 1,
    };
    let err = f
        .renderer
        .read_pixels_async(None, rect)
        .wait(&mut f.renderer)
        .unwrap_err();
    assert!(matches!(err, KilnError::ReadbackFailed(_)));
}

// ============================================================================
// Disposal Tests
// ============================================================================

#[test]
fn removed_geometry_releases_its_buffers() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.render().unwrap();
    assert!(f.device().live_buffers() > 0);
    f.device().clear_calls();

    f.assets.remove_geometry(f.geometry);
    let report = f.render().unwrap();
    assert_eq!(report.info.draw_calls, 0);
    assert_eq!(report.info.geometries, 0);
    assert!(
        f.device()
            .count_calls(|c| matches!(c, DeviceCall::DestroyBuffer(_)))
            > 0
    );
}

fn instanced(f: &mut Frame, count: usize) -> NodeHandle {
    let material = f.assets.add_material(Material::basic());
    let mut drawable = Drawable::new(f.geometry, material);
    drawable.instances = Some(Instances::new(&vec![Mat4::IDENTITY; count]));
    f.scene.add(Node::drawable(drawable))
}

#[test]
fn removed_instanced_node_releases_its_instance_buffer() {
    let mut f = Frame::new();
    let node = instanced(&mut f, 2);
    f.render().unwrap();
    let live = f.device().live_buffers();

    f.scene.remove(node);
    f.device().clear_calls();
    f.render().unwrap();
    assert_eq!(
        f.device()
            .count_calls(|c| matches!(c, DeviceCall::DestroyBuffer(_))),
        1
    );
    assert_eq!(f.device().live_buffers(), live - 1);
}

#[test]
fn replaced_instances_do_not_accumulate_buffers() {
    let mut f = Frame::new();
    let node = instanced(&mut f, 2);
    f.render().unwrap();
    let live = f.device().live_buffers();

    for count in [3, 4, 5] {
        if let Some(d) = f.scene.get_mut(node).and_then(Node::as_drawable_mut) {
            d.instances = Some(Instances::new(&vec![Mat4::IDENTITY; count]));
        }
        f.render().unwrap();
        assert_eq!(f.device().live_buffers(), live);
    }
}

#[test]
fn removed_material_releases_its_program() {
    let mut f = Frame::new();
    let handle = f.mesh(Material::basic());
    f.render().unwrap();
    assert_eq!(f.device().live_programs(), 1);

    f.assets.remove_material(handle);
    f.render().unwrap();
    assert_eq!(f.device().live_programs(), 0);
    assert_eq!(f.renderer.program_stats().live_programs, 0);
}

#[test]
fn index_buffers_are_bound_for_indexed_geometry() {
    let mut f = Frame::new();
    f.mesh(Material::basic());
    f.render().unwrap();
    let draws = f.device().draw_calls();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].indexed);
    assert_eq!(draws[0].count, 36);

    let custom = {
        let mut g = Geometry::new();
        let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        g.set_attribute(
            Geometry::POSITION,
            BufferAttribute::new(&positions, wgpu::VertexFormat::Float32x3),
        );
        g
    };
    let custom = f.assets.add_geometry(custom);
    let material = f.assets.add_material(Material::basic());
    f.scene.add(Node::drawable(Drawable::new(custom, material)));
    f.device().clear_calls();
    f.render().unwrap();

    let draws = f.device().draw_calls();
    assert!(draws.iter().any(|d| !d.indexed && d.count == 3));
}
