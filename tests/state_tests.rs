//! State Tracker Tests
//!
//! Tests for:
//! - Material state application and redundant-call elision
//! - Face culling and winding for sides and mirrored transforms
//! - Reversed depth compare remapping
//! - Stencil and scissor groups
//! - Issued call accounting

use wgpu::{CompareFunction, Face, FrontFace};

use kiln::renderer::core::{DeviceCall, HeadlessDevice, ScissorRect, Viewport};
use kiln::renderer::state::{StateTracker, reverse_compare};
use kiln::resources::material::{Blending, Material, MaterialSettings, PolygonOffset, Side};

fn state_changes(device: &HeadlessDevice) -> usize {
    device.count_calls(DeviceCall::is_state_change)
}

fn defaults() -> MaterialSettings {
    Material::basic().settings().clone()
}

// ============================================================================
// Material Application Tests
// ============================================================================

#[test]
fn reapplying_a_material_issues_no_calls() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let settings = defaults();

    state.set_material(&mut device, &settings, false, None);
    let first = state_changes(&device);
    assert!(first > 0, "first application must reach the device");

    state.set_material(&mut device, &settings, false, None);
    assert_eq!(
        state_changes(&device),
        first,
        "identical material state must be elided entirely"
    );
    assert_eq!(state.issued_calls(), first as u64);
}

#[test]
fn opaque_front_side_culls_back_faces() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.set_material(&mut device, &defaults(), false, None);
    let calls = device.calls();
    assert!(calls.contains(&DeviceCall::SetCullMode(Some(Face::Back))));
    assert!(calls.contains(&DeviceCall::SetFrontFace(FrontFace::Ccw)));
    assert!(calls.contains(&DeviceCall::SetBlend(None)), "opaque normal blending is off");
    assert!(calls.contains(&DeviceCall::SetDepthCompare(CompareFunction::LessEqual)));
}

#[test]
fn double_sided_disables_culling() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let mut settings = defaults();
    settings.side = Side::Double;
    state.set_material(&mut device, &settings, false, None);
    assert!(device.calls().contains(&DeviceCall::SetCullMode(None)));
}

#[test]
fn mirrored_transform_flips_winding_only() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let settings = defaults();
    state.set_material(&mut device, &settings, false, None);
    device.clear_calls();

    state.set_material(&mut device, &settings, true, None);
    assert_eq!(device.calls(), &[DeviceCall::SetFrontFace(FrontFace::Cw)]);
}

#[test]
fn back_side_on_mirrored_transform_is_counter_clockwise() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let mut settings = defaults();
    settings.side = Side::Back;
    state.set_material(&mut device, &settings, true, None);
    assert!(device.calls().contains(&DeviceCall::SetFrontFace(FrontFace::Ccw)));
}

#[test]
fn side_override_replaces_material_side() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.set_material(&mut device, &defaults(), false, Some(Side::Back));
    assert!(device.calls().contains(&DeviceCall::SetFrontFace(FrontFace::Cw)));
}

#[test]
fn transparent_normal_blending_enables_blend() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let mut settings = defaults();
    settings.transparent = true;
    settings.blending = Blending::Normal;
    state.set_material(&mut device, &settings, false, None);
    assert!(
        device
            .calls()
            .iter()
            .any(|c| matches!(c, DeviceCall::SetBlend(Some(_)))),
        "transparent materials blend"
    );
}

#[test]
fn polygon_offset_is_forwarded_once() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let mut settings = defaults();
    settings.polygon_offset = Some(PolygonOffset {
        factor: 1.0,
        units: 2.0,
    });
    state.set_material(&mut device, &settings, false, None);
    state.set_material(&mut device, &settings, false, None);
    assert_eq!(
        device.count_calls(|c| matches!(c, DeviceCall::SetPolygonOffset(Some(_)))),
        1
    );
}

#[test]
fn enabled_stencil_forwards_func_and_ops() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let mut settings = defaults();
    settings.stencil.enabled = true;
    settings.stencil.reference = 3;
    settings.stencil.pass = wgpu::StencilOperation::Replace;
    state.set_material(&mut device, &settings, false, None);

    let calls = device.calls();
    assert!(calls.contains(&DeviceCall::SetStencilTest(true)));
    assert!(calls.iter().any(|c| matches!(
        c,
        DeviceCall::SetStencilFunc(f) if f.reference == 3
    )));
    assert!(calls.iter().any(|c| matches!(
        c,
        DeviceCall::SetStencilOp(ops) if ops.pass == wgpu::StencilOperation::Replace
    )));
}

#[test]
fn disabled_stencil_skips_func_and_ops() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.set_material(&mut device, &defaults(), false, None);
    assert_eq!(
        device.count_calls(|c| matches!(
            c,
            DeviceCall::SetStencilFunc(_) | DeviceCall::SetStencilOp(_)
        )),
        0
    );
}

// ============================================================================
// Reversed Depth Tests
// ============================================================================

#[test]
fn reverse_compare_mirrors_ordering_functions() {
    assert_eq!(reverse_compare(CompareFunction::Less), CompareFunction::Greater);
    assert_eq!(reverse_compare(CompareFunction::LessEqual), CompareFunction::GreaterEqual);
    assert_eq!(reverse_compare(CompareFunction::Greater), CompareFunction::Less);
    assert_eq!(reverse_compare(CompareFunction::GreaterEqual), CompareFunction::LessEqual);
    assert_eq!(reverse_compare(CompareFunction::Equal), CompareFunction::Equal);
    assert_eq!(reverse_compare(CompareFunction::Always), CompareFunction::Always);
    assert_eq!(reverse_compare(CompareFunction::Never), CompareFunction::Never);
}

#[test]
fn reversed_depth_remaps_material_compare() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.set_reversed_depth(true);
    state.set_material(&mut device, &defaults(), false, None);
    assert!(
        device
            .calls()
            .contains(&DeviceCall::SetDepthCompare(CompareFunction::GreaterEqual))
    );
    assert!((state.depth_clear_value() - 0.0).abs() < f32::EPSILON);
}

#[test]
fn toggling_reversed_depth_reissues_compare() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.set_depth_compare(&mut device, CompareFunction::Less);
    state.set_reversed_depth(true);
    state.set_depth_compare(&mut device, CompareFunction::Less);
    assert_eq!(
        device.calls(),
        &[
            DeviceCall::SetDepthCompare(CompareFunction::Less),
            DeviceCall::SetDepthCompare(CompareFunction::Greater),
        ]
    );
}

// ============================================================================
// Scissor, Viewport and Reset Tests
// ============================================================================

#[test]
fn locked_scissor_ignores_setters() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.lock_scissor(true);
    state.set_scissor_test(&mut device, true);
    state.set_scissor(
        &mut device,
        ScissorRect {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        },
    );
    assert!(device.calls().is_empty());

    state.lock_scissor(false);
    state.set_scissor_test(&mut device, true);
    assert_eq!(device.calls(), &[DeviceCall::SetScissorTest(true)]);
}

#[test]
fn viewport_changes_are_deduplicated() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    let full = Viewport {
        x: 0.0,
        y: 0.0,
        width: 4.0,
        height: 4.0,
    };
    let half = Viewport { width: 2.0, ..full };
    state.set_viewport(&mut device, full);
    state.set_viewport(&mut device, full);
    state.set_viewport(&mut device, half);
    state.set_viewport(&mut device, half);
    assert_eq!(
        device.count_calls(|c| matches!(c, DeviceCall::SetViewport(_))),
        2
    );
}

#[test]
fn reset_keeps_issued_count_and_reversal() {
    let mut device = HeadlessDevice::new(4, 4);
    let mut state = StateTracker::new();
    state.set_reversed_depth(true);
    state.set_material(&mut device, &defaults(), false, None);
    let issued = state.issued_calls();

    state.reset();
    assert_eq!(state.issued_calls(), issued);
    assert!(state.reversed_depth());

    state.set_material(&mut device, &defaults(), false, None);
    assert_eq!(
        state.issued_calls(),
        issued * 2,
        "after a reset every field is unknown and re-issued"
    );
}
