//! Headless Frame Example
//!
//! Renders a lit, shadowed box on the recording device and prints the frame
//! report, the device calls of a steady frame and a pixel readback.
//!
//! Run with `RUST_LOG=debug` to see resource uploads and program compiles.

use glam::Vec3;

use kiln::renderer::core::{DeviceCall, ReadRect};
use kiln::resources::material::Material;
use kiln::scene::light::{Light, ShadowConfig};
use kiln::scene::transform::Transform;
use kiln::scene::Drawable;
use kiln::{Assets, Camera, Geometry, HeadlessDevice, Node, Renderer, RendererSettings, Scene};

fn main() -> kiln::Result<()> {
    env_logger::init();

    let mut settings = RendererSettings::default();
    settings.clear_color = [0.1, 0.1, 0.12, 1.0];
    settings.shadow_map.enabled = true;
    let mut renderer = Renderer::with_settings(HeadlessDevice::new(64, 64), settings);

    let mut assets = Assets::new();
    let mut scene = Scene::new();

    let mut cube = Geometry::new_box(1.0, 1.0, 1.0);
    cube.compute_bounding_volumes();
    let mut floor = Geometry::new_plane(8.0, 8.0);
    floor.compute_bounding_volumes();
    let cube = assets.add_geometry(cube);
    let floor = assets.add_geometry(floor);
    let material = assets.add_material(Material::standard());

    scene.add(
        Node::drawable(Drawable::new(cube, material).with_shadows(true, false))
            .with_transform(Transform::from_position(Vec3::new(0.0, 0.5, 0.0))),
    );
    scene.add(Node::drawable(Drawable::new(floor, material).with_shadows(false, true)));
    scene.add(
        Node::light(Light::directional(Vec3::ONE, 2.0).with_shadow(ShadowConfig::default()))
            .with_transform(Transform::from_position(Vec3::new(4.0, 6.0, 2.0))),
    );

    let mut camera = Camera::new_perspective(45.0, 1.0, 0.1, 50.0)?;
    camera.transform.position = Vec3::new(0.0, 3.0, 6.0);

    let report = renderer.render(&mut scene, &mut assets, &mut camera)?;
    println!("phases: {:?}", report.phases);
    println!("first frame: {:?}", report.info);

    renderer.device_mut().clear_calls();
    let report = renderer.render(&mut scene, &mut assets, &mut camera)?;
    let device = renderer.device();
    println!(
        "steady frame: {} calls, {} resource calls, {} draws",
        device.calls().len(),
        device.count_calls(DeviceCall::is_resource_call),
        report.info.draw_calls,
    );

    let corner = ReadRect {
        x: 0,
        y: 0,
        width: 2,
        height: 1,
    };
    let pixels = renderer.read_pixels_async(None, corner).wait(&mut renderer)?;
    println!("corner pixels: {pixels:?}");
    Ok(())
}
