//! Scene graph consumed by the renderer.
//!
//! - [`Scene`]: node storage, hierarchy and scene-wide inputs (fog,
//!   environment, background)
//! - [`Node`] / [`NodeKind`]: groups, drawables and lights
//! - [`Camera`]: projection, frustum, sub-views
//! - [`Light`]: the light model and shadow configuration

pub mod camera;
pub mod drawable;
pub mod fog;
pub mod layers;
pub mod light;
pub mod node;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod transform;

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a [`Node`] in a [`Scene`].
    pub struct NodeHandle;
}

pub use camera::{Camera, CameraView, CoordinateSystem, Frustum, Projection};
pub use drawable::{DrawMode, Drawable, Instances, Skin};
pub use fog::Fog;
pub use layers::Layers;
pub use light::{Light, LightKind, ShadowConfig};
pub use node::{Node, NodeKind};
pub use scene::Scene;
pub use transform::Transform;
