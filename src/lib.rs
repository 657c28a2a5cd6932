#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! GPU resource and draw-state management for a retained-mode 3D renderer.
//!
//! CPU-side [`resources`] and a [`scene`] graph are turned into device work
//! by the [`Renderer`], which talks to the GPU only through the
//! [`renderer::core::GpuDevice`] seam. Two devices ship with the crate:
//! [`WgpuDevice`] and the recording [`HeadlessDevice`].

pub mod resources;
pub mod assets;
pub mod scene;
pub mod renderer;
pub mod errors;
pub mod utils;

pub use assets::Assets;
pub use errors::{KilnError, Result};
pub use renderer::settings::RendererSettings;
pub use renderer::{HeadlessDevice, Renderer, WgpuDevice};
pub use resources::{Geometry, Material, RenderTarget, Texture};
pub use scene::{Camera, Node, Scene};
