//! Diff-and-upload layer between render items and the device.

pub mod attributes;
pub mod uniforms;

pub use attributes::AttributeBinder;
pub use uniforms::{TextureUnits, UniformBinder};
