//! Program pipeline: key derivation, interface layout, WGSL generation and
//! the program cache.

pub mod features;
pub mod layout;
pub mod program_cache;
pub mod shader_gen;

pub use features::{
    Clipping, DrawContext, ProgramFeatures, ProgramKey, ProgramParameters, derive_parameters,
};
pub use layout::{ProgramLayout, TextureKind, UniformKind};
pub use program_cache::{
    CompiledProgram, ProgramCache, ProgramCacheStats, ProgramHandle, ProgramState,
};
pub use shader_gen::{Builtin, CustomBinding, ProgramBindings, VertexSource};
