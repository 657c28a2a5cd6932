//! Program interface layout.
//!
//! A [`ProgramLayout`] lists the uniforms, textures and vertex attributes a
//! generated program declares. The shader templates render their binding
//! blocks from it, and backends use it to pack uniform data and to route
//! attribute locations, so the WGSL text and the host side never disagree.
//!
//! Uniform offsets follow the WGSL uniform address space rules: scalars
//! align to 4 bytes, `vec2` to 8, everything wider (including array
//! elements) to 16.

use serde::Serialize;

use crate::resources::buffer::StepMode;
use crate::resources::texture::TextureDimension;

/// Scalar, vector, matrix or fixed-length array uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Vec4Array(u32),
    Mat4Array(u32),
}

impl UniformKind {
    /// Number of tightly packed host-side components.
    #[must_use]
    pub fn components(self) -> usize {
        match self {
            Self::Float | Self::Int => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
            Self::Vec4Array(n) => 4 * n as usize,
            Self::Mat4Array(n) => 16 * n as usize,
        }
    }

    #[must_use]
    pub fn is_int(self) -> bool {
        matches!(self, Self::Int)
    }

    #[must_use]
    pub fn align(self) -> u32 {
        match self {
            Self::Float | Self::Int => 4,
            Self::Vec2 => 8,
            _ => 16,
        }
    }

    /// Size in bytes inside a uniform block.
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat3 => 48,
            Self::Mat4 => 64,
            Self::Vec4Array(n) => 16 * n,
            Self::Mat4Array(n) => 64 * n,
        }
    }

    #[must_use]
    pub fn wgsl_type(self) -> String {
        match self {
            Self::Float => "f32".to_owned(),
            Self::Int => "i32".to_owned(),
            Self::Vec2 => "vec2<f32>".to_owned(),
            Self::Vec3 => "vec3<f32>".to_owned(),
            Self::Vec4 => "vec4<f32>".to_owned(),
            Self::Mat3 => "mat3x3<f32>".to_owned(),
            Self::Mat4 => "mat4x4<f32>".to_owned(),
            Self::Vec4Array(n) => format!("array<vec4<f32>, {n}>"),
            Self::Mat4Array(n) => format!("array<mat4x4<f32>, {n}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UniformDecl {
    pub name: String,
    #[serde(skip)]
    pub kind: UniformKind,
    /// WGSL type, rendered into the uniform struct.
    pub ty: String,
    pub offset: u32,
}

/// Sampled texture binding kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureKind {
    D2,
    Cube,
    D2Array,
}

impl From<TextureDimension> for TextureKind {
    fn from(dimension: TextureDimension) -> Self {
        match dimension {
            TextureDimension::D2 => Self::D2,
            TextureDimension::Cube => Self::Cube,
            TextureDimension::D2Array => Self::D2Array,
        }
    }
}

impl TextureKind {
    #[must_use]
    pub fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            Self::D2 => wgpu::TextureViewDimension::D2,
            Self::Cube => wgpu::TextureViewDimension::Cube,
            Self::D2Array => wgpu::TextureViewDimension::D2Array,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TextureDecl {
    pub name: String,
    pub kind: TextureKind,
    /// Binding of the texture; its sampler follows at `binding + 1`.
    pub binding: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttributeDecl {
    pub name: String,
    pub location: u32,
    #[serde(skip)]
    pub format: wgpu::VertexFormat,
    #[serde(skip)]
    pub step: StepMode,
    /// WGSL type of the shader input.
    pub ty: String,
}

/// Interface of one generated program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ProgramLayout {
    pub uniforms: Vec<UniformDecl>,
    pub textures: Vec<TextureDecl>,
    pub attributes: Vec<AttributeDecl>,
    /// Size of the uniform block, rounded up to 16 bytes.
    pub block_size: u32,
}

impl ProgramLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a uniform and returns its slot.
    pub fn push_uniform(&mut self, name: &str, kind: UniformKind) -> u32 {
        if let Some(slot) = self.uniform_slot(name) {
            return slot;
        }
        let offset = self.block_size.next_multiple_of(kind.align());
        self.uniforms.push(UniformDecl {
            name: name.to_owned(),
            kind,
            ty: kind.wgsl_type(),
            offset,
        });
        // Trailing members are packed tightly until the block is finished.
        self.block_size = offset + kind.size();
        self.uniforms.len() as u32 - 1
    }

    /// Appends a texture and returns its slot.
    pub fn push_texture(&mut self, name: &str, kind: TextureKind) -> u32 {
        if let Some(slot) = self.texture_slot(name) {
            return slot;
        }
        let binding = 1 + 2 * self.textures.len() as u32;
        self.textures.push(TextureDecl {
            name: name.to_owned(),
            kind,
            binding,
        });
        self.textures.len() as u32 - 1
    }

    /// Appends a vertex input at the next free location.
    pub fn push_attribute(&mut self, name: &str, format: wgpu::VertexFormat, step: StepMode) -> u32 {
        if let Some(existing) = self.attribute(name) {
            return existing.location;
        }
        let location = self.attributes.len() as u32;
        self.attributes.push(AttributeDecl {
            name: name.to_owned(),
            location,
            format,
            step,
            ty: vertex_wgsl_type(format).to_owned(),
        });
        location
    }

    /// Rounds the block to its struct alignment. Called once all uniforms
    /// are pushed.
    pub fn finish(&mut self) {
        self.block_size = self.block_size.max(16).next_multiple_of(16);
    }

    #[must_use]
    pub fn uniform_slot(&self, name: &str) -> Option<u32> {
        self.uniforms
            .iter()
            .position(|u| u.name == name)
            .map(|i| i as u32)
    }

    #[must_use]
    pub fn texture_slot(&self, name: &str) -> Option<u32> {
        self.textures
            .iter()
            .position(|t| t.name == name)
            .map(|i| i as u32)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Shader-side type of a vertex input; normalized integer formats read as
/// floats.
#[must_use]
pub fn vertex_wgsl_type(format: wgpu::VertexFormat) -> &'static str {
    use wgpu::VertexFormat as F;
    match format {
        F::Float32 | F::Unorm8 | F::Unorm16 | F::Snorm8 | F::Snorm16 | F::Float16 => "f32",
        F::Float32x2 | F::Unorm8x2 | F::Unorm16x2 | F::Snorm8x2 | F::Snorm16x2 | F::Float16x2 => {
            "vec2<f32>"
        }
        F::Float32x3 => "vec3<f32>",
        F::Uint32 | F::Uint8 | F::Uint16 => "u32",
        F::Uint32x2 | F::Uint8x2 | F::Uint16x2 => "vec2<u32>",
        F::Uint32x3 => "vec3<u32>",
        F::Uint32x4 | F::Uint8x4 | F::Uint16x4 => "vec4<u32>",
        F::Sint32 | F::Sint8 | F::Sint16 => "i32",
        F::Sint32x2 | F::Sint8x2 | F::Sint16x2 => "vec2<i32>",
        F::Sint32x3 => "vec3<i32>",
        F::Sint32x4 | F::Sint8x4 | F::Sint16x4 => "vec4<i32>",
        _ => "vec4<f32>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_uniform_alignment() {
        let mut layout = ProgramLayout::new();
        layout.push_uniform("opacity", UniformKind::Float);
        layout.push_uniform("diffuse", UniformKind::Vec3);
        layout.push_uniform("uv_offset", UniformKind::Vec2);
        layout.push_uniform("model_matrix", UniformKind::Mat4);
        layout.push_uniform("flag", UniformKind::Int);
        layout.finish();

        let offsets: Vec<u32> = layout.uniforms.iter().map(|u| u.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32, 48, 112]);
        assert_eq!(layout.block_size, 128);
    }

    #[test]
    fn vec3_followed_by_scalar_shares_the_row() {
        let mut layout = ProgramLayout::new();
        layout.push_uniform("emissive", UniformKind::Vec3);
        layout.push_uniform("roughness", UniformKind::Float);
        assert_eq!(layout.uniforms[1].offset, 12);
    }

    #[test]
    fn slots_are_stable_and_deduplicated() {
        let mut layout = ProgramLayout::new();
        assert_eq!(layout.push_texture("map", TextureKind::D2), 0);
        assert_eq!(layout.push_texture("env_map", TextureKind::Cube), 1);
        assert_eq!(layout.push_texture("map", TextureKind::D2), 0);
        assert_eq!(layout.textures[1].binding, 3);

        let a = layout.push_attribute("position", wgpu::VertexFormat::Float32x3, StepMode::Vertex);
        let b = layout.push_attribute("normal", wgpu::VertexFormat::Float32x3, StepMode::Vertex);
        assert_eq!((a, b), (0, 1));
        assert_eq!(
            layout.push_attribute("position", wgpu::VertexFormat::Float32x3, StepMode::Vertex),
            0
        );
    }
}
