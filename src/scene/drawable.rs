//! Renderable scene components.

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use crate::assets::{GeometryHandle, MaterialHandle};
use crate::resources::buffer::{BufferAttribute, BufferUsage};

/// Primitive assembly of a drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    Lines,
    LineStrip,
    Points,
    /// Camera-facing quads; the geometry is expected to be a unit quad.
    Sprite,
}

impl DrawMode {
    #[must_use]
    pub fn topology(self) -> wgpu::PrimitiveTopology {
        match self {
            Self::Triangles | Self::Sprite => wgpu::PrimitiveTopology::TriangleList,
            Self::Lines => wgpu::PrimitiveTopology::LineList,
            Self::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Self::Points => wgpu::PrimitiveTopology::PointList,
        }
    }
}

/// Skinning matrices (bone world matrix times inverse bind matrix), already
/// expressed in the drawable's local space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skin {
    pub bone_matrices: Vec<Mat4>,
}

/// Per-instance transforms and optional colors.
#[derive(Debug, Clone)]
pub struct Instances {
    matrices: BufferAttribute,
    colors: Option<BufferAttribute>,
}

impl Instances {
    pub const MATRIX_STRIDE: u32 = 64;

    #[must_use]
    pub fn new(matrices: &[Mat4]) -> Self {
        let data: Vec<[f32; 16]> = matrices.iter().map(Mat4::to_cols_array).collect();
        Self {
            matrices: BufferAttribute::new(&data, wgpu::VertexFormat::Float32x4)
                .with_stride(Self::MATRIX_STRIDE)
                .per_instance()
                .with_usage(BufferUsage::Dynamic),
            colors: None,
        }
    }

    #[must_use]
    pub fn with_colors(mut self, colors: &[Vec3]) -> Self {
        let data: Vec<[f32; 3]> = colors.iter().map(Vec3::to_array).collect();
        self.colors = Some(
            BufferAttribute::new(&data, wgpu::VertexFormat::Float32x3)
                .per_instance()
                .with_usage(BufferUsage::Dynamic),
        );
        self
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.matrices.count()
    }

    /// Updates one instance matrix; only that range is re-uploaded.
    pub fn set_matrix(&mut self, index: usize, matrix: Mat4) {
        self.matrices.write(index, &[matrix.to_cols_array()]);
    }

    pub fn set_color(&mut self, index: usize, color: Vec3) {
        if let Some(colors) = &mut self.colors {
            colors.write(index, &[color.to_array()]);
        }
    }

    #[must_use]
    pub fn matrices(&self) -> &BufferAttribute {
        &self.matrices
    }

    #[must_use]
    pub fn colors(&self) -> Option<&BufferAttribute> {
        self.colors.as_ref()
    }

    pub fn streams(&self) -> impl Iterator<Item = &BufferAttribute> {
        std::iter::once(&self.matrices).chain(self.colors.as_ref())
    }

    pub fn streams_mut(&mut self) -> impl Iterator<Item = &mut BufferAttribute> {
        std::iter::once(&mut self.matrices).chain(self.colors.as_mut())
    }
}

/// Geometry drawn with one material, or with one material per geometry
/// group.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub mode: DrawMode,
    pub geometry: GeometryHandle,
    /// One entry draws the whole geometry; several entries are indexed by
    /// `GeometryGroup::material_index`.
    pub materials: SmallVec<[MaterialHandle; 1]>,
    pub render_order: i32,
    pub frustum_culled: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub skin: Option<Skin>,
    /// Morph target weights, one per geometry morph target.
    pub morph_influences: Vec<f32>,
    pub instances: Option<Instances>,
}

impl Drawable {
    #[must_use]
    pub fn new(geometry: GeometryHandle, material: MaterialHandle) -> Self {
        Self {
            mode: DrawMode::Triangles,
            geometry,
            materials: smallvec::smallvec![material],
            render_order: 0,
            frustum_culled: true,
            cast_shadow: false,
            receive_shadow: false,
            skin: None,
            morph_influences: Vec::new(),
            instances: None,
        }
    }

    #[must_use]
    pub fn multi(geometry: GeometryHandle, materials: &[MaterialHandle]) -> Self {
        let mut drawable = Self::new(geometry, MaterialHandle::default());
        drawable.materials = materials.iter().copied().collect();
        drawable
    }

    #[must_use]
    pub fn with_mode(mut self, mode: DrawMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_render_order(mut self, order: i32) -> Self {
        self.render_order = order;
        self
    }

    #[must_use]
    pub fn with_shadows(mut self, cast: bool, receive: bool) -> Self {
        self.cast_shadow = cast;
        self.receive_shadow = receive;
        self
    }

    #[must_use]
    pub fn is_multi_material(&self) -> bool {
        self.materials.len() > 1
    }
}
