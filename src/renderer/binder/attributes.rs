//! Vertex attribute binder.
//!
//! Diffs the binding of every attribute location (buffer, format, stride,
//! offset, step mode) and the index buffer. Between draws, locations the
//! next program does not consume are disabled.

use smallvec::SmallVec;

use crate::renderer::core::device::{BufferId, GpuDevice, VertexBinding};

#[derive(Debug, Default)]
pub struct AttributeBinder {
    bound: SmallVec<[Option<VertexBinding>; 16]>,
    /// Locations enabled by the draw being set up.
    used: SmallVec<[bool; 16]>,
    index: Option<Option<(BufferId, wgpu::IndexFormat)>>,
    issued: u64,
}

impl AttributeBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every binding unknown.
    pub fn reset(&mut self) {
        self.bound.clear();
        self.used.clear();
        self.index = None;
    }

    /// Starts a draw: no location is considered used yet.
    pub fn begin(&mut self) {
        self.used.iter_mut().for_each(|u| *u = false);
    }

    pub fn bind<D: GpuDevice + ?Sized>(&mut self, device: &mut D, location: u32, binding: VertexBinding) {
        let index = location as usize;
        if self.bound.len() <= index {
            self.bound.resize(index + 1, None);
            self.used.resize(index + 1, false);
        }
        self.used[index] = true;
        if self.bound[index] != Some(binding) {
            self.bound[index] = Some(binding);
            device.set_vertex_attribute(location, binding);
            self.issued += 1;
        }
    }

    /// Disables every location bound earlier but not by the current draw.
    pub fn disable_unused<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for (location, (bound, used)) in self.bound.iter_mut().zip(&self.used).enumerate() {
            if !used && bound.is_some() {
                *bound = None;
                device.disable_vertex_attribute(location as u32);
                self.issued += 1;
            }
        }
    }

    pub fn bind_index<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        index: Option<(BufferId, wgpu::IndexFormat)>,
    ) {
        if self.index != Some(index) {
            self.index = Some(index);
            device.set_index_buffer(index);
            self.issued += 1;
        }
    }

    /// Forgets bindings referencing a destroyed buffer.
    pub fn forget_buffer(&mut self, buffer: BufferId) {
        for slot in &mut self.bound {
            if slot.is_some_and(|b| b.buffer == buffer) {
                *slot = None;
            }
        }
        if matches!(self.index, Some(Some((b, _))) if b == buffer) {
            self.index = None;
        }
    }

    #[must_use]
    pub fn issued_calls(&self) -> u64 {
        self.issued
    }
}
