//! CPU-side vertex and index streams.
//!
//! A [`BufferAttribute`] owns its bytes and a version counter. The renderer
//! uploads the stream when the version moves. Writes through
//! [`BufferAttribute::write`] additionally record byte ranges so only the
//! touched part of the device buffer is re-uploaded.
//!
//! The byte length of an attribute is fixed once it has been uploaded.
//! Replacing the data with a different length is reported as
//! `ConfigurationError::BufferResized` by the buffer cache.

use bytemuck::Pod;

use super::version_tracker::{ChangeTracker, ResourceId};

/// Element layout of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    Vertex(wgpu::VertexFormat),
    Index(wgpu::IndexFormat),
}

impl ElementFormat {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::Vertex(format) => format.size() as u32,
            Self::Index(wgpu::IndexFormat::Uint16) => 2,
            Self::Index(wgpu::IndexFormat::Uint32) => 4,
        }
    }
}

/// Whether the stream advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StepMode {
    #[default]
    Vertex,
    Instance,
}

impl From<StepMode> for wgpu::VertexStepMode {
    fn from(step: StepMode) -> Self {
        match step {
            StepMode::Vertex => Self::Vertex,
            StepMode::Instance => Self::Instance,
        }
    }
}

/// Expected update frequency, forwarded to the device as a usage hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
}

/// Byte range of a stream written since its last upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRange {
    pub start: usize,
    pub len: usize,
}

impl UpdateRange {
    #[must_use]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Sorts `ranges` and merges overlapping or adjacent entries in place.
pub fn coalesce_ranges(ranges: &mut Vec<UpdateRange>) {
    if ranges.len() < 2 {
        return;
    }
    ranges.sort_unstable_by_key(|r| r.start);
    let mut write = 0;
    for read in 1..ranges.len() {
        let range = ranges[read];
        let last = &mut ranges[write];
        if range.start <= last.end() {
            last.len = last.end().max(range.end()) - last.start;
        } else {
            write += 1;
            ranges[write] = range;
        }
    }
    ranges.truncate(write + 1);
}

/// A typed, versioned byte stream bound to a vertex attribute or the index.
///
/// Cloning yields a new resource with its own id and device buffer.
#[derive(Debug)]
pub struct BufferAttribute {
    id: ResourceId,
    data: Vec<u8>,
    format: ElementFormat,
    stride: u32,
    step: StepMode,
    usage: BufferUsage,
    normalized: bool,
    tracker: ChangeTracker,
    update_ranges: Vec<UpdateRange>,
}

impl Clone for BufferAttribute {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            data: self.data.clone(),
            format: self.format,
            stride: self.stride,
            step: self.step,
            usage: self.usage,
            normalized: self.normalized,
            tracker: ChangeTracker::new(),
            update_ranges: Vec::new(),
        }
    }
}

impl BufferAttribute {
    /// Creates a tightly packed vertex stream.
    pub fn new<T: Pod>(data: &[T], format: wgpu::VertexFormat) -> Self {
        Self::from_bytes(bytemuck::cast_slice(data).to_vec(), ElementFormat::Vertex(format))
    }

    /// Creates a 16-bit index stream.
    #[must_use]
    pub fn index_u16(indices: &[u16]) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(indices).to_vec(),
            ElementFormat::Index(wgpu::IndexFormat::Uint16),
        )
    }

    /// Creates a 32-bit index stream.
    #[must_use]
    pub fn index_u32(indices: &[u32]) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(indices).to_vec(),
            ElementFormat::Index(wgpu::IndexFormat::Uint32),
        )
    }

    #[must_use]
    pub fn from_bytes(data: Vec<u8>, format: ElementFormat) -> Self {
        Self {
            id: ResourceId::next(),
            data,
            stride: format.size(),
            format,
            step: StepMode::Vertex,
            usage: BufferUsage::Static,
            normalized: false,
            tracker: ChangeTracker::new(),
            update_ranges: Vec::new(),
        }
    }

    /// Marks the stream as per-instance data.
    #[must_use]
    pub fn per_instance(mut self) -> Self {
        self.step = StepMode::Instance;
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Overrides the element stride, for interleaved or matrix-valued data.
    #[must_use]
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    #[must_use]
    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> ElementFormat {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn step(&self) -> StepMode {
        self.step
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Number of elements in the stream.
    #[must_use]
    pub fn count(&self) -> u32 {
        if self.stride == 0 {
            return 0;
        }
        (self.data.len() / self.stride as usize) as u32
    }

    /// Reads element `index` as `T`, when in range.
    #[must_use]
    pub fn element<T: Pod>(&self, index: usize) -> Option<T> {
        let size = std::mem::size_of::<T>();
        let start = index * self.stride as usize;
        let bytes = self.data.get(start..start + size)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    /// Replaces the whole stream. Pending update ranges are discarded.
    pub fn set_data<T: Pod>(&mut self, data: &[T]) {
        self.data = bytemuck::cast_slice(data).to_vec();
        self.update_ranges.clear();
        self.tracker.changed();
    }

    /// Overwrites elements starting at `first_element` and records the
    /// written byte range for partial upload.
    ///
    /// Writes past the end of the stream are truncated.
    pub fn write<T: Pod>(&mut self, first_element: usize, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let start = (first_element * self.stride as usize).min(self.data.len());
        let end = (start + bytes.len()).min(self.data.len());
        if start == end {
            return;
        }
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
        self.update_ranges.push(UpdateRange {
            start,
            len: end - start,
        });
        self.tracker.changed();
    }

    /// Flags the whole stream for upload without changing its contents.
    pub fn needs_update(&mut self) {
        self.update_ranges.clear();
        self.tracker.changed();
    }

    /// Ranges written since the last upload.
    #[must_use]
    pub fn update_ranges(&self) -> &[UpdateRange] {
        &self.update_ranges
    }

    /// Called by the buffer cache once the pending ranges were serviced.
    pub fn clear_update_ranges(&mut self) {
        self.update_ranges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_merges_overlapping_and_adjacent() {
        let mut ranges = vec![
            UpdateRange { start: 32, len: 8 },
            UpdateRange { start: 0, len: 8 },
            UpdateRange { start: 8, len: 4 },
            UpdateRange { start: 36, len: 16 },
        ];
        coalesce_ranges(&mut ranges);
        assert_eq!(
            ranges,
            vec![
                UpdateRange { start: 0, len: 12 },
                UpdateRange { start: 32, len: 20 },
            ]
        );
    }

    #[test]
    fn coalesce_keeps_the_allocation() {
        let mut ranges = Vec::with_capacity(16);
        ranges.extend((0..8).rev().map(|i| UpdateRange { start: i * 4, len: 4 }));
        ranges.push(UpdateRange { start: 64, len: 4 });
        let buffer = ranges.as_ptr();

        coalesce_ranges(&mut ranges);
        assert_eq!(
            ranges,
            vec![
                UpdateRange { start: 0, len: 32 },
                UpdateRange { start: 64, len: 4 },
            ]
        );
        assert_eq!(ranges.as_ptr(), buffer);
        assert_eq!(ranges.capacity(), 16);
    }

    #[test]
    fn contained_range_does_not_shrink_its_cover() {
        let mut ranges = vec![UpdateRange { start: 0, len: 32 }, UpdateRange { start: 4, len: 4 }];
        coalesce_ranges(&mut ranges);
        assert_eq!(ranges, vec![UpdateRange { start: 0, len: 32 }]);
    }

    #[test]
    fn clone_is_a_separate_resource() {
        let mut attr = BufferAttribute::new(&[0.0f32; 4], wgpu::VertexFormat::Float32);
        attr.write(1, &[3.0f32]);
        let copy = attr.clone();
        assert_ne!(copy.id(), attr.id());
        assert_eq!(copy.bytes(), attr.bytes());
        assert!(copy.update_ranges().is_empty());
    }

    #[test]
    fn write_records_byte_range_and_bumps_version() {
        let mut attr = BufferAttribute::new(&[[0.0f32; 3]; 4], wgpu::VertexFormat::Float32x3);
        let v0 = attr.version();
        attr.write(2, &[[1.0f32, 2.0, 3.0]]);
        assert_eq!(attr.version(), v0 + 1);
        assert_eq!(attr.update_ranges(), &[UpdateRange { start: 24, len: 12 }]);
        assert_eq!(attr.element::<[f32; 3]>(2), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn set_data_discards_ranges() {
        let mut attr = BufferAttribute::new(&[0.0f32; 4], wgpu::VertexFormat::Float32);
        attr.write(0, &[1.0f32]);
        attr.set_data(&[2.0f32; 4]);
        assert!(attr.update_ranges().is_empty());
        assert_eq!(attr.count(), 4);
    }
}
