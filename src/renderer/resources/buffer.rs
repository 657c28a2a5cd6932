//! Attribute and index buffer cache.

use rustc_hash::FxHashMap;

use crate::errors::ConfigurationError;
use crate::renderer::core::device::{BufferDesc, BufferId, BufferKind, GpuDevice};
use crate::resources::buffer::{BufferAttribute, UpdateRange, coalesce_ranges};
use crate::resources::version_tracker::ResourceId;

/// Device buffer backing one [`BufferAttribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    pub id: BufferId,
    pub kind: BufferKind,
    /// Byte length fixed at creation.
    pub size: usize,
    /// Attribute version last uploaded.
    pub version: u64,
    last_frame: u64,
}

#[derive(Debug, Default)]
pub struct BufferCache {
    entries: FxHashMap<ResourceId, GpuBuffer>,
    ranges: Vec<UpdateRange>,
    bytes_uploaded: u64,
}

impl BufferCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, attribute: ResourceId) -> Option<&GpuBuffer> {
        self.entries.get(&attribute)
    }

    /// Synchronises the device buffer of `attribute` with its CPU data.
    ///
    /// Runs at most once per attribute per `frame`. Uploads only when the
    /// version moved, and only the recorded update ranges when there are
    /// any. The byte length of an uploaded attribute is fixed: a different
    /// length fails with [`ConfigurationError::BufferResized`] and leaves the
    /// cached buffer as it was.
    pub fn update<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        attribute: &mut BufferAttribute,
        kind: BufferKind,
        frame: u64,
    ) -> Result<GpuBuffer, ConfigurationError> {
        let id = attribute.id();
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.last_frame == frame || entry.version == attribute.version() {
                entry.last_frame = frame;
                return Ok(*entry);
            }
            let actual = attribute.bytes().len();
            if actual != entry.size {
                return Err(ConfigurationError::BufferResized {
                    id: id.raw(),
                    expected: entry.size,
                    actual,
                });
            }

            let bytes = attribute.bytes();
            if attribute.update_ranges().is_empty() {
                device.write_buffer(entry.id, 0, bytes);
                self.bytes_uploaded += bytes.len() as u64;
            } else {
                self.ranges.clear();
                self.ranges.extend_from_slice(attribute.update_ranges());
                coalesce_ranges(&mut self.ranges);
                for range in &self.ranges {
                    let end = range.end().min(bytes.len());
                    if range.start >= end {
                        continue;
                    }
                    device.write_buffer(entry.id, range.start as u64, &bytes[range.start..end]);
                    self.bytes_uploaded += (end - range.start) as u64;
                }
            }
            log::debug!("Buffer {id}: uploaded version {}", attribute.version());
            attribute.clear_update_ranges();
            entry.version = attribute.version();
            entry.last_frame = frame;
            return Ok(*entry);
        }

        let label = format!("attribute {id}");
        let buffer = device.create_buffer(&BufferDesc {
            label: &label,
            kind,
            usage: attribute.usage(),
            contents: attribute.bytes(),
        });
        self.bytes_uploaded += attribute.bytes().len() as u64;
        attribute.clear_update_ranges();
        let entry = GpuBuffer {
            id: buffer,
            kind,
            size: attribute.bytes().len(),
            version: attribute.version(),
            last_frame: frame,
        };
        self.entries.insert(id, entry);
        log::debug!("Buffer {id}: created ({} bytes)", entry.size);
        Ok(entry)
    }

    /// Frees the device buffer of `attribute`. A second call is a no-op.
    pub fn remove<D: GpuDevice + ?Sized>(&mut self, device: &mut D, attribute: ResourceId) -> Option<BufferId> {
        let entry = self.entries.remove(&attribute)?;
        device.destroy_buffer(entry.id);
        Some(entry.id)
    }

    /// Drops every entry without device calls (the device was lost).
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }
}
